//! Hybrid retrieval: vector candidates re-filtered by exact substring match.
//!
//! Nearest-neighbor retrieval is approximate and tends to surface
//! semantically close but textually unrelated records for short or ID-like
//! queries (incident numbers, exact phrases). Retrieval therefore runs in
//! two explicit branches:
//!
//! - [`Retrieval::Vector`]: the top-k index candidates that contain the
//!   query verbatim in title, content or incident number.
//! - [`Retrieval::FullScan`]: no candidate survived the exact filter, so the
//!   same filter runs over the whole category store.
//!
//! Survivors are ranked by how often the query occurs in title and content
//! and truncated to k.

use crate::records::{Record, RecordStore};
use crate::semantic::embeddings::{EmbeddingError, QueryEncoder};
use crate::semantic::index::{IndexError, NearestNeighbors};
use crate::semantic::lexical::{matches_query, normalize_query, occurrence_count};

/// Collaborator failures. Either one fails the whole request; an index
/// error never triggers the full-scan fallback.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query encoding failed: {0}")]
    QueryEncoding(#[from] EmbeddingError),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(#[from] IndexError),
}

/// Outcome of the candidate stage.
#[derive(Debug)]
pub enum Retrieval<'a> {
    /// Vector candidates that passed the exact filter, in index order.
    Vector(Vec<&'a Record>),
    /// No candidate passed; scan the entire store instead.
    FullScan,
}

impl<'a> Retrieval<'a> {
    /// Records the branch yields, before ranking.
    pub fn resolve(self, store: &'a RecordStore, normalized_query: &str) -> Vec<&'a Record> {
        match self {
            Retrieval::Vector(candidates) => candidates,
            Retrieval::FullScan => store
                .iter()
                .filter(|record| matches_query(record, normalized_query))
                .collect(),
        }
    }
}

/// Encode the query, fetch `k` index candidates and apply the exact filter.
///
/// Sentinel slots are dropped. Rows outside the store (index and store
/// rebuilt independently) are skipped with a warning.
pub fn candidate_stage<'a>(
    normalized_query: &str,
    store: &'a RecordStore,
    index: &dyn NearestNeighbors,
    encoder: &dyn QueryEncoder,
    k: usize,
) -> Result<Retrieval<'a>, RetrievalError> {
    let query_vector = encoder.embed(normalized_query)?;
    let hits = index.search(&query_vector, k)?;

    let matches: Vec<&Record> = hits
        .into_iter()
        .flatten()
        .filter_map(|row| {
            let record = store.get(row);
            if record.is_none() {
                log::warn!(
                    "index row {row} outside record store of length {}, skipping",
                    store.len()
                );
            }
            record
        })
        .filter(|record| matches_query(record, normalized_query))
        .collect();

    if matches.is_empty() {
        log::debug!("no vector candidate contains {normalized_query:?}, falling back to full scan");
        Ok(Retrieval::FullScan)
    } else {
        Ok(Retrieval::Vector(matches))
    }
}

/// Sort by occurrence count, highest first. The sort is stable, so equal
/// counts keep the order of the previous stage.
pub fn rank<'a>(mut records: Vec<&'a Record>, normalized_query: &str) -> Vec<&'a Record> {
    records.sort_by_cached_key(|record| std::cmp::Reverse(occurrence_count(record, normalized_query)));
    records
}

/// Retrieve at most `k` records of `store` matching `query`.
///
/// An empty (or whitespace-only) query and `k == 0` yield an empty result
/// without touching the collaborators.
pub fn retrieve<'a>(
    query: &str,
    store: &'a RecordStore,
    index: &dyn NearestNeighbors,
    encoder: &dyn QueryEncoder,
    k: usize,
) -> Result<Vec<&'a Record>, RetrievalError> {
    let normalized = normalize_query(query);
    if normalized.is_empty() || k == 0 {
        return Ok(vec![]);
    }

    let retrieval = candidate_stage(&normalized, store, index, encoder, k)?;
    let mut ranked = rank(retrieval.resolve(store, &normalized), &normalized);
    ranked.truncate(k);

    Ok(ranked)
}
