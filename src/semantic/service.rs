//! Category search service.
//!
//! Holds one [`CategoryCorpus`] per category behind an `Arc`. A corpus pairs
//! a record store with the vector index built from that same sequence and
//! is never mutated; refreshing a category builds a complete new corpus and
//! swaps the `Arc`, so a request always sees one consistent pair.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::records::{Category, Record, RecordStore};
use crate::semantic::embeddings::{EmbeddingError, QueryEncoder};
use crate::semantic::hybrid::{retrieve, RetrievalError};
use crate::semantic::index::{NearestNeighbors, VectorIndex};
use crate::semantic::lexical::normalize_query;
use crate::semantic::storage::{store_fingerprint, VectorStorage, VectorStorageError};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("query must not be empty")]
    InvalidQuery,

    #[error("search failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Records error: {0}")]
    Records(String),

    #[error("no artifact directory configured")]
    NoSource,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A category's record store and its paired vector index.
pub struct CategoryCorpus {
    category: Category,
    store: RecordStore,
    index: Box<dyn NearestNeighbors>,
}

impl CategoryCorpus {
    pub fn new(
        category: Category,
        store: RecordStore,
        index: impl NearestNeighbors + 'static,
    ) -> Self {
        if store.len() != index.len() {
            log::warn!(
                "{category}: record store has {} records but index has {} rows",
                store.len(),
                index.len()
            );
        }

        Self {
            category,
            store,
            index: Box::new(index),
        }
    }

    pub fn empty(category: Category, dimensions: usize) -> Self {
        Self::new(category, RecordStore::default(), VectorIndex::new(dimensions))
    }

    /// Load `<slug>.records.json` and `<slug>.vectors.bin` from `source`.
    ///
    /// A category without any artifacts loads empty. Records without
    /// vectors, or vectors built from another record sequence, are errors.
    pub fn load(category: Category, source: &CorpusSource) -> Result<Self, SemanticSearchError> {
        let records_path = source.dir.join(category.records_file());
        let storage = VectorStorage::new(source.dir.join(category.vectors_file()));

        if !records_path.exists() && !storage.exists() {
            log::warn!("{category}: no artifacts in {}, serving empty", source.dir.display());
            return Ok(Self::empty(category, source.dimensions));
        }

        let store = RecordStore::load(&records_path).map_err(|err| {
            SemanticSearchError::Records(format!("{}: {err:#}", records_path.display()))
        })?;

        let index = storage.load(
            &source.model_id,
            source.dimensions,
            &store_fingerprint(&store),
        )?;

        log::info!("{category}: loaded {} records", store.len());

        Ok(Self::new(category, store, index))
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn retrieve(
        &self,
        query: &str,
        encoder: &dyn QueryEncoder,
        k: usize,
    ) -> Result<Vec<&Record>, RetrievalError> {
        retrieve(query, &self.store, self.index.as_ref(), encoder, k)
    }
}

/// Where category artifacts live and what they must have been built with.
#[derive(Debug, Clone)]
pub struct CorpusSource {
    pub dir: PathBuf,
    pub model_id: [u8; 32],
    pub dimensions: usize,
}

impl CorpusSource {
    pub fn new(dir: impl AsRef<Path>, model_id: [u8; 32], dimensions: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            model_id,
            dimensions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub endpoint: &'static str,
    pub records: usize,
}

/// Service answering searches for every category.
pub struct SemanticSearchService {
    encoder: Arc<dyn QueryEncoder>,
    corpora: BTreeMap<Category, RwLock<Arc<CategoryCorpus>>>,
    source: Option<CorpusSource>,
    default_num_results: usize,
}

impl SemanticSearchService {
    /// Service with every category empty; install corpora with [`Self::install`].
    pub fn new(encoder: Arc<dyn QueryEncoder>, dimensions: usize, default_num_results: usize) -> Self {
        let corpora = Category::ALL
            .into_iter()
            .map(|category| {
                let corpus = CategoryCorpus::empty(category, dimensions);
                (category, RwLock::new(Arc::new(corpus)))
            })
            .collect();

        Self {
            encoder,
            corpora,
            source: None,
            default_num_results,
        }
    }

    /// Load every category from `source`.
    pub fn load(
        encoder: Arc<dyn QueryEncoder>,
        source: CorpusSource,
        default_num_results: usize,
    ) -> Result<Self, SemanticSearchError> {
        let mut corpora = BTreeMap::new();
        for category in Category::ALL {
            let corpus = CategoryCorpus::load(category, &source)?;
            corpora.insert(category, RwLock::new(Arc::new(corpus)));
        }

        Ok(Self {
            encoder,
            corpora,
            source: Some(source),
            default_num_results,
        })
    }

    pub fn default_num_results(&self) -> usize {
        self.default_num_results
    }

    /// Current corpus of `category`.
    pub fn corpus(&self, category: Category) -> Result<Arc<CategoryCorpus>, SemanticSearchError> {
        let slot = self.slot(category)?;
        let guard = slot
            .read()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(guard.clone())
    }

    /// Replace a category's corpus, returning the previous one.
    pub fn install(&self, corpus: CategoryCorpus) -> Result<Arc<CategoryCorpus>, SemanticSearchError> {
        let slot = self.slot(corpus.category())?;
        let mut guard = slot
            .write()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(std::mem::replace(&mut *guard, Arc::new(corpus)))
    }

    /// Search one category.
    ///
    /// Rejects a blank query; `num_results` falls back to the configured
    /// default. Collaborator failures propagate, an empty result is `Ok`.
    pub fn search(
        &self,
        category: Category,
        query: &str,
        num_results: Option<usize>,
    ) -> Result<Vec<Record>, SemanticSearchError> {
        if normalize_query(query).is_empty() {
            return Err(SemanticSearchError::InvalidQuery);
        }

        let k = num_results.unwrap_or(self.default_num_results);
        let corpus = self.corpus(category)?;

        let results = corpus.retrieve(query, self.encoder.as_ref(), k)?;
        log::debug!("{category}: {query:?} -> {} results", results.len());

        Ok(results.into_iter().cloned().collect())
    }

    /// Reload every category from the configured source.
    ///
    /// All categories are loaded before any is swapped in; a failure leaves
    /// the running corpora untouched.
    pub fn reload(&self) -> Result<Vec<CategoryStats>, SemanticSearchError> {
        let source = self.source.as_ref().ok_or(SemanticSearchError::NoSource)?;

        let fresh = Category::ALL
            .into_iter()
            .map(|category| CategoryCorpus::load(category, source))
            .collect::<Result<Vec<_>, _>>()?;

        for corpus in fresh {
            self.install(corpus)?;
        }

        self.stats()
    }

    pub fn stats(&self) -> Result<Vec<CategoryStats>, SemanticSearchError> {
        Category::ALL
            .into_iter()
            .map(|category| {
                let corpus = self.corpus(category)?;
                Ok(CategoryStats {
                    category,
                    endpoint: category.endpoint(),
                    records: corpus.len(),
                })
            })
            .collect()
    }

    fn slot(&self, category: Category) -> Result<&RwLock<Arc<CategoryCorpus>>, SemanticSearchError> {
        self.corpora
            .get(&category)
            .ok_or_else(|| SemanticSearchError::Internal(format!("category {category} not loaded")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{record, ScriptedIndex, StaticEncoder};

    fn service() -> SemanticSearchService {
        SemanticSearchService::new(Arc::new(StaticEncoder), 3, 100)
    }

    fn incidents_corpus() -> CategoryCorpus {
        let store = RecordStore::new(vec![
            record("1", "Payment error", "cuota failed", Some("INC-1")),
            record("2", "Login bug", "", Some("INC-2")),
        ]);
        CategoryCorpus::new(Category::Incidents, store, ScriptedIndex::rows(&[0, 1]))
    }

    #[test]
    fn test_blank_query_is_invalid() {
        let service = service();
        let result = service.search(Category::Incidents, "   ", None);
        assert!(matches!(result, Err(SemanticSearchError::InvalidQuery)));
    }

    #[test]
    fn test_empty_category_returns_no_results() {
        let service = service();
        let result = service.search(Category::Postmortem, "cuota", None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_search_dispatches_to_category() {
        let service = service();
        service.install(incidents_corpus()).unwrap();

        let hits = service.search(Category::Incidents, "login", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2");

        assert!(service
            .search(Category::Solicitudes, "login", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_num_results_bounds_output() {
        let service = service();
        service.install(incidents_corpus()).unwrap();

        let hits = service.search(Category::Incidents, "inc", Some(1)).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service
            .search(Category::Incidents, "inc", Some(0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_huge_num_results_on_vector_index() {
        let store = RecordStore::new(vec![
            record("1", "Payment error", "cuota failed", Some("INC-1")),
            record("2", "Cuota duplicada", "cuota cuota", Some("INC-2")),
        ]);
        let mut index = VectorIndex::new(3);
        index.push(vec![0.0, 0.0, 0.0]).unwrap();
        index.push(vec![1.0, 0.0, 0.0]).unwrap();

        let service = service();
        service
            .install(CategoryCorpus::new(Category::Incidents, store, index))
            .unwrap();

        for k in [10_000_000_000, i64::MAX as usize, usize::MAX] {
            let hits = service.search(Category::Incidents, "cuota", Some(k)).unwrap();
            let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["2", "1"]);
        }
    }

    #[test]
    fn test_install_swaps_whole_corpus() {
        let service = service();
        let before = service.corpus(Category::Incidents).unwrap();
        assert!(before.is_empty());

        let previous = service.install(incidents_corpus()).unwrap();
        assert!(Arc::ptr_eq(&before, &previous));

        // a reader holding the old Arc keeps a consistent pair
        assert!(before.is_empty());
        assert_eq!(service.corpus(Category::Incidents).unwrap().len(), 2);
    }

    #[test]
    fn test_reload_without_source() {
        let service = service();
        assert!(matches!(service.reload(), Err(SemanticSearchError::NoSource)));
    }

    #[test]
    fn test_index_failure_is_a_search_error() {
        let service = service();
        let store = RecordStore::new(vec![record("1", "cuota", "", None)]);
        service
            .install(CategoryCorpus::new(Category::Causaraiz, store, ScriptedIndex::failing()))
            .unwrap();

        let result = service.search(Category::Causaraiz, "cuota", None);
        assert!(matches!(
            result,
            Err(SemanticSearchError::Retrieval(RetrievalError::IndexUnavailable(_)))
        ));
    }

    #[test]
    fn test_load_missing_artifacts_serves_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = CorpusSource::new(dir.path(), [1; 32], 3);

        let service = SemanticSearchService::load(Arc::new(StaticEncoder), source, 100).unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.len(), 4);
        assert!(stats.iter().all(|s| s.records == 0));
    }

    #[test]
    fn test_load_and_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = CorpusSource::new(dir.path(), [1; 32], 3);

        let write_pair = |records: Vec<Record>| {
            let store = RecordStore::new(records);
            let mut index = VectorIndex::new(3);
            for _ in store.iter() {
                index.push(vec![0.0, 0.0, 0.0]).unwrap();
            }
            std::fs::write(
                dir.path().join(Category::Incidents.records_file()),
                serde_json::to_vec(store.records()).unwrap(),
            )
            .unwrap();
            VectorStorage::new(dir.path().join(Category::Incidents.vectors_file()))
                .save(&index, &[1; 32], &store_fingerprint(&store))
                .unwrap();
        };

        write_pair(vec![record("1", "cuota", "", None)]);
        let service = SemanticSearchService::load(Arc::new(StaticEncoder), source, 100).unwrap();
        assert_eq!(service.corpus(Category::Incidents).unwrap().len(), 1);

        write_pair(vec![
            record("1", "cuota", "", None),
            record("2", "cuota doble cuota", "", None),
        ]);
        service.reload().unwrap();

        let hits = service.search(Category::Incidents, "cuota", None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "2");
    }

    #[test]
    fn test_load_rejects_mismatched_pair() {
        let dir = tempfile::tempdir().unwrap();
        let source = CorpusSource::new(dir.path(), [1; 32], 3);

        let built = RecordStore::new(vec![record("1", "a", "", None)]);
        let mut index = VectorIndex::new(3);
        index.push(vec![0.0, 0.0, 0.0]).unwrap();
        VectorStorage::new(dir.path().join(Category::Solicitudes.vectors_file()))
            .save(&index, &[1; 32], &store_fingerprint(&built))
            .unwrap();

        let other = vec![record("9", "b", "", None)];
        std::fs::write(
            dir.path().join(Category::Solicitudes.records_file()),
            serde_json::to_vec(&other).unwrap(),
        )
        .unwrap();

        let result = CategoryCorpus::load(Category::Solicitudes, &source);
        assert!(matches!(
            result,
            Err(SemanticSearchError::Storage(VectorStorageError::StoreMismatch))
        ));
    }
}
