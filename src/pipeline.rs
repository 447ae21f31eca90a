//! Offline stages that turn wiki pages into servable artifacts.
//!
//! `ingest` -> `<slug>_raw.json`, `normalize` -> `<slug>_normalized.json`,
//! `vectorize` -> `<slug>.records.json` + `<slug>.vectors.bin`. The last
//! pair is written from one record sequence so position `i` of the records
//! file is row `i` of the vectors file.

use crate::{
    app::AppPaths,
    config::Config,
    ingest,
    normalize,
    records::{Category, Record, RecordStore},
    semantic::{preprocess_content, store_fingerprint, EmbeddingModel, VectorIndex, VectorStorage},
    storage::{BackendLocal, StorageManager},
};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const RELOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
pub struct VectorizeReport {
    pub category: Category,
    pub records: usize,
    pub skipped: usize,
}

/// Split records into those with embeddable content and their texts.
fn embeddable(records: Vec<Record>) -> (Vec<Record>, Vec<String>, usize) {
    let total = records.len();
    let (kept, texts): (Vec<_>, Vec<_>) = records
        .into_iter()
        .filter_map(|record| {
            let text = preprocess_content(&record)?;
            Some((record, text))
        })
        .unzip();

    let skipped = total - kept.len();
    (kept, texts, skipped)
}

fn progress_bar(len: usize, category: Category) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(category.to_string());
    pb
}

/// Embed one category's normalized records and write its artifact pair.
pub fn vectorize(
    category: Category,
    model: &EmbeddingModel,
    data: &dyn StorageManager,
    index_dir: &Path,
    batch_size: usize,
) -> anyhow::Result<VectorizeReport> {
    let records = if data.exists(&category.normalized_file()) {
        normalize::read_records(data, category)?
    } else {
        log::warn!("{category}: nothing normalized yet, writing an empty index");
        vec![]
    };

    let (records, texts, skipped) = embeddable(records);
    if skipped > 0 {
        log::info!("{category}: skipping {skipped} records without content");
    }

    let mut index = VectorIndex::with_capacity(model.dimensions(), texts.len());
    let pb = progress_bar(texts.len(), category);

    for batch in texts.chunks(batch_size.max(1)) {
        let embeddings = model
            .embed_batch(batch)
            .with_context(|| format!("{category}: embedding failed"))?;

        for embedding in embeddings {
            index.push(embedding)?;
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    let store = RecordStore::new(records);
    let out = BackendLocal::new(index_dir)?;
    out.write(
        &category.records_file(),
        &serde_json::to_vec_pretty(store.records())?,
    )?;

    let vectors = VectorStorage::new(index_dir.join(category.vectors_file()));
    vectors
        .save(&index, &model.model_id_hash(), &store_fingerprint(&store))
        .with_context(|| format!("failed to write {}", vectors.path().display()))?;

    log::info!(
        "{category}: {} records vectorized with {}",
        store.len(),
        model.name()
    );

    Ok(VectorizeReport {
        category,
        records: store.len(),
        skipped,
    })
}

pub fn vectorize_all(
    paths: &AppPaths,
    config: &Config,
    model: &EmbeddingModel,
) -> anyhow::Result<Vec<VectorizeReport>> {
    let data = BackendLocal::new(&paths.data_path)?;

    Category::ALL
        .into_iter()
        .map(|category| {
            vectorize(
                category,
                model,
                &data,
                &paths.index_path,
                config.semantic_search.batch_size,
            )
        })
        .collect()
}

/// Ask a running daemon to pick up fresh artifacts.
pub fn request_reload(addr: &str) -> anyhow::Result<serde_json::Value> {
    let addr = addr.trim_end_matches('/');
    let url = if addr.starts_with("http://") || addr.starts_with("https://") {
        format!("{addr}/api/reload")
    } else {
        format!("http://{addr}/api/reload")
    };

    let response = reqwest::blocking::Client::builder()
        .timeout(RELOAD_TIMEOUT)
        .build()?
        .post(&url)
        .send()
        .with_context(|| format!("failed to reach {url}"))?;

    let status = response.status();
    let body: serde_json::Value = response.json().unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("reload failed with {status}: {body}");
    }

    Ok(body)
}

/// Full refresh: ingest, normalize, vectorize, then optionally reload a daemon.
pub fn update(
    paths: &AppPaths,
    config: &Config,
    model: &EmbeddingModel,
    reload_addr: Option<&str>,
) -> anyhow::Result<()> {
    let data = BackendLocal::new(&paths.data_path)?;

    log::info!("running ingest");
    ingest::ingest(&config.confluence, &data)?;

    log::info!("running normalize");
    normalize::normalize_all(&data)?;

    log::info!("running vectorize");
    vectorize_all(paths, config, model)?;

    if let Some(addr) = reload_addr {
        let stats = request_reload(addr)?;
        log::info!("daemon reloaded: {stats}");
    }

    Ok(())
}

/// First normalized record of each category, for eyeballing a pipeline run.
pub fn check(data: &dyn StorageManager) -> Vec<(Category, anyhow::Result<Option<Record>>)> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let first = normalize::read_records(data, category)
                .map(|records| records.into_iter().next());
            (category, first)
        })
        .collect()
}
