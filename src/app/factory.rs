use crate::{
    config::Config,
    semantic::{CorpusSource, EmbeddingModel, SemanticSearchService},
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

/// Directories under the base path.
///
/// `data` holds the raw and normalized page dumps, `index` the
/// `<category>.records.json` / `<category>.vectors.bin` pairs served by
/// the search service. Embedding models are cached under `base/models`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub data_path: PathBuf,
    pub index_path: PathBuf,
}

impl AppFactory {
    /// Get application paths, creating the directories if needed
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        Self::paths_at(&base_path)
    }

    pub fn paths_at(base_path: &str) -> Result<AppPaths> {
        let data_path = PathBuf::from(base_path).join("data");
        let index_path = PathBuf::from(base_path).join("index");

        for dir in [&data_path, &index_path] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        Ok(AppPaths {
            base_path: base_path.to_string(),
            data_path,
            index_path,
        })
    }

    /// Load (or create) `config.yaml` with `ATLASSIAN_*` overrides applied
    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        let mut config = Config::load_with(&paths.base_path)?;
        config.confluence = config.confluence.with_env();
        Ok(config)
    }

    /// Models are cached under the directory holding `config.yaml`
    pub fn create_embedding_model(config: &Config) -> Result<EmbeddingModel> {
        EmbeddingModel::new(
            &config.semantic_search.model,
            PathBuf::from(config.base_path()),
        )
        .context("Failed to load embedding model")
    }

    /// Load the embedding model and every category's artifacts
    pub fn create_search_service(paths: &AppPaths, config: &Config) -> Result<SemanticSearchService> {
        let model = Self::create_embedding_model(config)?;
        let source = CorpusSource::new(&paths.index_path, model.model_id_hash(), model.dimensions());

        let service =
            SemanticSearchService::load(Arc::new(model), source, config.default_num_results)?;

        for stats in service.stats()? {
            log::info!("{} -> {} records", stats.endpoint, stats.records);
        }

        Ok(service)
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<String> {
        if let Ok(base_path) = std::env::var("INCIDEX_BASE_PATH") {
            return Ok(base_path);
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(format!("{}/.local/share/incidex", home.to_string_lossy()))
    }
}
