use crate::{
    records::Category,
    semantic::DEFAULT_MODEL,
    storage::{self, StorageManager},
};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_NUM_RESULTS: usize = 100;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_PAGE_LIMIT: u32 = 50;
const DEFAULT_REQUEST_DELAY_MS: u64 = 500;

/// Configuration for embedding generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Texts per embedding call when vectorizing a category
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBEDDING_BATCH_SIZE
}

/// Wiki connection and the parent page of each category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// e.g. "example.atlassian.net"; `ATLASSIAN_DOMAIN` overrides
    #[serde(default)]
    pub domain: String,

    /// `ATLASSIAN_EMAIL` overrides
    #[serde(default)]
    pub email: String,

    /// `ATLASSIAN_API_TOKEN` overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Pause between requests, to stay under the wiki's rate limits
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Category -> parent page id
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<Category, String>,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            email: String::new(),
            api_token: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            sources: default_sources(),
        }
    }
}

impl ConfluenceConfig {
    /// Apply `ATLASSIAN_*` environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(domain) = std::env::var("ATLASSIAN_DOMAIN") {
            self.domain = domain;
        }
        if let Ok(email) = std::env::var("ATLASSIAN_EMAIL") {
            self.email = email;
        }
        if let Ok(token) = std::env::var("ATLASSIAN_API_TOKEN") {
            self.api_token = Some(token);
        }
        self
    }
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_request_delay_ms() -> u64 {
    DEFAULT_REQUEST_DELAY_MS
}

fn default_sources() -> BTreeMap<Category, String> {
    BTreeMap::from([
        (Category::Incidents, "9251782664".to_string()),
        (Category::Solicitudes, "9293692929".to_string()),
        (Category::Postmortem, "9293955073".to_string()),
        (Category::Causaraiz, "9293856769".to_string()),
    ])
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Results per search when the caller does not ask for a count
    #[serde(default = "default_num_results")]
    pub default_num_results: usize,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            default_num_results: DEFAULT_NUM_RESULTS,
            semantic_search: SemanticSearchConfig::default(),
            confluence: ConfluenceConfig::default(),
            base_path: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_num_results() -> usize {
    DEFAULT_NUM_RESULTS
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.default_num_results == 0 {
            bail!("default_num_results must be greater than 0");
        }

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!("listen_addr must be a socket address, got '{}'", self.listen_addr);
        }

        if self.semantic_search.model.trim().is_empty() {
            bail!("semantic_search.model must not be empty");
        }

        if self.semantic_search.batch_size == 0 {
            bail!("semantic_search.batch_size must be greater than 0");
        }

        if self.confluence.page_limit == 0 {
            bail!("confluence.page_limit must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
