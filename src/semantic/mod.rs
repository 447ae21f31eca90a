//! Semantic search over incident records.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `index`: In-memory flat L2 index, rows paired with store positions
//! - `storage`: Binary file I/O for `<category>.vectors.bin`
//! - `preprocess`: Text preprocessing for embedding input
//! - `lexical`: Exact substring matching and occurrence counting
//! - `hybrid`: Vector candidates, exact filter, full-scan fallback, ranking
//! - `service`: Per-category corpora and the search entry point

pub mod embeddings;
pub mod hybrid;
mod index;
mod lexical;
mod preprocess;
mod service;
mod storage;

pub use embeddings::{model_id_hash, EmbeddingModel, QueryEncoder};
pub use index::{IndexError, NearestNeighbors, VectorIndex};
pub use preprocess::preprocess_content;
pub use service::{
    CategoryCorpus, CategoryStats, CorpusSource, SemanticSearchError, SemanticSearchService,
};
pub use storage::{store_fingerprint, VectorStorage, VectorStorageError};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
