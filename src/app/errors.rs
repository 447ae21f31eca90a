use crate::semantic::SemanticSearchError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Search(#[from] SemanticSearchError),

    #[error("invalid query parameters: {0}")]
    QueryParams(#[from] axum::extract::rejection::QueryRejection),

    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// The caller sent something unusable, as opposed to a server fault.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            AppError::Search(SemanticSearchError::InvalidQuery) | AppError::QueryParams(_)
        )
    }
}
