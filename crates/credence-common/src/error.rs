use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredenceError {
    /// Input failed validation (bad request parameters, derivative sets
    /// out of bounds, fewer than two sets surviving generation).
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external collaborator exhausted its retries.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The build produced an impossible shape (zero valid nodes, mismatched
    /// embedding dimensions).
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CredenceError>;
