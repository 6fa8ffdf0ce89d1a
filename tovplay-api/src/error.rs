use thiserror::Error;
use tovplay_core::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unauthorized; session expired")]
    Unauthorized,
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("login failed: {0}")]
    Login(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
