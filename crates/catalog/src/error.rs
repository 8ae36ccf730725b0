use thiserror::Error;

/// Catalog lookup errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid model reference '{0}': expected provider/model")]
    InvalidReference(String),

    #[error("model not found in catalog: {0}")]
    ModelNotFound(String),

    #[error("catalog fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog fetch returned {status}")]
    Status { status: reqwest::StatusCode },

    #[error("catalog parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
