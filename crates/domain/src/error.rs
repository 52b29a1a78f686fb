/// Shared error type used across all Runtime Governance Engine crates.
///
/// Variants map onto the error taxonomy in the governance spec: most of
/// them are *not* failures of the engine itself but expected outcomes
/// (`InvalidPolicy`, `NotFound`, ...) that callers branch on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
