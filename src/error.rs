//! Error types for lidex.
//!
//! Expected negative outcomes (duplicate insert, no claimable work, output
//! miss) are ordinary return values. Only infrastructure and encoding
//! failures surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid workflow status: {0}")]
    InvalidStatus(String),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    #[error("store has been terminated")]
    Terminated,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject empty identifiers before they reach storage.
pub(crate) fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} id must not be empty")));
    }
    Ok(())
}
