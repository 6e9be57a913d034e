//! Common error types for the DNS failover components.

use std::fmt;

/// A specialized Result type for shared operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type, used by persistence plumbing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new storage error.
    pub fn storage(msg: impl fmt::Display) -> Self {
        Error::Storage(msg.to_string())
    }
}
