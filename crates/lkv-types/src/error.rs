use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid topology descriptor: {0}")]
    InvalidTopology(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
