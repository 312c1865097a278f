/// Errors from key store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identity name cannot be used as a store key.
    #[error("invalid identity name: {0:?}")]
    InvalidName(String),

    /// A stored record could not be decoded.
    #[error("corrupt identity record {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// Serialization failure while encoding a record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend refused the write.
    #[error("store is read-only")]
    ReadOnly,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
