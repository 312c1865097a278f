/// Errors reported by ledger network services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// The service could not be reached.
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// Credentials or certificate were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The CA refused a second enrollment of the same id.
    #[error("identity already enrolled: {0}")]
    AlreadyEnrolled(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("contract {contract} not found on channel {channel}")]
    ContractNotFound { channel: String, contract: String },

    #[error("unknown contract function: {0}")]
    UnknownFunction(String),

    /// Proposal was rejected during endorsement (bad arguments, contract error).
    #[error("endorsement failed: {0}")]
    Endorsement(String),

    /// Transaction was endorsed but not committed.
    #[error("commit failed: {0}")]
    Commit(String),

    /// The connection was used after disconnect.
    #[error("gateway connection is closed")]
    Disconnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// Whether the error means the connection itself is unusable.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Disconnected)
    }
}

/// Convenience alias used throughout the fabric crate.
pub type FabricResult<T> = std::result::Result<T, FabricError>;
