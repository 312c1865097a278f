use std::fmt;
use std::time::Duration;

use thiserror::Error;

use lkv_fabric::FabricError;
use lkv_store::StoreError;
use lkv_types::TransactionMode;

use crate::lifecycle::OperationPhase;

/// Errors produced by the gateway core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid configuration or topology entry.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller supplied an unusable argument (empty key, empty collection).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read identity {name} from key store: {source}")]
    StoreRead {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to persist identity {name}: {source}")]
    StoreWrite {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("enrollment of {name} failed: {source}")]
    Enrollment {
        name: String,
        #[source]
        source: FabricError,
    },

    #[error("gateway connection failed: {0}")]
    Connection(#[source] FabricError),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("contract {contract} not found on channel {channel}")]
    ContractNotFound { channel: String, contract: String },

    /// The ledger call itself failed.
    #[error("{mode} of {operation} failed: {source}")]
    Dispatch {
        operation: String,
        mode: TransactionMode,
        #[source]
        source: FabricError,
    },

    /// The contract answered with an error sentinel or an unreadable envelope.
    #[error("contract rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("session pool: {0}")]
    Pool(String),

    #[error("invalid operation transition from {from} to {to}")]
    InvalidTransition {
        from: OperationPhase,
        to: OperationPhase,
    },

    /// Lower-level error annotated with the operation and its target.
    #[error("{operation} {target}: {source}")]
    Operation {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<GatewayError>,
    },
}

/// Coarse classification used by callers to map errors to responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    InvalidRequest,
    StoreRead,
    StoreWrite,
    Enrollment,
    Connection,
    ChannelNotFound,
    ContractNotFound,
    Dispatch,
    Timeout,
    Pool,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::InvalidRequest => "invalid_request",
            Self::StoreRead => "store_read",
            Self::StoreWrite => "store_write",
            Self::Enrollment => "enrollment",
            Self::Connection => "connection",
            Self::ChannelNotFound => "channel_not_found",
            Self::ContractNotFound => "contract_not_found",
            Self::Dispatch => "dispatch",
            Self::Timeout => "timeout",
            Self::Pool => "pool",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl GatewayError {
    /// Kind of the underlying error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::StoreRead { .. } => ErrorKind::StoreRead,
            Self::StoreWrite { .. } => ErrorKind::StoreWrite,
            Self::Enrollment { .. } => ErrorKind::Enrollment,
            Self::Connection(_) => ErrorKind::Connection,
            Self::ChannelNotFound(_) => ErrorKind::ChannelNotFound,
            Self::ContractNotFound { .. } => ErrorKind::ContractNotFound,
            Self::Dispatch { .. } | Self::Rejected { .. } => ErrorKind::Dispatch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Pool(_) => ErrorKind::Pool,
            Self::InvalidTransition { .. } => ErrorKind::Internal,
            Self::Operation { source, .. } => source.kind(),
        }
    }

    /// Wrap with the operation name and its target key or collection.
    /// An existing wrapper is kept as is.
    pub fn with_context(self, operation: &'static str, target: impl Into<String>) -> Self {
        match self {
            Self::Operation { .. } => self,
            other => Self::Operation {
                operation,
                target: target.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through context wrappers.
    pub fn root(&self) -> &GatewayError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the session that produced this error should not be reused.
    pub fn poisons_session(&self) -> bool {
        match self.root() {
            Self::Dispatch { source, .. } => source.is_connection_fault(),
            Self::Timeout { .. } | Self::Connection(_) => true,
            _ => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_context() {
        let err = GatewayError::ChannelNotFound("ch".into()).with_context("getValue", "k1");
        assert_eq!(err.kind(), ErrorKind::ChannelNotFound);
        assert!(err.to_string().starts_with("getValue k1: channel not found"));
    }

    #[test]
    fn context_is_not_stacked() {
        let err = GatewayError::Pool("closed".into())
            .with_context("getValue", "a")
            .with_context("putValue", "b");
        assert!(err.to_string().starts_with("getValue a:"));
    }

    #[test]
    fn rejected_is_a_dispatch_error() {
        let err = GatewayError::Rejected {
            operation: "KVContract:get".into(),
            message: "contract returned error: BOOM".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Dispatch);
        assert!(!err.poisons_session());
    }

    #[test]
    fn connection_faults_poison_sessions() {
        let err = GatewayError::Dispatch {
            operation: "op".into(),
            mode: TransactionMode::Submit,
            source: FabricError::Disconnected,
        }
        .with_context("putValue", "k");
        assert!(err.poisons_session());

        let endorsement = GatewayError::Dispatch {
            operation: "op".into(),
            mode: TransactionMode::Submit,
            source: FabricError::Endorsement("bad args".into()),
        };
        assert!(!endorsement.poisons_session());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::StoreWrite.to_string(), "store_write");
    }
}
