use std::sync::Arc;

use async_trait::async_trait;

use lkv_types::{Identity, TopologyDescriptor, TransactionRequest};

use crate::error::FabricResult;

/// Options passed when opening a gateway connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Use service discovery to locate endorsing peers.
    pub discovery_enabled: bool,
    /// Rewrite discovered endpoints to `localhost` (containerized networks).
    pub as_localhost: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            as_localhost: true,
        }
    }
}

/// Opens authenticated connections to the ledger network.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(
        &self,
        topology: &TopologyDescriptor,
        identity: &Identity,
        options: &ConnectOptions,
    ) -> FabricResult<Box<dyn GatewayConnection>>;
}

/// An open connection scoped to one identity.
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Resolve a channel on the live network.
    async fn network(&self, channel: &str) -> FabricResult<Arc<dyn Network>>;

    /// Release the connection. Calling it more than once is a no-op.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// A channel on the live network.
pub trait Network: Send + Sync {
    fn name(&self) -> &str;

    fn contract(&self, name: &str) -> FabricResult<Arc<dyn Contract>>;
}

/// A deployed contract on a channel.
#[async_trait]
pub trait Contract: Send + Sync {
    fn name(&self) -> &str;

    /// Run the request read-only against current state.
    async fn evaluate(&self, request: &TransactionRequest) -> FabricResult<Vec<u8>>;

    /// Endorse, order and commit the request; returns once committed.
    async fn submit(&self, request: &TransactionRequest) -> FabricResult<Vec<u8>>;
}
