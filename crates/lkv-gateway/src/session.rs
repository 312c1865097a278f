use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use lkv_fabric::{Contract, FabricError, GatewayConnection, GatewayConnector};
use lkv_types::TopologyDescriptor;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::identity::IdentityManager;
use crate::lifecycle::{OperationLifecycle, OperationPhase};

/// A resolved contract on the configured channel.
#[derive(Clone)]
pub struct ContractHandle {
    channel: String,
    contract: Arc<dyn Contract>,
}

impl ContractHandle {
    /// Channel the contract was resolved on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Name of the deployed contract.
    pub fn contract_name(&self) -> &str {
        self.contract.name()
    }

    pub(crate) fn contract(&self) -> &dyn Contract {
        self.contract.as_ref()
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("channel", &self.channel)
            .field("contract", &self.contract.name())
            .finish()
    }
}

/// An open gateway connection plus its contract handle.
///
/// The connection is released exactly once: by [`close`](Self::close) or,
/// failing that, when the session is dropped.
pub struct Session {
    identity: String,
    connection: Option<Box<dyn GatewayConnection>>,
    handle: ContractHandle,
    opened_at: Instant,
}

impl Session {
    /// Identity the session was opened as.
    pub fn identity_name(&self) -> &str {
        &self.identity
    }

    /// Contract handle, valid while the session is open.
    pub fn handle(&self) -> &ContractHandle {
        &self.handle
    }

    /// Whether the connection is still held and connected.
    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_connected())
    }

    /// Disconnect. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
            debug!(
                identity = %self.identity,
                elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
                "session closed"
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("open", &self.is_open())
            .field("handle", &self.handle)
            .finish()
    }
}

/// Disconnects a connection whose setup did not finish, including when the
/// opening future is dropped.
struct DisconnectOnDrop<'a>(Option<&'a dyn GatewayConnection>);

impl DisconnectOnDrop<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for DisconnectOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.0.take() {
            warn!("releasing partially established gateway connection");
            connection.disconnect();
        }
    }
}

/// Opens sessions against the configured channel and contract.
pub struct SessionManager {
    config: Arc<GatewayConfig>,
    topology: Arc<TopologyDescriptor>,
    identities: Arc<IdentityManager>,
    connector: Arc<dyn GatewayConnector>,
}

impl SessionManager {
    pub fn new(
        config: Arc<GatewayConfig>,
        topology: Arc<TopologyDescriptor>,
        identities: Arc<IdentityManager>,
        connector: Arc<dyn GatewayConnector>,
    ) -> Self {
        Self {
            config,
            topology,
            identities,
            connector,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Identity manager used to resolve session identities.
    pub fn identities(&self) -> &Arc<IdentityManager> {
        &self.identities
    }

    /// Open a session as `identity_name`.
    ///
    /// On failure no connection is left open.
    pub async fn open(&self, identity_name: &str) -> GatewayResult<Session> {
        let mut lifecycle = OperationLifecycle::new();
        self.open_tracked(identity_name, &mut lifecycle).await
    }

    /// [`open`](Self::open), recording phases in `lifecycle`.
    pub async fn open_tracked(
        &self,
        identity_name: &str,
        lifecycle: &mut OperationLifecycle,
    ) -> GatewayResult<Session> {
        let result = self.establish(identity_name, lifecycle).await;
        if result.is_err() {
            lifecycle.fail();
        }
        result
    }

    async fn establish(
        &self,
        identity_name: &str,
        lifecycle: &mut OperationLifecycle,
    ) -> GatewayResult<Session> {
        lifecycle.advance(OperationPhase::SessionOpening)?;
        lifecycle.advance(OperationPhase::IdentityResolving)?;
        let identity = self.identities.ensure_known(identity_name).await?;

        let limit = self.config.timeouts.connect;
        let options = self.config.connect_options();
        let connection = tokio::time::timeout(
            limit,
            self.connector.connect(&self.topology, &identity, &options),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            step: "connect",
            after: limit,
        })?
        .map_err(GatewayError::Connection)?;
        let guard = DisconnectOnDrop(Some(connection.as_ref()));
        let handle = self.resolve_contract(connection.as_ref(), limit).await?;
        lifecycle.advance(OperationPhase::ConnectionEstablished)?;
        guard.disarm();

        debug!(
            identity = identity_name,
            channel = handle.channel(),
            contract = handle.contract_name(),
            "session opened"
        );
        Ok(Session {
            identity: identity_name.to_string(),
            connection: Some(connection),
            handle,
            opened_at: Instant::now(),
        })
    }

    async fn resolve_contract(
        &self,
        connection: &dyn GatewayConnection,
        limit: Duration,
    ) -> GatewayResult<ContractHandle> {
        let channel = &self.config.channel_name;
        let network = tokio::time::timeout(limit, connection.network(channel))
            .await
            .map_err(|_| GatewayError::Timeout {
                step: "channel",
                after: limit,
            })?
            .map_err(|e| match e {
                FabricError::ChannelNotFound(name) => GatewayError::ChannelNotFound(name),
                other => GatewayError::Connection(other),
            })?;

        let contract = network
            .contract(&self.config.contract_name)
            .map_err(|e| match e {
                FabricError::ContractNotFound { channel, contract } => {
                    GatewayError::ContractNotFound { channel, contract }
                }
                other => GatewayError::Connection(other),
            })?;

        Ok(ContractHandle {
            channel: channel.clone(),
            contract,
        })
    }

    /// Open a session, run `f` with its contract handle, then close it.
    ///
    /// The session is closed on every path, including when `f` fails or the
    /// returned future is dropped.
    pub async fn with_session<T, F, Fut>(&self, identity_name: &str, f: F) -> GatewayResult<T>
    where
        F: FnOnce(ContractHandle) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut lifecycle = OperationLifecycle::new();
        self.with_session_tracked(identity_name, &mut lifecycle, f).await
    }

    /// [`with_session`](Self::with_session), recording phases in `lifecycle`.
    /// The lifecycle ends `Closed` on every path.
    pub async fn with_session_tracked<T, F, Fut>(
        &self,
        identity_name: &str,
        lifecycle: &mut OperationLifecycle,
        f: F,
    ) -> GatewayResult<T>
    where
        F: FnOnce(ContractHandle) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let result = self.run_in_session(identity_name, lifecycle, f).await;
        lifecycle.close();
        result
    }

    async fn run_in_session<T, F, Fut>(
        &self,
        identity_name: &str,
        lifecycle: &mut OperationLifecycle,
        f: F,
    ) -> GatewayResult<T>
    where
        F: FnOnce(ContractHandle) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut session = self.open_tracked(identity_name, lifecycle).await?;
        lifecycle.advance(OperationPhase::Dispatching)?;
        let result = f(session.handle().clone()).await;
        if result.is_ok() {
            lifecycle.advance(OperationPhase::Completed)?;
        } else {
            lifecycle.fail();
        }
        lifecycle.advance(OperationPhase::Closing)?;
        session.close();
        result
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("channel", &self.config.channel_name)
            .field("contract", &self.config.contract_name)
            .finish_non_exhaustive()
    }
}
