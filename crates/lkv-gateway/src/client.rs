use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use lkv_fabric::{functions, CertificateAuthority, GatewayConnector, TRANSIENT_MESSAGE_FIELD};
use lkv_store::KeyStore;
use lkv_types::{Identity, TopologyDescriptor, TransactionRequest, TransactionResult};

use crate::config::GatewayConfig;
use crate::dispatcher::TransactionDispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::identity::IdentityManager;
use crate::lifecycle::{OperationLifecycle, OperationPhase};
use crate::pool::SessionPool;
use crate::session::{ContractHandle, SessionManager};
use crate::topology::TopologyLoader;

/// Key-value and private-message operations against the configured contract.
///
/// Every call runs as the configured admin identity. Without a pool each call
/// opens and closes its own session; with one, sessions are checked out and
/// returned.
pub struct LedgerClient {
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionManager>,
    dispatcher: TransactionDispatcher,
    pool: Option<SessionPool>,
}

impl LedgerClient {
    /// Load the connection profile named by `config` and wire the core.
    pub async fn bootstrap(
        config: GatewayConfig,
        store: Arc<dyn KeyStore>,
        ca: Arc<dyn CertificateAuthority>,
        connector: Arc<dyn GatewayConnector>,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let topology = TopologyLoader::load(&config)?;
        Ok(Self::new(config, topology, store, ca, connector))
    }

    /// Wire the core around an already validated topology.
    ///
    /// Must be called within a Tokio runtime when pooling is configured.
    pub fn new(
        config: GatewayConfig,
        topology: Arc<TopologyDescriptor>,
        store: Arc<dyn KeyStore>,
        ca: Arc<dyn CertificateAuthority>,
        connector: Arc<dyn GatewayConnector>,
    ) -> Self {
        let config = Arc::new(config);
        let identities = Arc::new(IdentityManager::new(&config, Arc::clone(&topology), store, ca));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&config),
            topology,
            identities,
            connector,
        ));
        let pool = config
            .pool
            .clone()
            .map(|pool| SessionPool::new(Arc::clone(&sessions), config.admin_user.clone(), pool));
        info!(
            channel = %config.channel_name,
            contract = %config.contract_name,
            identity = %config.admin_user,
            pooled = pool.is_some(),
            "ledger client ready"
        );
        Self {
            dispatcher: TransactionDispatcher::new(config.timeouts.clone()),
            config,
            sessions,
            pool,
        }
    }

    /// Validated configuration the client was built from.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Session manager used for unpooled calls and by the pool.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The session pool, when pooling is configured.
    pub fn pool(&self) -> Option<&SessionPool> {
        self.pool.as_ref()
    }

    /// Enroll the admin identity now instead of on first use.
    pub async fn enroll_admin(&self) -> GatewayResult<Identity> {
        self.sessions
            .identities()
            .ensure_admin()
            .await
            .map_err(|e| e.with_context("enrollAdmin", self.config.admin_user.clone()))
    }

    /// Read a public value. `None` if the key is absent.
    pub async fn get_value(&self, key: &str) -> GatewayResult<Option<String>> {
        require("key", key)?;
        let request = TransactionRequest::evaluate(functions::GET).with_arg(key);
        let result = self.invoke(request).await.map_err(|e| e.with_context("getValue", key))?;
        match result {
            TransactionResult::NotFound => Ok(None),
            other => expect_payload(functions::GET, other)
                .map(Some)
                .map_err(|e| e.with_context("getValue", key)),
        }
    }

    /// Write a public value and return the contract's response.
    pub async fn put_value(&self, key: &str, value: &str) -> GatewayResult<String> {
        require("key", key)?;
        let request = TransactionRequest::submit(functions::PUT).with_args([key, value]);
        self.invoke(request)
            .await
            .and_then(|result| expect_payload(functions::PUT, result))
            .map_err(|e| e.with_context("putValue", key))
    }

    /// Store `message` in a private collection. The message travels as a
    /// transient field only.
    pub async fn put_private_message(&self, collection: &str, message: &str) -> GatewayResult<String> {
        require("collection", collection)?;
        require("message", message)?;
        let request = TransactionRequest::submit(functions::PUT_PRIVATE_MESSAGE)
            .with_arg(collection)
            .with_transient(TRANSIENT_MESSAGE_FIELD, message.to_string());
        self.invoke(request)
            .await
            .and_then(|result| expect_payload(functions::PUT_PRIVATE_MESSAGE, result))
            .map_err(|e| e.with_context("putPrivateMessage", collection))
    }

    /// Read a private message. `None` if the collection holds none.
    pub async fn get_private_message(&self, collection: &str) -> GatewayResult<Option<String>> {
        require("collection", collection)?;
        let request = TransactionRequest::evaluate(functions::GET_PRIVATE_MESSAGE).with_arg(collection);
        let result = self
            .invoke(request)
            .await
            .map_err(|e| e.with_context("getPrivateMessage", collection))?;
        match result {
            TransactionResult::NotFound => Ok(None),
            other => expect_payload(functions::GET_PRIVATE_MESSAGE, other)
                .map(Some)
                .map_err(|e| e.with_context("getPrivateMessage", collection)),
        }
    }

    /// Whether `message` matches the one stored in `collection`.
    pub async fn verify_private_message(&self, collection: &str, message: &str) -> GatewayResult<bool> {
        require("collection", collection)?;
        require("message", message)?;
        let request = TransactionRequest::evaluate(functions::VERIFY_PRIVATE_MESSAGE)
            .with_arg(collection)
            .with_transient(TRANSIENT_MESSAGE_FIELD, message.to_string());
        let result = self
            .invoke(request)
            .await
            .map_err(|e| e.with_context("verifyPrivateMessage", collection))?;
        match result {
            TransactionResult::Success { .. } => Ok(true),
            TransactionResult::VerificationFailed | TransactionResult::NotFound => Ok(false),
            TransactionResult::Error { message } => Err(GatewayError::Rejected {
                operation: functions::VERIFY_PRIVATE_MESSAGE.to_string(),
                message,
            }
            .with_context("verifyPrivateMessage", collection)),
        }
    }

    /// Run an arbitrary request in a session and return the classified result.
    pub async fn invoke(&self, request: TransactionRequest) -> GatewayResult<TransactionResult> {
        let mut lifecycle = OperationLifecycle::new();
        self.invoke_tracked(request, &mut lifecycle).await
    }

    /// [`invoke`](Self::invoke), recording phases in `lifecycle`. Pooled and
    /// unpooled calls pass through the same phases and end `Closed`.
    pub async fn invoke_tracked(
        &self,
        request: TransactionRequest,
        lifecycle: &mut OperationLifecycle,
    ) -> GatewayResult<TransactionResult> {
        let dispatcher = self.dispatcher.clone();
        self.with_contract(lifecycle, |handle| async move {
            dispatcher.invoke(&handle, &request).await
        })
        .await
    }

    async fn with_contract<T, F, Fut>(&self, lifecycle: &mut OperationLifecycle, f: F) -> GatewayResult<T>
    where
        F: FnOnce(ContractHandle) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let Some(pool) = &self.pool else {
            return self
                .sessions
                .with_session_tracked(&self.config.admin_user, lifecycle, f)
                .await;
        };

        let result = run_pooled(pool, lifecycle, f).await;
        lifecycle.close();
        result
    }

    /// Stop the session pool, if any.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("sessions", &self.sessions)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

async fn run_pooled<T, F, Fut>(
    pool: &SessionPool,
    lifecycle: &mut OperationLifecycle,
    f: F,
) -> GatewayResult<T>
where
    F: FnOnce(ContractHandle) -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    lifecycle.advance(OperationPhase::SessionOpening)?;
    let session = match pool.acquire().await {
        Ok(session) => session,
        Err(e) => {
            lifecycle.fail();
            return Err(e);
        }
    };
    // A checked-out session already holds a resolved identity and contract.
    lifecycle.advance(OperationPhase::IdentityResolving)?;
    lifecycle.advance(OperationPhase::ConnectionEstablished)?;
    lifecycle.advance(OperationPhase::Dispatching)?;

    let result = f(session.handle().clone()).await;
    let poisoned = match &result {
        Ok(_) => {
            lifecycle.advance(OperationPhase::Completed)?;
            false
        }
        Err(e) => {
            lifecycle.fail();
            if e.poisons_session() {
                debug!(kind = %e.kind(), "discarding pooled session after failure");
            }
            e.poisons_session()
        }
    };
    lifecycle.advance(OperationPhase::Closing)?;
    if poisoned {
        session.discard();
    }
    result
}

fn require(field: &str, value: &str) -> GatewayResult<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn expect_payload(operation: &str, result: TransactionResult) -> GatewayResult<String> {
    match result {
        TransactionResult::Success { payload } => Ok(String::from_utf8_lossy(&payload).into_owned()),
        TransactionResult::Error { message } => Err(GatewayError::Rejected {
            operation: operation.to_string(),
            message,
        }),
        other => Err(GatewayError::Rejected {
            operation: operation.to_string(),
            message: format!("unexpected {} result", other.label()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::error::ErrorKind;
    use crate::testutil::TestEnv;
    use std::time::Duration;

    #[tokio::test]
    async fn put_then_get() {
        let env = TestEnv::new();
        let client = env.client();

        assert_eq!(client.put_value("k", "v").await.unwrap(), "OK");
        assert_eq!(client.get_value("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(env.network.open_connections(), 0);
        assert_eq!(env.network.connects(), 2);
        assert_eq!(env.ca.enrollment_count(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let env = TestEnv::new();
        assert_eq!(env.client().get_value("missing-key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_may_be_empty_but_keys_may_not() {
        let env = TestEnv::new();
        let client = env.client();
        client.put_value("k", "").await.unwrap();
        assert_eq!(client.get_value("k").await.unwrap().as_deref(), Some(""));

        let err = client.put_value(" ", "v").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(env.network.connects(), 2);
    }

    #[tokio::test]
    async fn private_message_round() {
        let env = TestEnv::new();
        let client = env.client();

        client.put_private_message("coll", "secret").await.unwrap();
        assert!(client.verify_private_message("coll", "secret").await.unwrap());
        assert!(!client.verify_private_message("coll", "wrong").await.unwrap());
        assert!(!client.verify_private_message("empty", "secret").await.unwrap());
        assert_eq!(
            client.get_private_message("coll").await.unwrap().as_deref(),
            Some("secret")
        );
        assert_eq!(client.get_private_message("other").await.unwrap(), None);
        assert_eq!(env.network.open_connections(), 0);
    }

    #[tokio::test]
    async fn errors_carry_context_and_close_sessions() {
        let env = TestEnv::new();
        env.network.set_fail_invoke(true);
        let err = env.client().put_private_message("coll", "hush").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Dispatch);
        let text = err.to_string();
        assert!(text.starts_with("putPrivateMessage coll:"));
        assert!(!text.contains("hush"));
        assert_eq!(env.network.open_connections(), 0);
    }

    #[tokio::test]
    async fn open_and_close_balance_across_failures() {
        let env = TestEnv::new();
        let client = env.client();
        client.put_value("a", "1").await.unwrap();

        env.network.set_fail_invoke(true);
        assert!(client.get_value("a").await.is_err());
        env.network.set_fail_invoke(false);

        env.network.remove_channel("my-channel1");
        assert_eq!(client.get_value("a").await.unwrap_err().kind(), ErrorKind::ChannelNotFound);

        assert_eq!(env.network.connects(), env.network.disconnects());
    }

    #[tokio::test]
    async fn pooled_client_reuses_sessions() {
        let mut env = TestEnv::new();
        env.config.pool = Some(PoolConfig {
            max_size: 2,
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
        });
        let client = env.client();

        client.put_value("k", "v").await.unwrap();
        assert_eq!(client.get_value("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(env.network.connects(), 1);
        assert_eq!(client.pool().map(SessionPool::idle_count), Some(1));

        client.shutdown();
        assert_eq!(env.network.open_connections(), 0);
    }

    #[tokio::test]
    async fn pooled_session_is_dropped_after_timeout() {
        let mut env = TestEnv::new();
        env.config.timeouts.evaluate = Duration::from_millis(20);
        env.config.pool = Some(PoolConfig {
            max_size: 1,
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
        });
        let client = env.client();
        client.put_value("k", "v").await.unwrap();

        env.network.set_invoke_latency(Some(Duration::from_secs(5)));
        let err = client.get_value("k").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(client.pool().map(SessionPool::idle_count), Some(0));
        assert_eq!(env.network.open_connections(), 0);
    }

    fn get_request(key: &str) -> TransactionRequest {
        TransactionRequest::evaluate(functions::GET).with_arg(key)
    }

    #[tokio::test]
    async fn pooled_and_unpooled_calls_record_the_same_phases() {
        use OperationPhase::*;
        let full = [
            Idle,
            SessionOpening,
            IdentityResolving,
            ConnectionEstablished,
            Dispatching,
            Completed,
            Closing,
            Closed,
        ];

        let env = TestEnv::new();
        let mut lifecycle = OperationLifecycle::new();
        env.client().invoke_tracked(get_request("k"), &mut lifecycle).await.unwrap();
        assert_eq!(lifecycle.history(), &full);

        let mut env = TestEnv::new();
        env.config.pool = Some(PoolConfig {
            max_size: 1,
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
        });
        let client = env.client();
        for _ in 0..2 {
            let mut lifecycle = OperationLifecycle::new();
            client.invoke_tracked(get_request("k"), &mut lifecycle).await.unwrap();
            assert_eq!(lifecycle.history(), &full);
        }
        assert_eq!(env.network.connects(), 1);
        client.shutdown();
    }

    #[tokio::test]
    async fn pooled_failures_end_closed() {
        use OperationPhase::*;
        let mut env = TestEnv::new();
        env.config.pool = Some(PoolConfig {
            max_size: 1,
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
        });
        let client = env.client();

        env.network.set_fail_invoke(true);
        let mut lifecycle = OperationLifecycle::new();
        assert!(client.invoke_tracked(get_request("k"), &mut lifecycle).await.is_err());
        assert_eq!(
            lifecycle.history(),
            &[
                Idle,
                SessionOpening,
                IdentityResolving,
                ConnectionEstablished,
                Dispatching,
                Failed,
                Closing,
                Closed,
            ]
        );
        env.network.set_fail_invoke(false);

        client.shutdown();
        let mut lifecycle = OperationLifecycle::new();
        let err = client
            .invoke_tracked(get_request("k"), &mut lifecycle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Pool);
        assert_eq!(lifecycle.history(), &[Idle, SessionOpening, Failed, Closing, Closed]);
    }

    #[tokio::test]
    async fn bootstrap_reads_profile_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-profile-org1.json");
        std::fs::write(&path, crate::testutil::PROFILE_JSON).unwrap();

        let mut env = TestEnv::new();
        env.config.connection_profile = path;
        let client = LedgerClient::bootstrap(
            env.config.clone(),
            env.store.clone(),
            env.ca.clone(),
            Arc::new(env.network.clone()),
        )
        .await
        .unwrap();
        let admin = client.enroll_admin().await.unwrap();
        assert_eq!(admin.name(), "admin");
    }
}
