//! Ledger session and identity core.
//!
//! Each operation follows the same sequence:
//!
//! 1. [`SessionManager`] resolves the caller's identity through the
//!    [`IdentityManager`], enrolling it with the certificate authority and
//!    writing it to the key store the first time the name is seen.
//! 2. It opens a gateway connection as that identity and resolves the
//!    configured channel and contract into a [`ContractHandle`].
//! 3. [`TransactionDispatcher`] evaluates or submits the request, attaching
//!    any transient payload, and classifies the response into a
//!    [`TransactionResult`](lkv_types::TransactionResult).
//! 4. The [`Session`] is closed on every exit path, including errors,
//!    timeouts and cancellation.
//!
//! [`LedgerClient`] packages this sequence as the key-value and
//! private-message operations, optionally over a [`SessionPool`].
//!
//! Configuration is an explicit [`GatewayConfig`] built once at startup and
//! passed by reference into the managers.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod pool;
pub mod session;
pub mod topology;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use client::LedgerClient;
pub use config::{DiscoveryConfig, GatewayConfig, PoolConfig, TimeoutConfig};
pub use dispatcher::TransactionDispatcher;
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use identity::{EnrollmentCredentials, IdentityManager};
pub use lifecycle::{OperationLifecycle, OperationPhase};
pub use pool::{PooledSession, SessionPool};
pub use session::{ContractHandle, Session, SessionManager};
pub use topology::TopologyLoader;
