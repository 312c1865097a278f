//! Ledger network client contracts.
//!
//! The gateway core never speaks a ledger wire protocol itself. It talks to
//! the network through the traits in this crate:
//!
//! - [`CertificateAuthority`] -- enrolls an identity and returns its
//!   certificate and private key
//! - [`GatewayConnector`] / [`GatewayConnection`] -- authenticated connection
//!   scoped to one identity
//! - [`Network`] / [`Contract`] -- channel and deployed contract handles used
//!   to evaluate or submit transactions
//!
//! [`SimulatedCa`] and [`SimulatedNetwork`] implement these contracts in
//! memory. They run the key-value contract against an in-memory world state
//! and count connections, which is what the gateway's tests and the
//! development CLI use.

pub mod ca;
pub mod chaincode;
pub mod error;
pub mod gateway;
pub mod simulated_ca;
pub mod simulated_network;

pub use ca::{CertificateAuthority, Enrollment, EnrollmentRequest};
pub use chaincode::{functions, TRANSIENT_MESSAGE_FIELD};
pub use error::{FabricError, FabricResult};
pub use gateway::{ConnectOptions, Contract, GatewayConnection, GatewayConnector, Network};
pub use simulated_ca::{CertificateVerifier, IssuedCertificate, SimulatedCa};
pub use simulated_network::SimulatedNetwork;
