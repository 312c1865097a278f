//! Foundation types for the ledger KV gateway.
//!
//! Everything the gateway core passes between its components lives here:
//! signing [`Identity`] records, the [`TopologyDescriptor`] parsed from a
//! connection profile, [`TransactionRequest`]s and the closed
//! [`TransactionResult`] produced from a ledger response envelope.
//!
//! None of these types perform I/O.

pub mod error;
pub mod identity;
pub mod response;
pub mod topology;
pub mod transaction;

pub use error::TypeError;
pub use identity::{Identity, IdentityKind, SecretString, X509Credentials};
pub use response::{TransactionResult, NOT_FOUND, VERIFICATION_FAILED};
pub use topology::{
    CertificateAuthorityInfo, ChannelInfo, ClientInfo, Endpoint, OrganizationInfo,
    TopologyDescriptor,
};
pub use transaction::{TransactionMode, TransactionRequest, TransientMap};
