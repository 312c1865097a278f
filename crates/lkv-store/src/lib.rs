//! Signing-identity storage for the ledger KV gateway.
//!
//! A key store (a "wallet" in ledger terminology) maps identity names to
//! enrolled X.509 identities. Only the identity manager in `lkv-gateway`
//! reads or writes it.
//!
//! # Backends
//!
//! All backends implement the [`KeyStore`] trait:
//!
//! - [`InMemoryKeyStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileSystemKeyStore`] -- one `<name>.id` JSON file per identity
//!
//! # Design Rules
//!
//! 1. Identities are immutable once written. There is no overwrite operation.
//! 2. Writes are create-if-absent: a second write for the same name is a
//!    no-op that reports `false`.
//! 3. A written identity becomes visible atomically, never half-written.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use filesystem::FileSystemKeyStore;
pub use memory::InMemoryKeyStore;
pub use traits::{validate_name, KeyStore};
