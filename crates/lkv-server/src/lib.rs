//! REST facade for the ledger KV gateway.
//!
//! Routes map one-to-one onto [`LedgerClient`](lkv_gateway::LedgerClient)
//! operations. Negative outcomes become 404 (missing key or message) or 400
//! (failed verification, missing fields); every other failure is a 500 whose
//! body names the failed action.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::LkvServer;
