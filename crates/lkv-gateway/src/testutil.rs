//! Test fixtures: a simulated CA and network wired to an in-memory key store.

use std::sync::Arc;
use std::time::Duration;

use lkv_fabric::SimulatedCa;
use lkv_store::InMemoryKeyStore;
use lkv_types::TopologyDescriptor;

use crate::client::LedgerClient;
use crate::config::{GatewayConfig, TimeoutConfig};
use crate::identity::IdentityManager;
use crate::session::SessionManager;

/// Connection profile of the single-organization development network.
pub const PROFILE_JSON: &str = r#"{
    "name": "test-network-org1",
    "version": "1.0.0",
    "client": { "organization": "Org1" },
    "organizations": {
        "Org1": {
            "mspid": "Org1MSP",
            "peers": ["peer0.org1.example.com"],
            "certificateAuthorities": ["ca.org1.example.com"]
        }
    },
    "peers": { "peer0.org1.example.com": { "url": "grpc://localhost:7041" } },
    "orderers": { "orderer0.example.com": { "url": "grpc://localhost:7030" } },
    "certificateAuthorities": {
        "ca.org1.example.com": {
            "url": "http://localhost:7040",
            "caName": "ca.org1.example.com"
        }
    },
    "channels": { "my-channel1": { "peers": { "peer0.org1.example.com": {} } } }
}"#;

/// Everything a gateway test needs, with counters exposed on `ca`, `network`
/// and `store`. Edit `config` before building components to change behavior.
pub struct TestEnv {
    pub ca: Arc<SimulatedCa>,
    pub network: lkv_fabric::SimulatedNetwork,
    pub store: Arc<InMemoryKeyStore>,
    pub config: GatewayConfig,
    pub topology: Arc<TopologyDescriptor>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// CA with `admin`/`adminpw` registered, and a network trusting it that
    /// runs the configured contract on every profile channel.
    pub fn new() -> Self {
        Self::with_ca(SimulatedCa::new("ca.org1.example.com").with_user("admin", "adminpw"))
    }

    pub fn with_ca(ca: SimulatedCa) -> Self {
        let config = GatewayConfig {
            timeouts: TimeoutConfig::uniform(Duration::from_secs(2)),
            ..GatewayConfig::default()
        };
        let topology = match TopologyDescriptor::from_json_slice(PROFILE_JSON.as_bytes()) {
            Ok(t) => Arc::new(t),
            Err(e) => panic!("fixture profile must parse: {e}"),
        };
        let network = lkv_fabric::SimulatedNetwork::with_trusted_ca(ca.verifier())
            .seed_from_topology(&topology, &config.contract_name);
        Self {
            ca: Arc::new(ca),
            network,
            store: Arc::new(InMemoryKeyStore::new()),
            config,
            topology,
        }
    }

    pub fn identities(&self) -> Arc<IdentityManager> {
        Arc::new(IdentityManager::new(
            &self.config,
            Arc::clone(&self.topology),
            self.store.clone(),
            self.ca.clone(),
        ))
    }

    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(
            Arc::new(self.config.clone()),
            Arc::clone(&self.topology),
            self.identities(),
            Arc::new(self.network.clone()),
        )
    }

    pub fn client(&self) -> LedgerClient {
        LedgerClient::new(
            self.config.clone(),
            Arc::clone(&self.topology),
            self.store.clone(),
            self.ca.clone(),
            Arc::new(self.network.clone()),
        )
    }
}
