use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use lkv_types::{Identity, TopologyDescriptor, TransactionRequest};

use crate::chaincode::{self, WorldState};
use crate::error::{FabricError, FabricResult};
use crate::gateway::{ConnectOptions, Contract, GatewayConnection, GatewayConnector, Network};
use crate::simulated_ca::CertificateVerifier;

/// Shared state behind every handle of one simulated network.
#[derive(Default)]
struct NetworkState {
    channels: RwLock<HashMap<String, HashMap<String, Arc<WorldState>>>>,
    verifier: Option<CertificateVerifier>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    committed: AtomicU64,
    fail_connect: AtomicBool,
    fail_invoke: AtomicBool,
    connect_latency: Mutex<Option<Duration>>,
    invoke_latency: Mutex<Option<Duration>>,
}

impl NetworkState {
    async fn delay(slot: &Mutex<Option<Duration>>) {
        let latency = *slot.lock().expect("network lock poisoned");
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
    }
}

/// In-memory peer network running the key-value contract.
///
/// Cloning yields another handle to the same network. Connections are
/// counted on open and on disconnect, so a test can assert that every
/// connection was released with [`open_connections`](Self::open_connections).
#[derive(Clone, Default)]
pub struct SimulatedNetwork {
    state: Arc<NetworkState>,
}

impl SimulatedNetwork {
    /// Network with no channels that accepts any certificate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Network that only accepts certificates issued by `verifier`'s CA.
    pub fn with_trusted_ca(verifier: CertificateVerifier) -> Self {
        Self {
            state: Arc::new(NetworkState {
                verifier: Some(verifier),
                ..Default::default()
            }),
        }
    }

    /// Create every channel named in `topology`, each running `contract`.
    pub fn seed_from_topology(self, topology: &TopologyDescriptor, contract: &str) -> Self {
        for channel in topology.channel_names() {
            self.deploy(channel, contract);
        }
        self
    }

    /// Deploy `contract` on `channel`, creating the channel if needed.
    pub fn deploy(&self, channel: &str, contract: &str) {
        let mut channels = self.state.channels.write().expect("network lock poisoned");
        channels
            .entry(channel.to_string())
            .or_default()
            .entry(contract.to_string())
            .or_insert_with(|| Arc::new(WorldState::default()));
    }

    /// Builder form of [`deploy`](Self::deploy).
    pub fn with_contract(self, channel: &str, contract: &str) -> Self {
        self.deploy(channel, contract);
        self
    }

    /// Remove a channel from the live network.
    pub fn remove_channel(&self, channel: &str) -> bool {
        self.state
            .channels
            .write()
            .expect("network lock poisoned")
            .remove(channel)
            .is_some()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every evaluate/submit fail endorsement.
    pub fn set_fail_invoke(&self, fail: bool) {
        self.state.fail_invoke.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_latency(&self, latency: Option<Duration>) {
        *self.state.connect_latency.lock().expect("network lock poisoned") = latency;
    }

    pub fn set_invoke_latency(&self, latency: Option<Duration>) {
        *self.state.invoke_latency.lock().expect("network lock poisoned") = latency;
    }

    /// Total connections opened.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Total connections released.
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet released.
    pub fn open_connections(&self) -> usize {
        self.connects().saturating_sub(self.disconnects())
    }

    /// Number of committed submit transactions.
    pub fn committed_transactions(&self) -> u64 {
        self.state.committed.load(Ordering::SeqCst)
    }

    /// Number of public keys in a contract's world state.
    pub fn key_count(&self, channel: &str, contract: &str) -> usize {
        self.state
            .channels
            .read()
            .expect("network lock poisoned")
            .get(channel)
            .and_then(|c| c.get(contract))
            .map(|ws| ws.public_len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for SimulatedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedNetwork")
            .field("connects", &self.connects())
            .field("disconnects", &self.disconnects())
            .finish()
    }
}

#[async_trait]
impl GatewayConnector for SimulatedNetwork {
    async fn connect(
        &self,
        _topology: &TopologyDescriptor,
        identity: &Identity,
        options: &ConnectOptions,
    ) -> FabricResult<Box<dyn GatewayConnection>> {
        NetworkState::delay(&self.state.connect_latency).await;
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(FabricError::Unreachable("simulated peer network".into()));
        }
        if let Some(verifier) = &self.state.verifier {
            let cert = verifier.verify(identity.certificate())?;
            if cert.subject != identity.name() {
                return Err(FabricError::Unauthorized(format!(
                    "certificate subject {} does not match identity {}",
                    cert.subject,
                    identity.name()
                )));
            }
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            connection = id,
            identity = identity.name(),
            msp = identity.msp_id(),
            discovery = options.discovery_enabled,
            "connection opened"
        );
        Ok(Box::new(SimConnection {
            id,
            state: Arc::clone(&self.state),
            open: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct SimConnection {
    id: usize,
    state: Arc<NetworkState>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl GatewayConnection for SimConnection {
    async fn network(&self, channel: &str) -> FabricResult<Arc<dyn Network>> {
        if !self.is_connected() {
            return Err(FabricError::Disconnected);
        }
        let contracts = self
            .state
            .channels
            .read()
            .expect("network lock poisoned")
            .get(channel)
            .cloned()
            .ok_or_else(|| FabricError::ChannelNotFound(channel.to_string()))?;
        Ok(Arc::new(SimChannel {
            name: channel.to_string(),
            contracts,
            state: Arc::clone(&self.state),
            open: Arc::clone(&self.open),
        }))
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.state.disconnects.fetch_add(1, Ordering::SeqCst);
            debug!(connection = self.id, "connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

struct SimChannel {
    name: String,
    contracts: HashMap<String, Arc<WorldState>>,
    state: Arc<NetworkState>,
    open: Arc<AtomicBool>,
}

impl Network for SimChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self, name: &str) -> FabricResult<Arc<dyn Contract>> {
        let world = self
            .contracts
            .get(name)
            .cloned()
            .ok_or_else(|| FabricError::ContractNotFound {
                channel: self.name.clone(),
                contract: name.to_string(),
            })?;
        Ok(Arc::new(SimContract {
            name: name.to_string(),
            world,
            state: Arc::clone(&self.state),
            open: Arc::clone(&self.open),
        }))
    }
}

struct SimContract {
    name: String,
    world: Arc<WorldState>,
    state: Arc<NetworkState>,
    open: Arc<AtomicBool>,
}

impl SimContract {
    async fn run(&self, request: &TransactionRequest, commit: bool) -> FabricResult<Vec<u8>> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(FabricError::Disconnected);
        }
        NetworkState::delay(&self.state.invoke_latency).await;
        if self.state.fail_invoke.load(Ordering::SeqCst) {
            return Err(FabricError::Endorsement("simulated endorsement failure".into()));
        }
        let (response, writes) = chaincode::execute(&self.world, request)?;
        if commit {
            self.world.apply(writes);
            self.state.committed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(response)
    }
}

#[async_trait]
impl Contract for SimContract {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, request: &TransactionRequest) -> FabricResult<Vec<u8>> {
        self.run(request, false).await
    }

    async fn submit(&self, request: &TransactionRequest) -> FabricResult<Vec<u8>> {
        self.run(request, true).await
    }
}
