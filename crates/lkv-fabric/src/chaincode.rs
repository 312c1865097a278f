use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::json;

use lkv_types::{TransactionRequest, NOT_FOUND, VERIFICATION_FAILED};

use crate::error::{FabricError, FabricResult};

/// Function names exposed by the key-value contract.
pub mod functions {
    pub const GET: &str = "KVContract:get";
    pub const PUT: &str = "KVContract:put";
    pub const PUT_PRIVATE_MESSAGE: &str = "KVContract:putPrivateMessage";
    pub const GET_PRIVATE_MESSAGE: &str = "KVContract:getPrivateMessage";
    pub const VERIFY_PRIVATE_MESSAGE: &str = "KVContract:verifyPrivateMessage";
}

/// Transient field carrying the private message.
pub const TRANSIENT_MESSAGE_FIELD: &str = "message";

#[derive(Clone, Debug)]
struct PrivateEntry {
    message: String,
    hash: [u8; 32],
}

/// World state of one deployed key-value contract.
#[derive(Debug, Default)]
pub(crate) struct WorldState {
    public: RwLock<BTreeMap<String, String>>,
    private: RwLock<HashMap<String, PrivateEntry>>,
}

/// Writes produced by one execution. Applied only on submit.
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    public: Vec<(String, String)>,
    private: Vec<(String, PrivateEntry)>,
}

impl WriteSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }
}

impl WorldState {
    pub(crate) fn apply(&self, writes: WriteSet) {
        if !writes.public.is_empty() {
            let mut public = self.public.write().expect("state lock poisoned");
            public.extend(writes.public);
        }
        if !writes.private.is_empty() {
            let mut private = self.private.write().expect("state lock poisoned");
            private.extend(writes.private);
        }
    }

    pub(crate) fn public_len(&self) -> usize {
        self.public.read().expect("state lock poisoned").len()
    }

    fn read_public(&self, key: &str) -> Option<String> {
        self.public.read().expect("state lock poisoned").get(key).cloned()
    }

    fn read_private(&self, collection: &str) -> Option<PrivateEntry> {
        self.private
            .read()
            .expect("state lock poisoned")
            .get(collection)
            .cloned()
    }
}

/// Execute `request` against `state`, returning the response envelope and the
/// writes it would make. The state itself is not touched.
pub(crate) fn execute(
    state: &WorldState,
    request: &TransactionRequest,
) -> FabricResult<(Vec<u8>, WriteSet)> {
    let args = request.arguments();
    let mut writes = WriteSet::default();

    let envelope = match request.operation() {
        functions::GET => {
            let [key] = expect_args::<1>(request.operation(), args)?;
            match state.read_public(key) {
                Some(value) => json!({ "success": value }),
                None => json!({ "error": NOT_FOUND }),
            }
        }
        functions::PUT => {
            let [key, value] = expect_args::<2>(request.operation(), args)?;
            if key.is_empty() {
                return Err(FabricError::Endorsement("key must not be empty".into()));
            }
            writes.public.push((key.clone(), value.clone()));
            json!({ "success": "OK" })
        }
        functions::PUT_PRIVATE_MESSAGE => {
            let [collection] = expect_args::<1>(request.operation(), args)?;
            let message = transient_message(request)?;
            let hash = *blake3::hash(message.as_bytes()).as_bytes();
            writes
                .private
                .push((collection.clone(), PrivateEntry { message, hash }));
            json!({ "success": "OK" })
        }
        functions::GET_PRIVATE_MESSAGE => {
            let [collection] = expect_args::<1>(request.operation(), args)?;
            match state.read_private(collection) {
                Some(entry) => json!({ "success": entry.message }),
                None => json!({ "error": NOT_FOUND }),
            }
        }
        functions::VERIFY_PRIVATE_MESSAGE => {
            let [collection] = expect_args::<1>(request.operation(), args)?;
            let message = transient_message(request)?;
            let candidate = *blake3::hash(message.as_bytes()).as_bytes();
            match state.read_private(collection) {
                Some(entry) if entry.hash == candidate => json!({ "success": "OK" }),
                _ => json!({ "error": VERIFICATION_FAILED }),
            }
        }
        other => return Err(FabricError::UnknownFunction(other.to_string())),
    };

    Ok((envelope.to_string().into_bytes(), writes))
}

fn expect_args<'a, const N: usize>(
    function: &str,
    args: &'a [String],
) -> FabricResult<&'a [String; N]> {
    args.try_into().map_err(|_| {
        FabricError::Endorsement(format!(
            "{function}: expected {N} argument(s), got {}",
            args.len()
        ))
    })
}

fn transient_message(request: &TransactionRequest) -> FabricResult<String> {
    let raw = request
        .transient()
        .and_then(|t| t.get(TRANSIENT_MESSAGE_FIELD))
        .ok_or_else(|| {
            FabricError::Endorsement(format!(
                "{}: transient field '{TRANSIENT_MESSAGE_FIELD}' is required",
                request.operation()
            ))
        })?;
    String::from_utf8(raw.to_vec()).map_err(|_| {
        FabricError::Endorsement(format!(
            "{}: transient field '{TRANSIENT_MESSAGE_FIELD}' is not UTF-8",
            request.operation()
        ))
    })
}
