use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use lkv_types::Identity;

use crate::error::StoreResult;
use crate::traits::{validate_name, KeyStore};

/// In-memory, HashMap-based key store.
///
/// Intended for tests and embedding. Identities are held behind a `RwLock`
/// and cloned on read. The store counts successful writes so callers can
/// check the one-write-per-name invariant.
pub struct InMemoryKeyStore {
    identities: RwLock<HashMap<String, Identity>>,
    writes: AtomicUsize,
}

impl InMemoryKeyStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of identities currently stored.
    pub fn len(&self) -> usize {
        self.identities.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.identities.read().expect("lock poisoned").is_empty()
    }

    /// Number of `put_if_absent` calls that created an entry.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get(&self, name: &str) -> StoreResult<Option<Identity>> {
        validate_name(name)?;
        let map = self.identities.read().expect("lock poisoned");
        Ok(map.get(name).cloned())
    }

    fn put_if_absent(&self, identity: &Identity) -> StoreResult<bool> {
        validate_name(identity.name())?;
        let mut map = self.identities.write().expect("lock poisoned");
        if map.contains_key(identity.name()) {
            return Ok(false);
        }
        map.insert(identity.name().to_string(), identity.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn remove(&self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        let mut map = self.identities.write().expect("lock poisoned");
        Ok(map.remove(name).is_some())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let map = self.identities.read().expect("lock poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for InMemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyStore")
            .field("identity_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkv_types::{SecretString, X509Credentials};

    fn identity(name: &str, cert: &str) -> Identity {
        Identity::x509(
            name,
            X509Credentials {
                certificate: cert.into(),
                private_key: SecretString::new("key-material"),
            },
            "Org1MSP",
        )
        .unwrap()
    }

    #[test]
    fn put_and_get() {
        let store = InMemoryKeyStore::new();
        assert!(store.put_if_absent(&identity("admin", "cert-a")).unwrap());
        let read_back = store.get("admin").unwrap().expect("should exist");
        assert_eq!(read_back.certificate(), "cert-a");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn second_put_keeps_first_identity() {
        let store = InMemoryKeyStore::new();
        assert!(store.put_if_absent(&identity("admin", "cert-a")).unwrap());
        assert!(!store.put_if_absent(&identity("admin", "cert-b")).unwrap());
        assert_eq!(store.get("admin").unwrap().unwrap().certificate(), "cert-a");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn missing_identity_is_none() {
        let store = InMemoryKeyStore::new();
        assert!(store.get("nobody").unwrap().is_none());
        assert!(!store.exists("nobody").unwrap());
    }

    #[test]
    fn remove_and_list() {
        let store = InMemoryKeyStore::new();
        store.put_if_absent(&identity("bob", "c")).unwrap();
        store.put_if_absent(&identity("alice", "c")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["alice", "bob"]);
        assert!(store.remove("bob").unwrap());
        assert!(!store.remove("bob").unwrap());
        assert_eq!(store.list().unwrap(), vec!["alice"]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let store = InMemoryKeyStore::new();
        assert!(store.get("../etc").is_err());
    }

    #[test]
    fn concurrent_puts_write_once() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryKeyStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .put_if_absent(&identity("shared", &format!("cert-{i}")))
                        .unwrap()
                })
            })
            .collect();
        let created: usize = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic") as usize)
            .sum();
        assert_eq!(created, 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryKeyStore::default();
        let debug = format!("{store:?}");
        assert!(debug.contains("identity_count"));
    }
}
