use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use lkv_types::{Identity, IdentityKind, X509Credentials};

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_name, KeyStore};

const RECORD_EXTENSION: &str = "id";
const RECORD_VERSION: u32 = 1;

/// On-disk wallet record. The identity name is the file stem.
///
/// ```text
/// {"credentials":{"certificate":"..","privateKey":".."},"mspId":"Org1MSP","type":"X.509","version":1}
/// ```
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletRecord {
    credentials: X509Credentials,
    msp_id: String,
    #[serde(rename = "type")]
    kind: IdentityKind,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

/// Directory-backed key store: one `<name>.id` JSON file per identity.
///
/// Writes go to a temporary file which is then hard-linked to its final
/// name. Linking fails if the target exists, which gives an atomic
/// create-if-absent across threads and processes sharing the directory.
#[derive(Debug)]
pub struct FileSystemKeyStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileSystemKeyStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(path = %root.display(), "opened key store");
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".{name}.{}.{n}.tmp", std::process::id()))
    }

    fn decode(name: &str, data: &[u8]) -> StoreResult<Identity> {
        let record: WalletRecord = serde_json::from_slice(data).map_err(|e| StoreError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Identity::x509(name, record.credentials, record.msp_id).map_err(|e| StoreError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(identity: &Identity) -> StoreResult<Vec<u8>> {
        let record = WalletRecord {
            credentials: identity.credentials().clone(),
            msp_id: identity.msp_id().to_string(),
            kind: identity.kind(),
            version: RECORD_VERSION,
        };
        serde_json::to_vec(&record).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl KeyStore for FileSystemKeyStore {
    fn get(&self, name: &str) -> StoreResult<Option<Identity>> {
        validate_name(name)?;
        match fs::read(self.record_path(name)) {
            Ok(data) => Self::decode(name, &data).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_if_absent(&self, identity: &Identity) -> StoreResult<bool> {
        let name = identity.name();
        validate_name(name)?;
        let data = Self::encode(identity)?;

        let tmp = self.tmp_path(name);
        let write_tmp = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        let linked = fs::hard_link(&tmp, self.record_path(name));
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => {
                debug!(name, "stored identity");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkv_types::SecretString;

    fn identity(name: &str, cert: &str) -> Identity {
        Identity::x509(
            name,
            X509Credentials {
                certificate: cert.into(),
                private_key: SecretString::new("pem-private-key"),
            },
            "Org1MSP",
        )
        .unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, FileSystemKeyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemKeyStore::open(dir.path().join("wallets")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directory() {
        let (dir, store) = temp_store();
        assert!(dir.path().join("wallets").is_dir());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn put_then_get_survives_reopen() {
        let (dir, store) = temp_store();
        assert!(store.put_if_absent(&identity("admin", "cert-a")).unwrap());

        let reopened = FileSystemKeyStore::open(dir.path().join("wallets")).unwrap();
        let id = reopened.get("admin").unwrap().expect("should exist");
        assert_eq!(id.certificate(), "cert-a");
        assert_eq!(id.msp_id(), "Org1MSP");
        assert_eq!(id.credentials().private_key.expose(), "pem-private-key");
    }

    #[test]
    fn record_uses_wallet_layout() {
        let (_dir, store) = temp_store();
        store.put_if_absent(&identity("admin", "cert-a")).unwrap();
        let raw = fs::read(store.root().join("admin.id")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["type"], "X.509");
        assert_eq!(json["mspId"], "Org1MSP");
        assert_eq!(json["credentials"]["certificate"], "cert-a");
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn existing_identity_is_never_overwritten() {
        let (_dir, store) = temp_store();
        assert!(store.put_if_absent(&identity("admin", "cert-a")).unwrap());
        assert!(!store.put_if_absent(&identity("admin", "cert-b")).unwrap());
        assert_eq!(store.get("admin").unwrap().unwrap().certificate(), "cert-a");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = temp_store();
        store.put_if_absent(&identity("admin", "c")).unwrap();
        store.put_if_absent(&identity("admin", "c")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_record_is_reported() {
        let (_dir, store) = temp_store();
        fs::write(store.root().join("broken.id"), b"{oops").unwrap();
        assert!(matches!(store.get("broken"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn list_ignores_foreign_files() {
        let (_dir, store) = temp_store();
        store.put_if_absent(&identity("bob", "c")).unwrap();
        store.put_if_absent(&identity("alice", "c")).unwrap();
        fs::write(store.root().join("notes.txt"), b"x").unwrap();
        assert_eq!(store.list().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn remove_deletes_record() {
        let (_dir, store) = temp_store();
        store.put_if_absent(&identity("admin", "c")).unwrap();
        assert!(store.remove("admin").unwrap());
        assert!(!store.remove("admin").unwrap());
        assert!(store.get("admin").unwrap().is_none());
    }

    #[test]
    fn concurrent_puts_create_one_record() {
        use std::sync::Arc;
        use std::thread;

        let (_dir, store) = temp_store();
        let store = Arc::new(store);
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
        let created = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.list().unwrap(), vec!["shared"]);
    }
}
