use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use lkv_fabric::{CertificateAuthority, EnrollmentRequest, FabricError};
use lkv_store::KeyStore;
use lkv_types::{Identity, SecretString, TopologyDescriptor, X509Credentials};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};

/// Enrollment id and secret presented to the certificate authority.
#[derive(Clone, Debug)]
pub struct EnrollmentCredentials {
    pub enrollment_id: String,
    pub secret: SecretString,
}

impl EnrollmentCredentials {
    pub fn new(enrollment_id: impl Into<String>, secret: impl Into<SecretString>) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            secret: secret.into(),
        }
    }
}

type NameLock = Arc<tokio::sync::Mutex<()>>;

/// Makes sure a named identity exists in the key store, enrolling it with
/// the certificate authority on first use.
///
/// Enrollment of one name is serialized through a per-name async lock, and
/// the key store write is create-if-absent, so concurrent callers for the
/// same unseen name cause exactly one enrollment and one stored entry.
/// Callers for different names never wait on each other.
pub struct IdentityManager {
    store: Arc<dyn KeyStore>,
    ca: Arc<dyn CertificateAuthority>,
    topology: Arc<TopologyDescriptor>,
    ca_name: String,
    ca_url: Option<String>,
    msp_id: String,
    admin_user: String,
    enroll_timeout: Duration,
    locks: Mutex<HashMap<String, NameLock>>,
    credentials: RwLock<HashMap<String, EnrollmentCredentials>>,
}

impl IdentityManager {
    /// The configured admin user's credentials are registered up front.
    pub fn new(
        config: &GatewayConfig,
        topology: Arc<TopologyDescriptor>,
        store: Arc<dyn KeyStore>,
        ca: Arc<dyn CertificateAuthority>,
    ) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(
            config.admin_user.clone(),
            EnrollmentCredentials::new(config.admin_user.clone(), config.admin_password.clone()),
        );
        Self {
            store,
            ca,
            topology,
            ca_name: config.ca_name.clone(),
            ca_url: config.ca_url.clone(),
            msp_id: config.msp_id.clone(),
            admin_user: config.admin_user.clone(),
            enroll_timeout: config.timeouts.enroll,
            locks: Mutex::new(HashMap::new()),
            credentials: RwLock::new(credentials),
        }
    }

    /// Register enrollment credentials for `name`, used by
    /// [`ensure_known`](Self::ensure_known).
    pub fn add_credentials(&self, name: impl Into<String>, credentials: EnrollmentCredentials) {
        self.credentials
            .write()
            .expect("credentials lock poisoned")
            .insert(name.into(), credentials);
    }

    /// Ensure the configured admin user, enrolling with the configured
    /// admin password on first use.
    pub async fn ensure_admin(&self) -> GatewayResult<Identity> {
        self.ensure_known(&self.admin_user).await
    }

    /// Ensure `name` using its registered credentials.
    pub async fn ensure_known(&self, name: &str) -> GatewayResult<Identity> {
        let credentials = self
            .credentials
            .read()
            .expect("credentials lock poisoned")
            .get(name)
            .cloned();
        match credentials {
            Some(creds) => self.ensure_identity(name, &creds).await,
            // Already enrolled identities need no credentials.
            None => self.lookup(name)?.ok_or_else(|| {
                GatewayError::Configuration(format!("no enrollment credentials for {name}"))
            }),
        }
    }

    /// Read `name` from the key store without enrolling.
    pub fn lookup(&self, name: &str) -> GatewayResult<Option<Identity>> {
        self.store.get(name).map_err(|source| GatewayError::StoreRead {
            name: name.to_string(),
            source,
        })
    }

    /// Return the stored identity for `name`, enrolling it first if absent.
    pub async fn ensure_identity(
        &self,
        name: &str,
        credentials: &EnrollmentCredentials,
    ) -> GatewayResult<Identity> {
        if let Some(identity) = self.lookup(name)? {
            debug!(identity = name, "identity found in key store");
            return Ok(identity);
        }

        let entry = self.lock_entry(name);
        let _guard = entry.lock.lock().await;
        self.enroll_and_store(name, credentials).await
    }

    async fn enroll_and_store(
        &self,
        name: &str,
        credentials: &EnrollmentCredentials,
    ) -> GatewayResult<Identity> {
        // Another caller may have finished while this one waited.
        if let Some(identity) = self.lookup(name)? {
            return Ok(identity);
        }

        let authority = self.topology.certificate_authority(&self.ca_name).ok_or_else(|| {
            GatewayError::Configuration(format!("unknown CA {}", self.ca_name))
        })?;
        let request = EnrollmentRequest {
            ca_url: self.ca_url.clone().unwrap_or_else(|| authority.url.clone()),
            ca_name: Some(authority.ca_name.clone().unwrap_or_else(|| self.ca_name.clone())),
            enrollment_id: credentials.enrollment_id.clone(),
            enrollment_secret: credentials.secret.clone(),
        };

        let enrolled = tokio::time::timeout(self.enroll_timeout, self.ca.enroll(&request))
            .await
            .map_err(|_| GatewayError::Timeout {
                step: "enroll",
                after: self.enroll_timeout,
            })?;
        let enrollment = match enrolled {
            Ok(enrollment) => enrollment,
            Err(FabricError::AlreadyEnrolled(id)) => {
                // Enrolled by another process; its write may already be visible.
                warn!(identity = name, enrollment_id = %id, "CA reports identity already enrolled");
                return self.lookup(name)?.ok_or_else(|| GatewayError::Enrollment {
                    name: name.to_string(),
                    source: FabricError::AlreadyEnrolled(id),
                });
            }
            Err(source) => {
                return Err(GatewayError::Enrollment {
                    name: name.to_string(),
                    source,
                })
            }
        };

        let identity = Identity::x509(
            name,
            X509Credentials {
                certificate: enrollment.certificate,
                private_key: enrollment.private_key,
            },
            self.msp_id.clone(),
        )
        .map_err(|e| GatewayError::Enrollment {
            name: name.to_string(),
            source: FabricError::Internal(e.to_string()),
        })?;

        let created = self
            .store
            .put_if_absent(&identity)
            .map_err(|source| GatewayError::StoreWrite {
                name: name.to_string(),
                source,
            })?;
        if created {
            info!(identity = name, msp = %self.msp_id, ca = %self.ca_name, "identity enrolled");
            return Ok(identity);
        }

        // Lost a create race with another process; keep the stored entry.
        debug!(identity = name, "identity stored concurrently, discarding enrollment");
        self.lookup(name)?.ok_or_else(|| GatewayError::StoreRead {
            name: name.to_string(),
            source: lkv_store::StoreError::Corrupt {
                name: name.to_string(),
                reason: "entry vanished after create conflict".into(),
            },
        })
    }

    fn lock_entry<'a>(&'a self, name: &'a str) -> LockEntry<'a> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        LockEntry {
            manager: self,
            name,
            lock: Arc::clone(locks.entry(name.to_string()).or_default()),
        }
    }

    /// Drop the table entry once no other caller holds or awaits it.
    fn prune_lock(&self, name: &str, lock: &NameLock) {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        let unused = locks
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(lock) == 2);
        if unused {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.lock().expect("lock table poisoned").len()
    }
}

/// A caller's share of a name lock. Dropping it prunes the table entry,
/// also when the enrolling future is cancelled.
struct LockEntry<'a> {
    manager: &'a IdentityManager,
    name: &'a str,
    lock: NameLock,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        self.manager.prune_lock(self.name, &self.lock);
    }
}

impl std::fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityManager")
            .field("ca_name", &self.ca_name)
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestEnv;
    use lkv_fabric::SimulatedCa;
    use lkv_store::{FileSystemKeyStore, InMemoryKeyStore, StoreError, StoreResult};

    fn admin() -> EnrollmentCredentials {
        EnrollmentCredentials::new("admin", "adminpw")
    }

    fn stored_admin() -> Identity {
        Identity::x509(
            "admin",
            X509Credentials {
                certificate: "cert".into(),
                private_key: "key".into(),
            },
            "Org1MSP",
        )
        .unwrap()
    }

    /// How [`ScriptedStore`] answers `put_if_absent`.
    enum OnPut {
        Fail,
        /// Another writer lands `Identity` first.
        Conflict(Identity),
    }

    /// A key store whose writes never store the caller's identity.
    struct ScriptedStore {
        inner: InMemoryKeyStore,
        on_put: OnPut,
    }

    impl ScriptedStore {
        fn new(on_put: OnPut) -> Self {
            Self {
                inner: InMemoryKeyStore::new(),
                on_put,
            }
        }
    }

    impl KeyStore for ScriptedStore {
        fn get(&self, name: &str) -> StoreResult<Option<Identity>> {
            self.inner.get(name)
        }

        fn put_if_absent(&self, _identity: &Identity) -> StoreResult<bool> {
            match &self.on_put {
                OnPut::Fail => Err(StoreError::ReadOnly),
                OnPut::Conflict(existing) => {
                    self.inner.put_if_absent(existing)?;
                    Ok(false)
                }
            }
        }

        fn remove(&self, name: &str) -> StoreResult<bool> {
            self.inner.remove(name)
        }

        fn list(&self) -> StoreResult<Vec<String>> {
            self.inner.list()
        }
    }

    #[tokio::test]
    async fn second_call_reuses_stored_identity() {
        let env = TestEnv::new();
        let ids = env.identities();

        let first = ids.ensure_identity("admin", &admin()).await.unwrap();
        let second = ids.ensure_identity("admin", &admin()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(env.ca.enrollment_count(), 1);
        assert_eq!(env.store.write_count(), 1);
        assert_eq!(first.msp_id(), "Org1MSP");
        assert_eq!(ids.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_enroll_once() {
        let ca = SimulatedCa::new("ca.org1.example.com")
            .with_user("admin", "adminpw")
            .with_duplicate_rejection();
        ca.set_latency(Some(Duration::from_millis(20)));
        let env = TestEnv::with_ca(ca);
        let ids = env.identities();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ids = Arc::clone(&ids);
            handles.push(tokio::spawn(async move {
                ids.ensure_identity("admin", &admin()).await
            }));
        }
        let mut certs = Vec::new();
        for handle in handles {
            certs.push(handle.await.unwrap().unwrap().certificate().to_string());
        }

        certs.dedup();
        assert_eq!(certs.len(), 1);
        assert_eq!(env.ca.enrollment_count(), 1);
        assert_eq!(env.store.len(), 1);
        assert_eq!(ids.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn different_names_enroll_independently() {
        let env = TestEnv::new();
        env.ca.register("user1", "pw1");
        let ids = env.identities();

        ids.ensure_identity("admin", &admin()).await.unwrap();
        ids.ensure_identity("user1", &EnrollmentCredentials::new("user1", "pw1"))
            .await
            .unwrap();
        assert_eq!(env.store.len(), 2);
    }

    #[tokio::test]
    async fn bad_secret_is_enrollment_error_and_stores_nothing() {
        let env = TestEnv::new();
        let err = env
            .identities()
            .ensure_identity("admin", &EnrollmentCredentials::new("admin", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Enrollment { .. }));
        assert!(!err.to_string().contains("wrong"));
        assert!(env.store.is_empty());
    }

    #[tokio::test]
    async fn unreachable_ca_is_enrollment_error() {
        let env = TestEnv::new();
        env.ca.set_offline(true);
        let err = env.identities().ensure_identity("admin", &admin()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Enrollment {
                source: FabricError::Unreachable(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_ca_is_configuration_error() {
        let mut env = TestEnv::new();
        env.config.ca_name = "ca.org9.example.com".into();
        let err = env.identities().ensure_identity("admin", &admin()).await.unwrap_err();
        assert!(err.to_string().contains("unknown CA"));
        assert_eq!(env.ca.enrollment_count(), 0);
    }

    #[tokio::test]
    async fn enrollment_timeout_is_reported() {
        let mut env = TestEnv::new();
        env.config.timeouts.enroll = Duration::from_millis(20);
        env.ca.set_latency(Some(Duration::from_secs(5)));
        let err = env.identities().ensure_identity("admin", &admin()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { step: "enroll", .. }));
        assert!(env.store.is_empty());
    }

    #[tokio::test]
    async fn existing_identity_needs_no_ca() {
        let env = TestEnv::new();
        env.identities().ensure_identity("admin", &admin()).await.unwrap();
        env.ca.set_offline(true);
        assert!(env.identities().ensure_known("admin").await.is_ok());
    }

    #[tokio::test]
    async fn ensure_admin_uses_configured_user() {
        let mut env = TestEnv::new();
        env.config.admin_user = "registrar".into();
        env.config.admin_password = "registrarpw".into();
        env.ca.register("registrar", "registrarpw");

        let admin = env.identities().ensure_admin().await.unwrap();
        assert_eq!(admin.name(), "registrar");
        assert_eq!(env.ca.enrollment_count_for("registrar"), 1);
    }

    #[tokio::test]
    async fn unknown_name_without_credentials_is_rejected() {
        let env = TestEnv::new();
        let err = env.identities().ensure_known("nobody").await.unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[tokio::test]
    async fn invalid_name_is_store_read_error() {
        let env = TestEnv::new();
        let err = env
            .identities()
            .ensure_identity("../admin", &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StoreRead { .. }));
    }

    #[tokio::test]
    async fn identities_persist_across_managers() {
        let dir = tempfile::tempdir().unwrap();
        let env = TestEnv::new();
        let store: Arc<dyn KeyStore> = Arc::new(FileSystemKeyStore::open(dir.path()).unwrap());

        let first = IdentityManager::new(&env.config, env.topology.clone(), store.clone(), env.ca.clone())
            .ensure_known("admin")
            .await
            .unwrap();
        let reopened: Arc<dyn KeyStore> = Arc::new(FileSystemKeyStore::open(dir.path()).unwrap());
        let second = IdentityManager::new(&env.config, env.topology.clone(), reopened, env.ca.clone())
            .ensure_known("admin")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(env.ca.enrollment_count(), 1);
    }

    #[tokio::test]
    async fn stored_identity_skips_enrollment() {
        let env = TestEnv::new();
        let store = Arc::new(InMemoryKeyStore::new());
        let existing = stored_admin();
        store.put_if_absent(&existing).unwrap();

        let ids = IdentityManager::new(&env.config, env.topology.clone(), store, env.ca.clone());
        assert_eq!(ids.ensure_known("admin").await.unwrap(), existing);
        assert_eq!(env.ca.enrollment_count(), 0);
    }

    #[tokio::test]
    async fn failed_store_write_discards_enrollment() {
        let env = TestEnv::new();
        let store = Arc::new(ScriptedStore::new(OnPut::Fail));
        let ids = IdentityManager::new(&env.config, env.topology.clone(), store.clone(), env.ca.clone());

        let err = ids.ensure_known("admin").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::StoreWrite {
                source: StoreError::ReadOnly,
                ..
            }
        ));
        assert_eq!(env.ca.enrollment_count(), 1);
        assert!(store.list().unwrap().is_empty());
        assert!(ids.lookup("admin").unwrap().is_none());
        assert_eq!(ids.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_write_keeps_stored_identity() {
        let env = TestEnv::new();
        let existing = stored_admin();
        let store = Arc::new(ScriptedStore::new(OnPut::Conflict(existing.clone())));
        let ids = IdentityManager::new(&env.config, env.topology.clone(), store.clone(), env.ca.clone());

        let identity = ids.ensure_known("admin").await.unwrap();
        assert_eq!(env.ca.enrollment_count(), 1);
        assert_eq!(identity, existing);
        assert_eq!(identity.certificate(), "cert");
        assert_eq!(store.list().unwrap(), vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_enrollment_releases_name_lock() {
        let env = TestEnv::new();
        env.ca.set_latency(Some(Duration::from_secs(5)));
        let ids = env.identities();

        let waited =
            tokio::time::timeout(Duration::from_millis(20), ids.ensure_identity("admin", &admin()))
                .await;
        assert!(waited.is_err());
        assert_eq!(ids.lock_table_len(), 0);
        assert!(env.store.is_empty());

        env.ca.set_latency(None);
        ids.ensure_identity("admin", &admin()).await.unwrap();
        assert_eq!(ids.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_lock_to_holder() {
        let env = TestEnv::new();
        env.ca.set_latency(Some(Duration::from_millis(100)));
        let ids = env.identities();

        let holder = {
            let ids = Arc::clone(&ids);
            tokio::spawn(async move { ids.ensure_identity("admin", &admin()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waited =
            tokio::time::timeout(Duration::from_millis(10), ids.ensure_identity("admin", &admin()))
                .await;
        assert!(waited.is_err());
        assert_eq!(ids.lock_table_len(), 1);

        holder.await.unwrap().unwrap();
        assert_eq!(ids.lock_table_len(), 0);
        assert_eq!(env.ca.enrollment_count(), 1);
    }
}
