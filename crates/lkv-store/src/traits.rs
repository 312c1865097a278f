use lkv_types::Identity;

use crate::error::{StoreError, StoreResult};

/// Keyed storage of signing identities.
///
/// All implementations must satisfy these invariants:
/// - An identity is never overwritten. [`put_if_absent`](Self::put_if_absent)
///   is the only write, and it leaves an existing entry untouched.
/// - A concurrent reader sees either no entry or the complete entry.
/// - All I/O errors are propagated, never silently ignored.
pub trait KeyStore: Send + Sync {
    /// Read an identity by name.
    ///
    /// Returns `Ok(None)` if the name is unknown.
    /// Returns `Err` on I/O failure or a corrupt record.
    fn get(&self, name: &str) -> StoreResult<Option<Identity>>;

    /// Store an identity unless one with the same name exists.
    ///
    /// Returns `true` if this call created the entry, `false` if an entry
    /// was already present (the existing entry is kept).
    fn put_if_absent(&self, identity: &Identity) -> StoreResult<bool>;

    /// Check whether an identity exists.
    fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.get(name)?.is_some())
    }

    /// Delete an identity. Returns `true` if it existed.
    ///
    /// Administrative operation only; the gateway never calls it.
    fn remove(&self, name: &str) -> StoreResult<bool>;

    /// Sorted list of stored identity names.
    fn list(&self) -> StoreResult<Vec<String>>;
}

/// Reject names that cannot safely be used as a store key.
pub fn validate_name(name: &str) -> StoreResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
