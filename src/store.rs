//! Key record model and the key-store abstraction.
//!
//! The store persists wrapped-key records and owns the only shared mutable
//! state in the system: each record's `is_active` flag. It performs no
//! cryptography itself. Implementations must give each call a consistent
//! view of a single record (read-committed or better); the in-memory store
//! here does that with a single `RwLock`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EnvelopeError, Result};
use crate::keys::KeyHash;
use crate::wrap::WrappedKey;

/// Identifier of the principal that owns a key record.
pub type OwnerId = String;

/// Opaque identifier of a key record, assigned by the store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Uuid);

impl KeyId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for KeyId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for KeyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A key record before the store has assigned its id and creation time.
#[derive(Debug, Clone)]
pub struct NewFileKey {
    pub owner_id: OwnerId,
    pub key_hash: KeyHash,
    pub wrapped_key: WrappedKey,
    pub file_name: String,
    pub mime_type: String,
}

/// The unit of key lifecycle: one per encrypted file, owned by exactly one
/// principal.
///
/// Immutable except for `is_active`, which only ever moves from `true` to
/// `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileKeyRecord {
    id: KeyId,
    owner_id: OwnerId,
    key_hash: KeyHash,
    wrapped_key: WrappedKey,
    file_name: String,
    mime_type: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl FileKeyRecord {
    /// Materialise a freshly created, active record.
    pub fn create(id: KeyId, new: NewFileKey, created_at: DateTime<Utc>) -> Self {
        Self::from_parts(id, new, true, created_at)
    }

    /// Rebuild a record loaded from persistent storage.
    pub fn from_parts(
        id: KeyId,
        new: NewFileKey,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        let NewFileKey {
            owner_id,
            key_hash,
            wrapped_key,
            file_name,
            mime_type,
        } = new;
        Self {
            id,
            owner_id,
            key_hash,
            wrapped_key,
            file_name,
            mime_type,
            is_active,
            created_at,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn key_hash(&self) -> &KeyHash {
        &self.key_hash
    }

    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when `owner_id` may use this record for decryption.
    pub fn usable_by(&self, owner_id: &str) -> bool {
        self.is_active && self.owner_id == owner_id
    }

    /// Terminal transition. Calling it on an inactive record is a no-op.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

/// Persistence for wrapped-key records.
///
/// Implementations propagate their own failures as
/// [`EnvelopeError::Storage`]; the core never retries.
pub trait KeyStore: Send + Sync {
    /// Persist a new active record, assigning its id and creation time.
    fn create(&self, new: NewFileKey) -> Result<FileKeyRecord>;

    /// The record, if it exists, is owned by `owner_id`, and is active.
    /// All three failure cases look the same: `None`.
    fn find_active_by_id(&self, id: &KeyId, owner_id: &str) -> Result<Option<FileKeyRecord>>;

    /// Mark the record inactive. Idempotent; silently does nothing when the
    /// record is missing, owned by someone else, or already inactive.
    fn revoke(&self, id: &KeyId, owner_id: &str) -> Result<()>;

    /// Active records owned by `owner_id`, newest first.
    fn list_active_by_owner(&self, owner_id: &str) -> Result<Vec<FileKeyRecord>>;
}

/// In-memory implementation of `KeyStore`.
///
/// Suitable for development, testing, and single-instance deployments.
/// Records are lost when the process terminates.
#[derive(Default)]
pub struct InMemoryKeyStore {
    records: RwLock<HashMap<KeyId, FileKeyRecord>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records, active or not.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Replace a record's wrapped key in place, bypassing the normal
    /// lifecycle. Simulates storage corruption.
    #[cfg(test)]
    pub(crate) fn overwrite_wrapped_key(&self, id: &KeyId, wrapped_key: WrappedKey) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| EnvelopeError::storage(format!("no record {id}")))?;
        record.wrapped_key = wrapped_key;
        Ok(())
    }
}

impl KeyStore for InMemoryKeyStore {
    fn create(&self, new: NewFileKey) -> Result<FileKeyRecord> {
        let record = FileKeyRecord::create(KeyId::new_v4(), new, Utc::now());
        self.records.write().insert(record.id, record.clone());
        Ok(record)
    }

    fn find_active_by_id(&self, id: &KeyId, owner_id: &str) -> Result<Option<FileKeyRecord>> {
        let records = self.records.read();
        Ok(records
            .get(id)
            .filter(|record| record.usable_by(owner_id))
            .cloned())
    }

    fn revoke(&self, id: &KeyId, owner_id: &str) -> Result<()> {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(id) {
            if record.owner_id == owner_id {
                record.deactivate();
            }
        }
        Ok(())
    }

    fn list_active_by_owner(&self, owner_id: &str) -> Result<Vec<FileKeyRecord>> {
        let records = self.records.read();
        let mut owned: Vec<_> = records
            .values()
            .filter(|record| record.usable_by(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{DataKey, MasterSecret};
    use crate::wrap::KeyWrapper;

    fn new_key(owner: &str, file_name: &str) -> NewFileKey {
        let wrapper = KeyWrapper::new(&MasterSecret::new("store-tests").unwrap());
        let key = DataKey::generate().unwrap();
        NewFileKey {
            owner_id: owner.to_string(),
            key_hash: key.hash(),
            wrapped_key: wrapper.wrap(&key).unwrap(),
            file_name: file_name.to_string(),
            mime_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn test_create_assigns_id_and_activates() {
        let store = InMemoryKeyStore::new();
        let a = store.create(new_key("alice", "a.pdf")).unwrap();
        let b = store.create(new_key("alice", "b.pdf")).unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.is_active());
        assert_eq!(a.owner_id(), "alice");
        assert_eq!(a.file_name(), "a.pdf");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_find_active_filters_owner_and_state() {
        let store = InMemoryKeyStore::new();
        let record = store.create(new_key("alice", "scan.pdf")).unwrap();

        assert_eq!(
            store.find_active_by_id(&record.id(), "alice").unwrap(),
            Some(record.clone())
        );
        assert!(store.find_active_by_id(&record.id(), "mallory").unwrap().is_none());
        assert!(store.find_active_by_id(&KeyId::new_v4(), "alice").unwrap().is_none());

        store.revoke(&record.id(), "alice").unwrap();
        assert!(store.find_active_by_id(&record.id(), "alice").unwrap().is_none());
    }

    #[test]
    fn test_revoke_is_idempotent_and_owner_scoped() {
        let store = InMemoryKeyStore::new();
        let record = store.create(new_key("alice", "scan.pdf")).unwrap();

        // Someone else's revoke is silently ignored.
        store.revoke(&record.id(), "mallory").unwrap();
        assert!(store.find_active_by_id(&record.id(), "alice").unwrap().is_some());

        store.revoke(&record.id(), "alice").unwrap();
        store.revoke(&record.id(), "alice").unwrap();
        store.revoke(&KeyId::new_v4(), "alice").unwrap();
        assert!(store.find_active_by_id(&record.id(), "alice").unwrap().is_none());
    }

    #[test]
    fn test_list_active_newest_first() {
        let store = InMemoryKeyStore::new();
        let first = store.create(new_key("alice", "first.pdf")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.create(new_key("alice", "second.pdf")).unwrap();
        store.create(new_key("bob", "bob.pdf")).unwrap();

        let listed = store.list_active_by_owner("alice").unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![second.id(), first.id()]);

        store.revoke(&second.id(), "alice").unwrap();
        let listed = store.list_active_by_owner("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), first.id());
    }

    #[test]
    fn test_record_serde_round_trip() {
        let store = InMemoryKeyStore::new();
        let record = store.create(new_key("alice", "scan.pdf")).unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["owner_id"], "alice");
        assert_eq!(json["is_active"], true);
        assert_eq!(json["key_hash"], record.key_hash().as_str());
        assert_eq!(json["wrapped_key"], record.wrapped_key().encode());

        let back: FileKeyRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
