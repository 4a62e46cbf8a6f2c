//! Envelope encryption of uploaded files.
//!
//! Ties the file cipher and key wrapper to key-record state and caller
//! ownership:
//!
//! ```text
//! upload:   generate DataKey -> encrypt file -> hash key -> wrap key -> store record
//! download: find active record (id + owner) -> unwrap -> verify hash -> decrypt
//! ```
//!
//! A record moves `Active --revoke--> Inactive` and never back. Decryption
//! needs an active record owned by the caller; missing, foreign and revoked
//! records are reported identically as `KeyNotFoundOrRevoked`.
//!
//! Nothing here blocks on I/O except through the `KeyStore`, and nothing is
//! retried. Audit sinks run on their own thread (see [`crate::audit`]).

use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditRecord, AuditSink, KeyAction};
use crate::config::EnvelopeConfig;
use crate::crypto::{EncryptedPayload, FileCipher};
use crate::error::{EnvelopeError, Result};
use crate::keys::MasterSecret;
use crate::store::{FileKeyRecord, KeyId, KeyStore, NewFileKey};
use crate::wrap::KeyWrapper;

/// Plaintext of a downloaded file together with its bookkeeping metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub data: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Encrypts files for an owner and decrypts them back for that owner only.
pub struct EnvelopeService<K: KeyStore> {
    store: Arc<K>,
    wrapper: KeyWrapper,
    audit: AuditLog,
}

impl<K: KeyStore> EnvelopeService<K> {
    /// Build a service over `store`, wrapping keys under `master`.
    pub fn new(store: Arc<K>, master: &MasterSecret) -> Self {
        Self {
            store,
            wrapper: KeyWrapper::new(master),
            audit: AuditLog::new(),
        }
    }

    /// Retain at most `capacity` audit records in memory.
    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit = AuditLog::with_capacity(capacity);
        self
    }

    pub fn from_config(store: Arc<K>, config: &EnvelopeConfig) -> Self {
        Self::new(store, &config.master_secret)
    }

    pub fn store(&self) -> &Arc<K> {
        &self.store
    }

    /// Encrypt `plaintext` under a fresh data key and persist the wrapped key.
    ///
    /// The caller stores the returned payload (ciphertext, IV and tag)
    /// alongside `record.id()`; this service never touches blob storage.
    pub fn encrypt_for_upload(
        &self,
        plaintext: &[u8],
        owner_id: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<(EncryptedPayload, FileKeyRecord)> {
        let key = FileCipher::generate_key()?;
        let payload = FileCipher::encrypt(plaintext, &key)?;
        let key_hash = FileCipher::hash_key(&key);
        let wrapped_key = self.wrapper.wrap(&key)?;
        drop(key);

        let record = self.store.create(NewFileKey {
            owner_id: owner_id.to_string(),
            key_hash,
            wrapped_key,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
        })?;

        info!(
            record_id = %record.id(),
            owner_id,
            bytes = plaintext.len(),
            "file encrypted"
        );
        self.record(record.id(), owner_id, KeyAction::Created);
        Ok((payload, record))
    }

    /// Decrypt a payload with the key of record `record_id`, on behalf of
    /// `owner_id`.
    pub fn decrypt_for_download(
        &self,
        payload: &EncryptedPayload,
        record_id: &KeyId,
        owner_id: &str,
    ) -> Result<Vec<u8>> {
        self.open_for_download(payload, record_id, owner_id)
            .map(|file| file.data)
    }

    /// Like [`decrypt_for_download`](Self::decrypt_for_download), also
    /// returning the file name and MIME type recorded at upload.
    pub fn open_for_download(
        &self,
        payload: &EncryptedPayload,
        record_id: &KeyId,
        owner_id: &str,
    ) -> Result<DecryptedFile> {
        let Some(record) = self.store.find_active_by_id(record_id, owner_id)? else {
            debug!(record_id = %record_id, owner_id, "key lookup denied");
            self.record(*record_id, owner_id, KeyAction::Denied);
            return Err(EnvelopeError::KeyNotFoundOrRevoked);
        };

        let key = match self.wrapper.unwrap(record.wrapped_key()) {
            Ok(key) => key,
            Err(err) => {
                warn!(record_id = %record_id, error = %err, "wrapped key could not be unwrapped");
                self.record(*record_id, owner_id, KeyAction::UnwrapFailed);
                return Err(err);
            }
        };
        if !record.key_hash().matches(&key) {
            warn!(record_id = %record_id, "unwrapped key does not match stored hash");
            self.record(*record_id, owner_id, KeyAction::IntegrityFailure);
            return Err(EnvelopeError::KeyIntegrityFailure);
        }

        let data = match FileCipher::decrypt(payload, &key) {
            Ok(data) => data,
            Err(err) => {
                warn!(record_id = %record_id, "file ciphertext failed authentication");
                self.record(*record_id, owner_id, KeyAction::TamperDetected);
                return Err(err);
            }
        };

        info!(record_id = %record_id, owner_id, bytes = data.len(), "file decrypted");
        self.record(*record_id, owner_id, KeyAction::Decrypted);
        Ok(DecryptedFile {
            data,
            file_name: record.file_name().to_string(),
            mime_type: record.mime_type().to_string(),
        })
    }

    /// Permanently disable a record's key. Idempotent, and silent about
    /// whether the record existed or belonged to the caller.
    pub fn revoke_key(&self, record_id: &KeyId, owner_id: &str) -> Result<()> {
        self.store.revoke(record_id, owner_id)?;
        info!(record_id = %record_id, owner_id, "key revocation requested");
        self.record(*record_id, owner_id, KeyAction::Revoked);
        Ok(())
    }

    /// The owner's active key records, newest first.
    pub fn list_active_keys(&self, owner_id: &str) -> Result<Vec<FileKeyRecord>> {
        self.store.list_active_by_owner(owner_id)
    }

    /// Forward every future audit record to `sink`.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) -> io::Result<()> {
        self.audit.add_forward_sink(sink)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    fn record(&self, record_id: KeyId, owner_id: &str, action: KeyAction) {
        self.audit.append(AuditRecord::now(record_id, owner_id, action));
    }
}
