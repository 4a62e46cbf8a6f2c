//! Encrypted health-report archive.
//!
//! Combines the envelope service with blob storage: ciphertext goes to the
//! blob store, the wrapped key to the key store, and the IV, tag and
//! locators come back to the caller as a `StoredReport` to be kept with the
//! report's row.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blob::{BlobLocator, BlobStore};
use crate::config::EnvelopeConfig;
use crate::crypto::{EncryptedPayload, FileCipher, IV_LEN, TAG_LEN};
use crate::error::{EnvelopeError, Result};
use crate::service::{DecryptedFile, EnvelopeService};
use crate::store::{KeyId, KeyStore, OwnerId};

/// Metadata of an uploaded report: everything needed to fetch and decrypt it
/// again, apart from the master secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub record_id: KeyId,
    pub owner_id: OwnerId,
    pub locator: BlobLocator,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
    /// Hex SHA-256 of the plaintext.
    pub content_hash: String,
    /// Plaintext size in bytes.
    pub size: usize,
    pub file_name: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Upload, download and delete of encrypted reports.
pub struct ReportArchive<K: KeyStore, B: BlobStore> {
    envelope: EnvelopeService<K>,
    blobs: Arc<B>,
    object_prefix: String,
}

impl<K: KeyStore, B: BlobStore> ReportArchive<K, B> {
    pub fn new(envelope: EnvelopeService<K>, blobs: Arc<B>, object_prefix: impl Into<String>) -> Self {
        Self {
            envelope,
            blobs,
            object_prefix: object_prefix.into(),
        }
    }

    pub fn from_config(keys: Arc<K>, blobs: Arc<B>, config: &EnvelopeConfig) -> Self {
        Self::new(
            EnvelopeService::from_config(keys, config),
            blobs,
            config.object_prefix.clone(),
        )
    }

    pub fn envelope(&self) -> &EnvelopeService<K> {
        &self.envelope
    }

    /// Encrypt `bytes` for `owner_id` and store the ciphertext.
    ///
    /// `owner_id` is percent-encoded into the object name; ids that would
    /// still name a relative path (empty, `.`, `..`) are rejected with
    /// `InvalidOwnerId` before any key is created.
    ///
    /// If the blob write fails the key record already exists; it is left
    /// active and unreferenced, and the storage error is returned as-is.
    pub fn upload(
        &self,
        owner_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredReport> {
        let owner_segment = object_segment(owner_id)?;
        let (payload, record) =
            self.envelope
                .encrypt_for_upload(bytes, owner_id, file_name, mime_type)?;

        let uploaded_at = Utc::now();
        let object_name = format!(
            "{}/{}/{}-{}",
            self.object_prefix,
            owner_segment,
            uploaded_at.timestamp_millis(),
            record.id()
        );
        let locator = self.blobs.put(&object_name, &payload.ciphertext)?;

        info!(record_id = %record.id(), owner_id, locator = %locator, "report stored");
        Ok(StoredReport {
            record_id: record.id(),
            owner_id: owner_id.to_string(),
            locator,
            iv: payload.iv,
            auth_tag: payload.auth_tag,
            content_hash: FileCipher::hash_file(bytes),
            size: bytes.len(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            uploaded_at,
        })
    }

    /// Fetch and decrypt a report on behalf of `owner_id`.
    ///
    /// Ownership is checked against the key record, not against
    /// `report.owner_id`, so a forged `StoredReport` gains nothing.
    pub fn download(&self, report: &StoredReport, owner_id: &str) -> Result<DecryptedFile> {
        let ciphertext = self.blobs.get(&report.locator)?;
        let payload = EncryptedPayload {
            ciphertext,
            iv: report.iv,
            auth_tag: report.auth_tag,
        };
        self.envelope
            .open_for_download(&payload, &report.record_id, owner_id)
    }

    /// Revoke the report's key. The ciphertext stays in blob storage but can
    /// never be decrypted again; removing it is left to the blob store's own
    /// lifecycle.
    pub fn delete(&self, report: &StoredReport, owner_id: &str) -> Result<()> {
        self.envelope.revoke_key(&report.record_id, owner_id)
    }
}

fn object_segment(owner_id: &str) -> Result<Cow<'_, str>> {
    let encoded = urlencoding::encode(owner_id);
    if matches!(&*encoded, "" | "." | "..") {
        return Err(EnvelopeError::InvalidOwnerId);
    }
    Ok(encoded)
}
