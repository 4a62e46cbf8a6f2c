//! # medvault
//!
//! Envelope encryption for uploaded health-report files.
//!
//! Every file is encrypted with its own AES-256-GCM data key. That key is
//! wrapped under a single master secret and persisted, together with a hash
//! of the key, as a `FileKeyRecord` owned by exactly one principal. Only the
//! master secret lives outside the database; each file's key can be revoked
//! independently.
//!
//! ## Public API
//!
//! - [`FileCipher`]: authenticated encryption of file bytes.
//! - [`KeyWrapper`]: wrapping data keys under the master secret.
//! - [`KeyStore`]: persistence of key records (implemented by the caller;
//!   [`InMemoryKeyStore`] for tests and single-instance use).
//! - [`EnvelopeService`]: encrypt-for-owner / decrypt-for-owner / revoke.
//! - [`ReportArchive`]: the same, plus ciphertext in a [`BlobStore`].

pub mod audit;
pub mod blob;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod reports;
pub mod service;
pub mod store;
pub mod wrap;

pub use blob::{BlobLocator, BlobStore, InMemoryBlobStore};
pub use config::EnvelopeConfig;
pub use crypto::{EncryptedPayload, FileCipher, IV_LEN, KEY_LEN, TAG_LEN};
pub use error::{EnvelopeError, Result};
pub use keys::{DataKey, KeyHash, MasterSecret};
pub use reports::{ReportArchive, StoredReport};
pub use service::{DecryptedFile, EnvelopeService};
pub use store::{FileKeyRecord, InMemoryKeyStore, KeyId, KeyStore, NewFileKey, OwnerId};
pub use wrap::{KeyWrapper, WrappedKey};
