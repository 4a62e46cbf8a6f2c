//! Error types for medvault.
//!
//! Every variant is a distinct failure mode of the envelope-encryption core.
//! Messages are intentionally minimal: they say *what* failed without
//! revealing *why* in ways that could leak key material or help an
//! unauthorized caller learn which records exist.

use thiserror::Error;

/// Result alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Boxed failure raised by an external collaborator (key store, blob store).
pub type StorageFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The single error type for all medvault operations.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A wrapped key did not parse into exactly three hex segments of the
    /// expected lengths. Signals data corruption; never retried.
    #[error("invalid wrapped key format")]
    InvalidKeyFormat,

    /// AEAD tag verification failed during file decryption or key unwrap:
    /// tampered ciphertext, wrong key, wrong IV, wrong AAD, or a changed
    /// master secret. No partial output is ever produced.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The unwrapped data key does not hash to the stored key hash.
    #[error("key integrity check failed")]
    KeyIntegrityFailure,

    /// Lookup failed because the record is missing, owned by someone else,
    /// or revoked. The three cases are deliberately indistinguishable.
    #[error("key not found or revoked")]
    KeyNotFoundOrRevoked,

    /// Key material had the wrong length for AES-256.
    #[error("invalid key")]
    InvalidKey,

    /// The AEAD seal operation failed.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// A key store or blob store failed. The collaborator's error is kept
    /// as the source, unchanged.
    #[error("storage error: {0}")]
    Storage(#[source] StorageFailure),

    /// An owner id that cannot be used as a blob object-name segment.
    #[error("invalid owner id")]
    InvalidOwnerId,

    /// Required configuration is missing or empty.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EnvelopeError {
    /// Wrap a collaborator failure.
    pub fn storage(err: impl Into<StorageFailure>) -> Self {
        Self::Storage(err.into())
    }

    /// True for failures that a retry with identical inputs cannot change.
    ///
    /// Only storage failures may be transient; the core itself never
    /// retries, this is a hint for collaborators' retry policies.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::RandomnessFailure)
    }
}
