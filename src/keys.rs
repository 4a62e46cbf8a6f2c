//! Key material and ownership.
//!
//! This module owns the types that hold secret bytes:
//! 1. `DataKey`: the per-file 256-bit AES key. Lives only in memory during a
//!    single encrypt or decrypt and is never persisted unwrapped.
//! 2. `MasterSecret`: the single long-lived secret that wraps every data key.
//!
//! Both are non-`Clone`, zeroised on drop, and print as `[REDACTED]`.
//!
//! `KeyHash` is the one-way fingerprint of a data key that is persisted with
//! each key record and checked after every unwrap.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{self, KEY_LEN};
use crate::error::{EnvelopeError, Result};

// ---------------------------------------------------------------------------
// Data key
// ---------------------------------------------------------------------------

/// A per-file AES-256 key.
///
/// The canonical textual form is 64 lowercase hex characters. That form is
/// what gets hashed into a `KeyHash` and what gets wrapped under the master
/// secret.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    /// Generate a fresh random key from the system RNG.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            bytes: crypto::generate_random_key()?,
        })
    }

    /// Construct a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse the canonical hex form. Accepts exactly 64 hex characters.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(hex::decode(encoded).map_err(|_| EnvelopeError::InvalidKey)?);
        let bytes: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| EnvelopeError::InvalidKey)?;
        Ok(Self { bytes })
    }

    /// The canonical lowercase hex form, zeroised when dropped.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }

    /// Borrow the raw key bytes (use with caution).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Fingerprint of this key: SHA-256 over the canonical hex form.
    pub fn hash(&self) -> KeyHash {
        KeyHash::of(self)
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Master secret
// ---------------------------------------------------------------------------

/// The master secret from which the key-wrapping key is derived.
///
/// An opaque byte string supplied by configuration at startup. It must be
/// identical at wrap and unwrap time, otherwise every wrapped key becomes
/// unrecoverable. There is no default value.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    bytes: Vec<u8>,
}

impl MasterSecret {
    /// Construct from raw bytes. Empty secrets are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(EnvelopeError::Config("master secret is empty".into()));
        }
        Ok(Self { bytes })
    }

    /// Borrow the raw secret for wrapping-key derivation.
    ///
    /// `pub(crate)`: the secret never leaves the crate once handed in.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Key hash
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of a data key's canonical hex form.
///
/// Computed once when the key record is created; compared after every unwrap
/// so that a wrong or corrupted key is caught without comparing raw key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHash(String);

impl KeyHash {
    /// Hash a data key.
    pub fn of(key: &DataKey) -> Self {
        let encoded = key.to_hex();
        Self(hex::encode(crypto::sha256(encoded.as_bytes())))
    }

    /// Rehydrate a hash loaded from storage.
    pub fn from_hex(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Check a freshly unwrapped key against this stored hash.
    pub fn matches(&self, key: &DataKey) -> bool {
        *self == Self::of(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
