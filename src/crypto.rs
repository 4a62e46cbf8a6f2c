//! Low-level cryptographic operations.
//!
//! This module is the only place in the crate that touches the AEAD cipher,
//! the digest, or the random number generator directly. `wrap` and `service`
//! perform all encryption through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM with a 128-bit IV and a detached 128-bit tag
//! - **IV**: 16 bytes, generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **Digest**: SHA-256
//!
//! `ring` only implements 96-bit GCM nonces, so the cipher itself comes from
//! `aes-gcm`, instantiated with a 16-byte nonce. Randomness and hashing stay
//! on `ring`.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use ring::digest::{self, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Result};
use crate::keys::{DataKey, KeyHash};

/// AES-256-GCM with a 128-bit IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Size of a data key or wrapping key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the IV in bytes (128 bits).
pub const IV_LEN: usize = 16;

/// Size of the GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Additional authenticated data bound into every file ciphertext.
///
/// Ciphertexts produced under any other context tag fail authentication here.
pub const FILE_AAD: &[u8] = b"eyehealth-platform";

/// Output of a single AEAD seal: ciphertext, IV and tag carried separately.
///
/// The surrounding system must persist all three values and hand them back
/// together at decrypt time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| EnvelopeError::RandomnessFailure)
}

fn generate_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;
    Ok(iv)
}

/// Generate a cryptographically secure random 256-bit key.
pub fn generate_random_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = digest::digest(&SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Encrypt `plaintext` under `key_bytes` with a fresh IV.
///
/// The tag is returned detached; it is never appended to the ciphertext.
pub fn seal(key_bytes: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<EncryptedPayload> {
    let cipher = Aes256Gcm16::new_from_slice(key_bytes).map_err(|_| EnvelopeError::InvalidKey)?;
    let iv = generate_iv()?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), aad, &mut buffer)
        .map_err(|_| EnvelopeError::EncryptionFailure)?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    Ok(EncryptedPayload {
        ciphertext: buffer,
        iv,
        auth_tag,
    })
}

/// Decrypt and authenticate a sealed payload.
///
/// If the key, IV, tag, AAD or ciphertext is wrong, the tag check fails and
/// the caller receives `AuthenticationFailure` with no partial plaintext.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    ciphertext: &[u8],
    iv: &[u8; IV_LEN],
    auth_tag: &[u8; TAG_LEN],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key_bytes).map_err(|_| EnvelopeError::InvalidKey)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            aad,
            &mut buffer,
            Tag::from_slice(auth_tag),
        )
        .map_err(|_| EnvelopeError::AuthenticationFailure)?;

    Ok(buffer)
}

// ---------------------------------------------------------------------------
// File cipher
// ---------------------------------------------------------------------------

/// Stateless authenticated encryption of file bytes under a per-file key.
///
/// Every file ciphertext is bound to [`FILE_AAD`].
pub struct FileCipher;

impl FileCipher {
    /// Generate a fresh per-file key.
    pub fn generate_key() -> Result<DataKey> {
        DataKey::generate()
    }

    pub fn encrypt(plaintext: &[u8], key: &DataKey) -> Result<EncryptedPayload> {
        seal(key.as_bytes(), plaintext, FILE_AAD)
    }

    pub fn decrypt(payload: &EncryptedPayload, key: &DataKey) -> Result<Vec<u8>> {
        open(
            key.as_bytes(),
            &payload.ciphertext,
            &payload.iv,
            &payload.auth_tag,
            FILE_AAD,
        )
    }

    /// Deterministic fingerprint of a key, see [`KeyHash`].
    pub fn hash_key(key: &DataKey) -> KeyHash {
        KeyHash::of(key)
    }

    /// Lowercase hex SHA-256 of file contents.
    pub fn hash_file(bytes: &[u8]) -> String {
        hex::encode(sha256(bytes))
    }
}
