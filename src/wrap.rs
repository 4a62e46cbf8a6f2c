//! Wrapping data keys under the master secret.
//!
//! The wrapping key is `SHA-256(master_secret)`. A data key is wrapped by
//! encrypting its canonical hex form with the same AES-256-GCM primitive used
//! for file bytes, under a fresh IV and an empty AAD.
//!
//! ## Stored format
//!
//! ```text
//! <iv_hex>:<auth_tag_hex>:<ciphertext_hex>
//! ```
//!
//! Exactly two colons, all segments lowercase hex. The IV and tag segments
//! are 32 hex characters each; the ciphertext segment is 128 hex characters
//! (the 64-character hex key, encrypted).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{self, IV_LEN, KEY_LEN, TAG_LEN};
use crate::error::{EnvelopeError, Result};
use crate::keys::{DataKey, MasterSecret};

/// Segment separator of the stored format.
const SEPARATOR: char = ':';

/// The wrap operation binds no associated data.
const WRAP_AAD: &[u8] = b"";

/// A data key in its persisted, wrapped form.
///
/// Parsing validates the shape (three hex segments, IV and tag of the right
/// length) but says nothing about authenticity; that is only known after
/// [`KeyWrapper::unwrap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WrappedKey {
    iv: [u8; IV_LEN],
    auth_tag: [u8; TAG_LEN],
    ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Parse the `iv:tag:ciphertext` form.
    pub fn parse(encoded: &str) -> Result<Self> {
        let segments: Vec<&str> = encoded.split(SEPARATOR).collect();
        let [iv_hex, tag_hex, ct_hex] = segments.as_slice() else {
            return Err(EnvelopeError::InvalidKeyFormat);
        };

        let iv = decode_fixed::<IV_LEN>(iv_hex)?;
        let auth_tag = decode_fixed::<TAG_LEN>(tag_hex)?;
        let ciphertext = decode_lower_hex(ct_hex)?;

        Ok(Self {
            iv,
            auth_tag,
            ciphertext,
        })
    }

    /// The stored string form.
    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            hex::encode(self.iv),
            hex::encode(self.auth_tag),
            hex::encode(&self.ciphertext),
            sep = SEPARATOR
        )
    }
}

/// `hex::decode` also accepts uppercase digits; the stored format does not.
fn decode_lower_hex(segment: &str) -> Result<Vec<u8>> {
    if !segment.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(EnvelopeError::InvalidKeyFormat);
    }
    hex::decode(segment).map_err(|_| EnvelopeError::InvalidKeyFormat)
}

fn decode_fixed<const N: usize>(segment: &str) -> Result<[u8; N]> {
    let bytes = decode_lower_hex(segment)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| EnvelopeError::InvalidKeyFormat)
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for WrappedKey {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WrappedKey {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WrappedKey> for String {
    fn from(value: WrappedKey) -> Self {
        value.encode()
    }
}

// ---------------------------------------------------------------------------
// Wrapper
// ---------------------------------------------------------------------------

/// Wraps and unwraps data keys under a key derived from the master secret.
///
/// Holds only the derived wrapping key (zeroised on drop), never the master
/// secret itself. Stateless otherwise, and safe to share across threads.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyWrapper {
    wrapping_key: [u8; KEY_LEN],
}

impl KeyWrapper {
    pub fn new(master: &MasterSecret) -> Self {
        Self {
            wrapping_key: crypto::sha256(master.as_bytes()),
        }
    }

    /// Encrypt the key's hex form under a fresh IV.
    pub fn wrap(&self, key: &DataKey) -> Result<WrappedKey> {
        let encoded = key.to_hex();
        let sealed = crypto::seal(&self.wrapping_key, encoded.as_bytes(), WRAP_AAD)?;
        Ok(WrappedKey {
            iv: sealed.iv,
            auth_tag: sealed.auth_tag,
            ciphertext: sealed.ciphertext,
        })
    }

    /// Decrypt a wrapped key.
    ///
    /// A tag mismatch means the blob was corrupted or the master secret
    /// changed; either way the result is `AuthenticationFailure`, never a
    /// different key.
    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<DataKey> {
        let plaintext = Zeroizing::new(crypto::open(
            &self.wrapping_key,
            &wrapped.ciphertext,
            &wrapped.iv,
            &wrapped.auth_tag,
            WRAP_AAD,
        )?);
        let encoded = std::str::from_utf8(&plaintext).map_err(|_| EnvelopeError::InvalidKeyFormat)?;
        DataKey::from_hex(encoded).map_err(|_| EnvelopeError::InvalidKeyFormat)
    }

    /// Parse and unwrap the stored string form in one step.
    pub fn unwrap_str(&self, encoded: &str) -> Result<DataKey> {
        self.unwrap(&WrappedKey::parse(encoded)?)
    }
}

impl fmt::Debug for KeyWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyWrapper([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(secret: &str) -> KeyWrapper {
        KeyWrapper::new(&MasterSecret::new(secret).unwrap())
    }

    #[test]
    fn test_wrap_unwrap() {
        let w = wrapper("correct horse battery staple");
        let key = DataKey::generate().unwrap();

        let wrapped = w.wrap(&key).unwrap();
        let unwrapped = w.unwrap(&wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_stored_format_shape() {
        let w = wrapper("secret");
        let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();

        let segments: Vec<&str> = encoded.split(':').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), IV_LEN * 2);
        assert_eq!(segments[1].len(), TAG_LEN * 2);
        assert_eq!(segments[2].len(), KEY_LEN * 4);
        assert!(encoded
            .chars()
            .all(|c| c == ':' || c.is_ascii_digit() || ('a'..='f').contains(&c)));

        let reparsed = WrappedKey::parse(&encoded).unwrap();
        assert_eq!(reparsed.encode(), encoded);
    }

    #[test]
    fn test_fresh_iv_per_wrap() {
        let w = wrapper("secret");
        let key = DataKey::generate().unwrap();
        assert_ne!(w.wrap(&key).unwrap().iv, w.wrap(&key).unwrap().iv);
    }

    #[test]
    fn test_segment_count_enforced() {
        for bad in ["", "abcd", "aa:bb", "aa:bb:cc:dd"] {
            assert!(
                matches!(WrappedKey::parse(bad), Err(EnvelopeError::InvalidKeyFormat)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_non_hex_and_short_segments_rejected() {
        let iv = "00".repeat(IV_LEN);
        let tag = "11".repeat(TAG_LEN);
        assert!(WrappedKey::parse(&format!("{iv}:{tag}:abcd")).is_ok());
        assert!(matches!(
            WrappedKey::parse(&format!("zz{}:{tag}:abcd", &iv[2..])),
            Err(EnvelopeError::InvalidKeyFormat)
        ));
        assert!(matches!(
            WrappedKey::parse(&format!("{}:{tag}:abcd", &iv[2..])),
            Err(EnvelopeError::InvalidKeyFormat)
        ));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let w = wrapper("secret");
        let wrapped = w.wrap(&DataKey::generate().unwrap()).unwrap();
        let json = serde_json::to_string(&wrapped).unwrap();
        assert_eq!(json, format!("\"{}\"", wrapped.encode()));

        let back: WrappedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wrapped);
        assert!(serde_json::from_str::<WrappedKey>("\"not-a-key\"").is_err());
    }
}
