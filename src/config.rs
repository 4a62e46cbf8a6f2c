//! Runtime configuration.
//!
//! The master secret is handed to the service explicitly at construction.
//! Loading it from the environment is a convenience for process startup
//! only, and there is no fallback value: a missing or empty secret is an
//! error, never a default.

use std::ffi::OsString;

use crate::error::{EnvelopeError, Result};
use crate::keys::MasterSecret;

/// Environment variable holding the master secret.
pub const MASTER_SECRET_VAR: &str = "MASTER_ENCRYPTION_KEY";

/// Environment variable overriding the blob object-name prefix.
pub const OBJECT_PREFIX_VAR: &str = "REPORT_OBJECT_PREFIX";

/// Default prefix for report objects in blob storage.
pub const DEFAULT_OBJECT_PREFIX: &str = "reports";

/// Configuration for the envelope service and report archive.
#[derive(Debug)]
pub struct EnvelopeConfig {
    /// Secret from which the key-wrapping key is derived.
    pub master_secret: MasterSecret,

    /// Prefix of blob object names (`{prefix}/{owner}/{millis}-{record_id}`).
    pub object_prefix: String,
}

impl EnvelopeConfig {
    pub fn new(master_secret: MasterSecret) -> Self {
        Self {
            master_secret,
            object_prefix: DEFAULT_OBJECT_PREFIX.to_string(),
        }
    }

    pub fn with_object_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.object_prefix = prefix.into();
        self
    }

    /// Load from `MASTER_ENCRYPTION_KEY` and `REPORT_OBJECT_PREFIX`.
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(MASTER_SECRET_VAR, OBJECT_PREFIX_VAR)
    }

    /// Load from explicitly named environment variables.
    ///
    /// The secret is taken as raw bytes and need not be valid UTF-8.
    pub fn from_env_vars(secret_var: &str, prefix_var: &str) -> Result<Self> {
        let secret = std::env::var_os(secret_var)
            .ok_or_else(|| EnvelopeError::Config(format!("{secret_var} is not set")))?;
        let secret = secret_bytes(secret_var, secret)?;
        if secret.is_empty() {
            return Err(EnvelopeError::Config(format!("{secret_var} is empty")));
        }
        let master_secret = MasterSecret::new(secret)?;

        let config = Self::new(master_secret);
        match std::env::var(prefix_var) {
            Ok(prefix) if !prefix.trim().is_empty() => {
                Ok(config.with_object_prefix(prefix.trim().trim_matches('/')))
            }
            _ => Ok(config),
        }
    }
}

#[cfg(unix)]
fn secret_bytes(_var: &str, value: OsString) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    Ok(value.into_vec())
}

#[cfg(not(unix))]
fn secret_bytes(var: &str, value: OsString) -> Result<Vec<u8>> {
    value
        .into_string()
        .map(String::into_bytes)
        .map_err(|_| EnvelopeError::Config(format!("{var} is not valid Unicode")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names so they can run in parallel.

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = EnvelopeConfig::from_env_vars(
            "MEDVAULT_TEST_MISSING_SECRET",
            "MEDVAULT_TEST_MISSING_PREFIX",
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::Config(_)));
        assert!(err.to_string().contains("MEDVAULT_TEST_MISSING_SECRET"));
    }

    #[test]
    fn test_empty_secret_is_an_error() {
        std::env::set_var("MEDVAULT_TEST_EMPTY_SECRET", "");
        let err = EnvelopeConfig::from_env_vars(
            "MEDVAULT_TEST_EMPTY_SECRET",
            "MEDVAULT_TEST_EMPTY_PREFIX",
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::Config(_)));
    }

    #[test]
    fn test_loads_secret_and_prefix() {
        std::env::set_var("MEDVAULT_TEST_SECRET", "s3cr3t");
        std::env::set_var("MEDVAULT_TEST_PREFIX", "/uploads/");
        let config =
            EnvelopeConfig::from_env_vars("MEDVAULT_TEST_SECRET", "MEDVAULT_TEST_PREFIX").unwrap();
        assert_eq!(config.master_secret.as_bytes(), b"s3cr3t");
        assert_eq!(config.object_prefix, "uploads");
    }

    #[test]
    fn test_default_prefix() {
        std::env::set_var("MEDVAULT_TEST_SECRET_ONLY", "s3cr3t");
        let config = EnvelopeConfig::from_env_vars(
            "MEDVAULT_TEST_SECRET_ONLY",
            "MEDVAULT_TEST_UNSET_PREFIX",
        )
        .unwrap();
        assert_eq!(config.object_prefix, DEFAULT_OBJECT_PREFIX);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_secret_is_taken_as_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = [0xff, 0xfe, b'k', b'e', b'y'];
        std::env::set_var("MEDVAULT_TEST_RAW_SECRET", OsStr::from_bytes(&raw));
        let config = EnvelopeConfig::from_env_vars(
            "MEDVAULT_TEST_RAW_SECRET",
            "MEDVAULT_TEST_RAW_PREFIX",
        )
        .unwrap();
        assert_eq!(config.master_secret.as_bytes(), &raw[..]);
    }
}
