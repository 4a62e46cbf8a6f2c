//! Blob storage for ciphertext.
//!
//! The envelope core never touches blob storage; the report archive does.
//! Only ciphertext is ever written here.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Result};

/// Where a stored object can be fetched from (URL, object key, path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocator(String);

impl BlobLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object storage for encrypted file bodies.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `object_name`, returning where to fetch them.
    fn put(&self, object_name: &str, bytes: &[u8]) -> Result<BlobLocator>;

    /// Fetch the bytes previously stored at `locator`.
    fn get(&self, locator: &BlobLocator) -> Result<Vec<u8>>;
}

/// In-memory blob store, keyed by `memory://<object_name>` locators.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<BlobLocator, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, object_name: &str, bytes: &[u8]) -> Result<BlobLocator> {
        let locator = BlobLocator::new(format!("memory://{object_name}"));
        self.objects.write().insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    fn get(&self, locator: &BlobLocator) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| EnvelopeError::storage(format!("blob not found: {locator}")))
    }
}
