use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pp_crypto::ContentHasher;
use pp_types::ContentLocator;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

struct Inner {
    payloads: HashMap<ContentLocator, Value>,
    uploads: u64,
}

/// In-memory content store.
///
/// Intended for tests and embedding. Transaction ids are 43-character
/// base64url strings like those of the storage network, derived from an
/// upload counter and the payload bytes so that every upload gets a fresh
/// locator even for identical content.
pub struct InMemoryContentStore {
    inner: RwLock<Inner>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                payloads: HashMap::new(),
                uploads: 0,
            }),
        }
    }

    /// Number of payloads currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a payload under a caller-chosen locator.
    ///
    /// Used by the local gateway and tests to seed content; fails if the
    /// locator already holds different content.
    pub fn insert(&self, locator: ContentLocator, payload: Value) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.payloads.get(&locator) {
            Some(existing) if *existing != payload => Err(StoreError::StorageUnavailable(
                format!("{locator} already holds different content"),
            )),
            _ => {
                inner.payloads.insert(locator, payload);
                Ok(())
            }
        }
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upload(&self, payload: &Value) -> StoreResult<ContentLocator> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.uploads += 1;

        let mut material = inner.uploads.to_be_bytes().to_vec();
        material.extend_from_slice(&bytes);
        let txid = URL_SAFE_NO_PAD.encode(ContentHasher::CONTENT.hash(&material));
        let locator = ContentLocator::from_txid(txid)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        inner.payloads.insert(locator.clone(), payload.clone());
        tracing::debug!(%locator, size = bytes.len(), "stored payload");
        Ok(locator)
    }

    async fn fetch(&self, locator: &ContentLocator) -> StoreResult<Value> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .payloads
            .get(locator)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                locator: locator.clone(),
                status: 404,
            })
    }
}
