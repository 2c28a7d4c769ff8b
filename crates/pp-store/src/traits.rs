use async_trait::async_trait;
use pp_types::ContentLocator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Immutable put/get over opaque JSON payloads.
///
/// All implementations must satisfy these invariants:
/// - `fetch(upload(p)) == p` for every payload.
/// - A locator is never reused for different content.
/// - Uploads are not idempotent: identical payloads may yield distinct
///   locators. Callers must not retry an upload to "dedupe" it.
/// - Nothing is cached locally; every call is one round trip.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `payload` and return its locator.
    async fn upload(&self, payload: &Value) -> StoreResult<ContentLocator>;

    /// Retrieve the payload stored under `locator`.
    async fn fetch(&self, locator: &ContentLocator) -> StoreResult<Value>;
}

/// Typed helpers over [`ContentStore`].
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    async fn upload_json<T>(&self, value: &T) -> StoreResult<ContentLocator>
    where
        T: Serialize + Sync,
    {
        let payload =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.upload(&payload).await
    }

    /// Fetch and decode; a shape mismatch is `MalformedPayload`.
    async fn fetch_as<T>(&self, locator: &ContentLocator) -> StoreResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.fetch(locator).await?;
        serde_json::from_value(value).map_err(|e| StoreError::MalformedPayload {
            locator: locator.clone(),
            reason: e.to_string(),
        })
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}
