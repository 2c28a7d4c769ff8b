use std::time::Duration;

use async_trait::async_trait;
use pp_types::ContentLocator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// Endpoints of the storage upload service and the read gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the web API exposing `POST /arweave`.
    pub web_api_url: String,
    /// Base URL that `<txid>` is appended to for reads.
    pub gateway_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            web_api_url: "http://localhost:3000/api".into(),
            gateway_url: "https://arweave.net".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    txid: Option<String>,
}

/// Content store backed by the upload web API and a read gateway.
pub struct HttpContentStore {
    client: reqwest::Client,
    config: StoreConfig,
}

impl HttpContentStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn upload_url(&self) -> String {
        format!("{}/arweave", self.config.web_api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn upload(&self, payload: &Value) -> StoreResult<ContentLocator> {
        let url = self.upload_url();
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::StorageUnavailable(format!(
                "upload service returned {status}"
            )));
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("unreadable upload response: {e}")))?;
        let txid = body
            .txid
            .ok_or_else(|| StoreError::StorageUnavailable("no txid in upload response".into()))?;
        let locator = ContentLocator::from_txid(txid)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        tracing::info!(%locator, "uploaded payload");
        Ok(locator)
    }

    async fn fetch(&self, locator: &ContentLocator) -> StoreResult<Value> {
        let url = locator.to_gateway_url(&self.config.gateway_url);
        tracing::debug!(%url, "fetching payload");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::NotFound {
                locator: locator.clone(),
                status: status.as_u16(),
            });
        }
        // Gateways do not always label JSON bodies; parse the text ourselves.
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| StoreError::MalformedPayload {
            locator: locator.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpContentStore {
        HttpContentStore::new(StoreConfig {
            web_api_url: format!("{}/api", server.uri()),
            gateway_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn upload_posts_payload_and_returns_locator() {
        let server = MockServer::start().await;
        let payload = json!({"name": "Beam A"});
        Mock::given(method("POST"))
            .and(path("/api/arweave"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"txid": "abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        let locator = store_for(&server).upload(&payload).await.unwrap();
        assert_eq!(locator.to_uri(), "ar://abc123");
    }

    #[tokio::test]
    async fn upload_without_txid_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/arweave"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let err = store_for(&server).upload(&json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn upload_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = store_for(&server).upload(&json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn fetch_reads_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"condition":"new"}"#))
            .mount(&server)
            .await;

        let locator = ContentLocator::from_txid("tx9").unwrap();
        let value = store_for(&server).fetch(&locator).await.unwrap();
        assert_eq!(value, json!({"condition": "new"}));
    }

    #[tokio::test]
    async fn fetch_non_success_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let locator = ContentLocator::from_txid("gone").unwrap();
        let err = store_for(&server).fetch(&locator).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { status: 404, .. }));
    }

    #[tokio::test]
    async fn fetch_bad_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let locator = ContentLocator::from_txid("html").unwrap();
        let err = store_for(&server).fetch(&locator).await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedPayload { .. }));
    }
}
