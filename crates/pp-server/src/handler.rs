use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::Address;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use pp_ledger::Ledger;
use pp_registry::{resolve_did, DidDocument};
use pp_store::ContentStore;
use pp_types::{ContentLocator, Did, Network, NetworkDeployment};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ServerError, ServerResult};

/// Shared handler state: the backing store and one ledger per network.
pub struct AppState {
    store: Arc<dyn ContentStore>,
    networks: BTreeMap<u64, (NetworkDeployment, Arc<dyn Ledger>)>,
}

impl AppState {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            networks: BTreeMap::new(),
        }
    }

    pub fn with_network(mut self, deployment: NetworkDeployment, ledger: Arc<dyn Ledger>) -> Self {
        self.networks
            .insert(deployment.chain_id(), (deployment, ledger));
        self
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /v1/info
pub async fn info_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let networks: Vec<Value> = state
        .networks
        .values()
        .map(|(deployment, _)| {
            json!({
                "name": deployment.network.name(),
                "chainId": deployment.chain_id(),
                "registries": deployment.registries,
            })
        })
        .collect();
    Json(json!({
        "name": "pp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "networks": networks,
    }))
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub txid: String,
}

/// POST /api/arweave
///
/// A missing, non-JSON or `null` body is a bad request.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Json<UploadResponse>> {
    let payload = match body {
        Ok(Json(Value::Null)) => None,
        Ok(Json(payload)) => Some(payload),
        Err(rejection) => {
            tracing::debug!(%rejection, "upload body rejected");
            None
        }
    }
    .ok_or_else(|| ServerError::BadRequest("Request body is required".into()))?;
    let locator = state.store.upload(&payload).await?;
    Ok(Json(UploadResponse {
        txid: locator.txid().to_string(),
    }))
}

/// GET /{txid}
pub async fn gateway_handler(
    State(state): State<Arc<AppState>>,
    Path(txid): Path<String>,
) -> ServerResult<Json<Value>> {
    let locator =
        ContentLocator::from_txid(txid).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    Ok(Json(state.store.fetch(&locator).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidQuery {
    pub did_url: Option<String>,
    pub registry_address: Option<Address>,
}

/// GET /api/did?didUrl=..&registryAddress=..
///
/// Without `registryAddress` the deployment's own identifier registry is
/// used, except on the development network where it must be given.
pub async fn did_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DidQuery>,
) -> ServerResult<Json<DidDocument>> {
    let did_url = query
        .did_url
        .ok_or_else(|| ServerError::BadRequest("didUrl is required".into()))?;
    let did = Did::parse(&did_url).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let network = did
        .network()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let (deployment, ledger) = state.networks.get(&network.chain_id()).ok_or_else(|| {
        ServerError::BadRequest(format!("network {} is not served", network.name()))
    })?;
    let registry = match (query.registry_address, network) {
        (Some(address), _) => address,
        (None, Network::Hardhat) => {
            return Err(ServerError::BadRequest(
                "registryAddress is required on hardhat".into(),
            ))
        }
        (None, _) => deployment.registries.did,
    };

    tracing::debug!(%did, %registry, "resolving DID");
    let resolution = resolve_did(ledger.as_ref(), registry, &did).await?;
    Ok(Json(resolution.did_document))
}
