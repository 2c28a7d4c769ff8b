use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{self, AppState};

/// Build the axum router with all PermaPass endpoints.
///
/// The storage and DID APIs live under `/api`; any other single-segment
/// path is served as a content gateway read.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/arweave", post(handler::upload_handler))
        .route("/did", get(handler::did_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .nest("/api", api)
        .route("/:txid", get(handler::gateway_handler))
        .layer(RequestBodyLimitLayer::new(config.body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
