use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// PermaPass HTTP server.
pub struct PassportServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl PassportServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Serve on an already bound listener until the task is dropped.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "PermaPass server listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Bind the configured address and serve requests.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener).await
    }
}
