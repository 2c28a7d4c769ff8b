//! HTTP server for PermaPass.
//!
//! Exposes the two HTTP boundaries clients depend on, the storage upload
//! API (`POST /api/arweave`) and DID resolution (`GET /api/did`), plus a
//! local read gateway (`GET /{txid}`) so the HTTP content store can run
//! against a development deployment.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::PassportServer;
