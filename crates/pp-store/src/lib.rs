//! Content store client for PermaPass.
//!
//! Passport data and identity metadata live in immutable, content-addressed
//! storage. The ledger only ever holds an `ar://<txid>` locator; this crate
//! turns locators back into payloads and uploads new payloads.
//!
//! # Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`HttpContentStore`] -- uploads through the web API, reads through a gateway
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Rules
//!
//! 1. Payloads are immutable once stored.
//! 2. Uploads are never retried or deduplicated by the client.
//! 3. There is no local cache; every call is a round trip.

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use http::{HttpContentStore, StoreConfig};
pub use memory::InMemoryContentStore;
pub use traits::{ContentStore, ContentStoreExt};
