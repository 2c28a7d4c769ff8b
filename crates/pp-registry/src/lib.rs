//! Identity registry adapters for PermaPass.
//!
//! A passport is anchored in exactly one of three ledger registries. Each
//! adapter implements [`IdentityRegistry`] over its own program and event
//! schema; [`Registry`] dispatches between them and [`RegistrySet`] routes
//! by network.
//!
//! # Adapters
//!
//! - [`TokenRegistry`]: mint / set URI / burn, with a concurrent mint-event
//!   watch to recover the token id
//! - [`DidRegistry`]: generated identifiers handed over by signed owner
//!   change, content in a service attribute
//! - [`PhysicalTokenRegistry`]: chip-attested tokens keyed by chip address
//!
//! Also here: [`ChipCarrierBinder`] for NFC data carriers and
//! [`resolve_did`] for DID documents.

pub mod carrier;
pub mod context;
pub mod did;
pub mod did_document;
pub mod error;
pub mod physical;
pub mod registry;
pub mod token;
pub mod traits;

pub use carrier::ChipCarrierBinder;
pub use context::{RegistryConfig, RegistryContext};
pub use did::DidRegistry;
pub use did_document::{resolve_did, DidDocument, DidDocumentMetadata, DidResolution};
pub use error::{RegistryError, RegistryResult};
pub use physical::PhysicalTokenRegistry;
pub use registry::{Registry, RegistrySet};
pub use token::TokenRegistry;
pub use traits::{CreateRequest, IdentityRegistry};
