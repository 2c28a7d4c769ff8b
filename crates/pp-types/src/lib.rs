//! Foundation types for PermaPass.
//!
//! This crate provides the value types shared by every other PermaPass crate:
//! where passport data lives, which ledger identity it is bound to, and what a
//! reconstructed version history looks like.
//!
//! # Key Types
//!
//! - [`ContentLocator`]: `ar://<txid>` address of one immutable payload
//! - [`IdentityMetadata`]: the ledger handle a passport is bound to
//! - [`ChangePointer`] / [`VersionEntry`]: backward-linked provenance chain
//! - [`ChipAttestation`]: single-use proof of chip possession
//! - [`DataCarrierLink`]: deep link written to QR codes and NFC tags

pub mod attestation;
pub mod error;
pub mod identity;
pub mod link;
pub mod locator;
pub mod network;
pub mod payload;
pub mod version;

pub use attestation::{ChipAttestation, CompactSignature};
pub use error::TypeError;
pub use identity::{
    Did, IdentityKey, IdentityKind, IdentityMetadata, PhysicalTokenIdentity,
    SelfSovereignIdentity, TokenIdentity, PASSPORT_SERVICE_TYPE,
};
pub use link::{DataCarrierLink, DEFAULT_APP_SCHEME};
pub use locator::ContentLocator;
pub use network::{Network, NetworkDeployment, RegistryAddresses};
pub use payload::PassportPayload;
pub use version::{ChangePointer, VersionEntry};

pub use alloy_primitives::{Address, B256};
