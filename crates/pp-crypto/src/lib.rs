//! Cryptographic primitives for PermaPass.
//!
//! Provides keccak digests in the ledger's formats, secp256k1 signing and
//! public-key recovery, conversion of chip DER signatures into compact
//! low-`s` form, and the freshness window applied to chip anchors.
//!
//! All curve arithmetic is delegated to `k256`; no custom cryptography.

pub mod der;
pub mod error;
pub mod freshness;
pub mod hasher;
pub mod signer;

pub use der::{normalize_der, SECP256K1_ORDER};
pub use error::{FreshnessError, SignatureError};
pub use freshness::{verify_chip_signature, FreshnessWindow, DEFAULT_MAX_DEPTH};
pub use hasher::{
    chip_challenge, chip_digest, did_change_owner_digest, keccak256, signed_message_digest,
    ContentHasher, SIGNED_MESSAGE_PREFIX,
};
pub use signer::{recover_address, PublicKey, SigningKey};
