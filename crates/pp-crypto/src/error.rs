use alloy_primitives::Address;
use thiserror::Error;

/// Errors from signing, recovery, and signature normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key")]
    InvalidKey,

    #[error("malformed DER signature: {0}")]
    MalformedDer(String),

    #[error("public key recovery failed")]
    RecoveryFailed,

    /// No recovery id reproduces the expected signer.
    #[error("chip signature mismatch: no recovery id yields {expected}")]
    Mismatch { expected: Address },
}

/// Anchor-height checks shared by the chip protocol and the registries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessError {
    #[error("anchor block {anchor} is not below inclusion height {height}")]
    InvalidBlockNumber { anchor: u64, height: u64 },

    #[error("anchor block {anchor} is more than {max_depth} blocks behind height {height}")]
    BlockNumberTooOld {
        anchor: u64,
        height: u64,
        max_depth: u64,
    },
}
