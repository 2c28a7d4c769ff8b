use std::time::Duration;

use alloy_primitives::{Address, B256};

/// Revert reasons raised by the registry programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("chip already set")]
    AlreadySet,

    #[error("block number too old")]
    BlockNumberTooOld,

    #[error("invalid block number")]
    InvalidBlockNumber,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("caller is not the owner")]
    NotOwner,

    #[error("nonexistent token")]
    NonexistentToken,

    #[error("call not supported by this program")]
    UnsupportedCall,

    /// Reverted with a reason no registry program defines.
    #[error("reverted without a recognized reason")]
    Unrecognized,
}

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unsupported network: chain id {0}")]
    UnsupportedNetwork(u64),

    /// The transaction would revert; it was never included in a block.
    #[error("transaction reverted: {0}")]
    Reverted(#[from] ProgramError),

    #[error("no receipt for {hash} after {waited:?}")]
    ConfirmationTimeout { hash: B256, waited: Duration },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("no program deployed at {0}")]
    UnknownProgram(Address),

    #[error("unexpected call output: expected {expected}, got {got}")]
    UnexpectedOutput { expected: &'static str, got: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("undecodable ledger data: {0}")]
    Decode(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
