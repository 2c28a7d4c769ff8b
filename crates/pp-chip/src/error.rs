use alloy_primitives::Address;
use pp_crypto::{FreshnessError, SignatureError};
use pp_ledger::LedgerError;

/// Errors from the chip binding protocol.
#[derive(Debug, thiserror::Error)]
pub enum ChipError {
    /// Another signing session holds the chip.
    #[error("chip is busy with another session")]
    ChipBusy,

    /// NFC transport or chip command failure.
    #[error("chip driver error: {0}")]
    Driver(String),

    /// Recovery from the chip's signature disagrees with the key it reports.
    #[error("chip signature mismatch: expected signer {expected}")]
    ChipSignatureMismatch { expected: Address },

    #[error("invalid chip signature: {0}")]
    InvalidSignature(SignatureError),

    #[error(transparent)]
    Freshness(#[from] FreshnessError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<SignatureError> for ChipError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Mismatch { expected } => ChipError::ChipSignatureMismatch { expected },
            other => ChipError::InvalidSignature(other),
        }
    }
}

/// Result alias for chip operations.
pub type ChipResult<T> = Result<T, ChipError>;
