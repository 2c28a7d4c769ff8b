//! Error types for the history walker.

use pp_ledger::LedgerError;

/// Errors that can occur while reconstructing a passport's history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The pointer chain cannot be followed safely. Distinct from an empty
    /// history, which is a valid result.
    #[error("corrupt provenance chain at slot {slot}: {reason}")]
    CorruptProvenanceChain {
        /// Slot being visited when the problem was found.
        slot: u64,
        reason: String,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl HistoryError {
    pub(crate) fn corrupt(slot: u64, reason: impl Into<String>) -> Self {
        HistoryError::CorruptProvenanceChain {
            slot,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for history results.
pub type HistoryResult<T> = Result<T, HistoryError>;
