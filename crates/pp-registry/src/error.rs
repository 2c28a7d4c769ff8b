use std::time::Duration;

use alloy_primitives::{Address, B256};
use pp_crypto::{FreshnessError, SignatureError};
use pp_history::HistoryError;
use pp_ledger::{LedgerError, ProgramError};
use pp_types::{ContentLocator, IdentityKind, TypeError};

/// Errors raised by the identity registry adapters.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The chip (or its metadata slot) is already bound.
    #[error("chip already set")]
    AlreadySet,

    #[error("invalid chip signature")]
    InvalidSignature,

    /// The attestation's anchor block is deeper than the freshness window.
    #[error("block number too old")]
    BlockNumberTooOld,

    /// The attestation's anchor block is not below the inclusion height.
    #[error("invalid block number")]
    InvalidBlockNumber,

    /// The account does not control the identity, or it was revoked.
    #[error("caller is not the owner of the identity")]
    NotOwner,

    #[error("identity does not exist")]
    NonexistentIdentity,

    /// More than one mint matched `(to, locator)`.
    #[error("{count} mint events match {to} / {locator}")]
    AmbiguousMintEvent {
        to: Address,
        locator: ContentLocator,
        count: usize,
    },

    /// No mint event arrived within the watch budget. The mint itself may
    /// still be pending or included.
    #[error("no mint event for {tx_hash} within {budget:?}; reconcile manually")]
    MintEventTimeout { tx_hash: B256, budget: Duration },

    #[error("no confirmation for {hash} after {waited:?}")]
    ConfirmationTimeout { hash: B256, waited: Duration },

    #[error("unsupported network: chain id {0}")]
    UnsupportedNetwork(u64),

    #[error("physical-token identities require a chip attestation")]
    MissingAttestation,

    #[error("{key} is not a {expected} identity key")]
    WrongIdentityKey { expected: IdentityKind, key: String },

    /// The write was included but its receipt lacks the expected event.
    #[error("unexpected receipt for {tx_hash}: {reason}")]
    UnexpectedReceipt { tx_hash: B256, reason: String },

    #[error("signing failed: {0}")]
    Signing(#[from] SignatureError),

    #[error(transparent)]
    History(HistoryError),

    #[error("invalid identity data: {0}")]
    Type(#[from] TypeError),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<ProgramError> for RegistryError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::AlreadySet => RegistryError::AlreadySet,
            ProgramError::InvalidSignature => RegistryError::InvalidSignature,
            ProgramError::BlockNumberTooOld => RegistryError::BlockNumberTooOld,
            ProgramError::InvalidBlockNumber => RegistryError::InvalidBlockNumber,
            ProgramError::NotOwner => RegistryError::NotOwner,
            ProgramError::NonexistentToken => RegistryError::NonexistentIdentity,
            ProgramError::UnsupportedCall | ProgramError::Unrecognized => {
                RegistryError::Ledger(LedgerError::Reverted(err))
            }
        }
    }
}

impl From<LedgerError> for RegistryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Reverted(reason) => reason.into(),
            LedgerError::ConfirmationTimeout { hash, waited } => {
                RegistryError::ConfirmationTimeout { hash, waited }
            }
            LedgerError::UnsupportedNetwork(chain_id) => RegistryError::UnsupportedNetwork(chain_id),
            other => RegistryError::Ledger(other),
        }
    }
}

impl From<FreshnessError> for RegistryError {
    fn from(err: FreshnessError) -> Self {
        tracing::warn!(%err, "chip attestation rejected before submission");
        match err {
            FreshnessError::InvalidBlockNumber { .. } => RegistryError::InvalidBlockNumber,
            FreshnessError::BlockNumberTooOld { .. } => RegistryError::BlockNumberTooOld,
        }
    }
}

impl From<HistoryError> for RegistryError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::Ledger(e) => e.into(),
            corrupt => RegistryError::History(corrupt),
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
