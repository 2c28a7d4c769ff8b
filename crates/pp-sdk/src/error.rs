use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] pp_store::StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] pp_registry::RegistryError),

    #[error("chip error: {0}")]
    Chip(#[from] pp_chip::ChipError),

    #[error("ledger error: {0}")]
    Ledger(#[from] pp_ledger::LedgerError),

    #[error("invalid data: {0}")]
    Type(#[from] pp_types::TypeError),

    /// No passport is bound to the chip that was read.
    #[error("chip {0} carries no passport")]
    UnboundChip(pp_types::Address),
}

pub type SdkResult<T> = Result<T, SdkError>;
