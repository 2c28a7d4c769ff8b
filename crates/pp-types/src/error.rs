use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid content locator: {0}")]
    InvalidLocator(String),

    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("invalid data carrier link: {0}")]
    InvalidLink(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
