use pp_types::ContentLocator;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage service could not be reached or returned no locator.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The gateway answered with a non-success status.
    #[error("payload not found: {locator} (status {status})")]
    NotFound { locator: ContentLocator, status: u16 },

    /// The body did not parse into the expected shape.
    #[error("malformed payload at {locator}: {reason}")]
    MalformedPayload {
        locator: ContentLocator,
        reason: String,
    },

    /// Local serialization failure before any network call.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
