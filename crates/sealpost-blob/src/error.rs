//! Error types for blob storage.

use thiserror::Error;

/// Errors raised by blob store adapters.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The store answered with a non-success status, or could not be reached
    /// (`status` is `None`).
    #[error("blob store unavailable (status {status:?}): {message}")]
    StoreUnavailable { status: Option<u16>, message: String },

    /// Unknown id, or storage for it has lapsed.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("malformed publisher response: {0}")]
    MalformedResponse(String),

    #[error("invalid blob id: {0:?}")]
    InvalidBlobId(String),

    #[error("storage duration must be at least one epoch")]
    InvalidEpochs,
}

impl BlobError {
    pub(crate) fn transport(e: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            status: None,
            message: e.to_string(),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Result type for blob operations.
pub type Result<T> = std::result::Result<T, BlobError>;
