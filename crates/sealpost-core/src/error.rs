//! Error types for sealpost core.

use thiserror::Error;

/// Errors raised by the core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid message identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// The OS random source failed. This is a configuration problem of the
    /// host, not something a retry can fix.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    /// A signer backend (wallet, remote key) refused or failed to sign.
    #[error("signer error: {0}")]
    Signer(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
