//! Error types for threshold encryption.

use thiserror::Error;

use sealpost_core::CoreError;
use sealpost_ledger::LedgerError;

/// Errors raised by the threshold encryption layer.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid threshold: {threshold} of {total}")]
    InvalidThreshold { threshold: usize, total: usize },

    #[error("insufficient shares: got {got}, need {need}")]
    InsufficientShares { got: usize, need: usize },

    #[error("invalid share: {0}")]
    InvalidShare(String),

    #[error("invalid key server configuration: {0}")]
    InvalidConfig(String),

    #[error("key server mismatch: expected {expected}, found {found}")]
    KeyServerMismatch { expected: String, found: String },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A signature is already bound to this session.
    #[error("session already signed")]
    AlreadySigned,

    /// The offered signature was not made by the session's identity.
    #[error("signature was not produced by the session identity")]
    SignatureMismatch,

    /// Unsigned, expired, consumed, or otherwise unacceptable session.
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    /// One key server refused to release its share.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// One key server could not be reached or failed.
    #[error("key server unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key request: {0}")]
    InvalidRequest(String),

    #[error("ciphertext was sealed for package {expected}, session is for {found}")]
    PackageMismatch { expected: String, found: String },

    /// The threshold was not reached and at least one server denied access.
    #[error("authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// The threshold was not reached because too few servers answered.
    #[error("key service unavailable: {got} of {need} shares obtained")]
    ServiceUnavailable { got: usize, need: usize },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for seal operations.
pub type Result<T> = std::result::Result<T, SealError>;
