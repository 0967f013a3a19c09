//! Error types for the ledger boundary.

use thiserror::Error;

use sealpost_core::CoreError;

/// Errors raised while talking to the ledger or interpreting its results.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger could not be reached, or answered with a transport-level
    /// failure. Transient.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A shared object was mutated concurrently. Transient; resubmit.
    #[error("object version conflict: {0}")]
    VersionConflict(String),

    /// A transaction executed but did not produce the object we expected.
    #[error("expected object {expected} not found in transaction {digest}")]
    ObjectNotFound { expected: String, digest: String },

    /// The sender does not hold the capability the call requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The call aborted on-ledger for a reason other than authorization.
    #[error("{function} aborted with code {code}: {message}")]
    Aborted {
        function: String,
        code: u64,
        message: String,
    },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("transaction signature does not match sender")]
    InvalidSignature,

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// The gateway returned a JSON-RPC error we do not classify.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::VersionConflict(_))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
