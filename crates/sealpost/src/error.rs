//! Error types for orchestrated flows.
//!
//! Adapter errors are wrapped with the step that failed, so callers can tell
//! a failed create from a failed open without reading message text.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use sealpost_blob::BlobError;
use sealpost_core::{Address, CoreError};
use sealpost_ledger::LedgerError;
use sealpost_seal::SealError;

/// Steps of the creation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    CreatePolicy,
    LookupOwnerCap,
    AddRecipients,
    DeriveIdentifier,
    Encrypt,
    Upload,
    AttachBlob,
    TransferPolicy,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreatePolicy => "create policy",
            Self::LookupOwnerCap => "look up owner capability",
            Self::AddRecipients => "add recipients",
            Self::DeriveIdentifier => "derive identifier",
            Self::Encrypt => "encrypt",
            Self::Upload => "upload",
            Self::AttachBlob => "attach blob",
            Self::TransferPolicy => "transfer policy",
        };
        f.write_str(s)
    }
}

/// Steps of the decryption sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStage {
    Download,
    BindSession,
    BuildApproval,
    Decrypt,
}

impl fmt::Display for DecryptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Download => "download",
            Self::BindSession => "bind session",
            Self::BuildApproval => "build approval",
            Self::Decrypt => "decrypt",
        };
        f.write_str(s)
    }
}

/// Coarse classification used for retry decisions and user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    ObjectNotFound,
    Unauthorized,
    SessionInvalid,
    StoreUnavailable,
    ServiceUnavailable,
    AuthorizationDenied,
    BlobNotFound,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable | Self::ServiceUnavailable | Self::Timeout
        )
    }
}

/// An adapter failure inside one step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),
}

fn ledger_kind(e: &LedgerError) -> ErrorKind {
    match e {
        LedgerError::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
        LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
        LedgerError::Unavailable(_) | LedgerError::VersionConflict(_) => {
            ErrorKind::ServiceUnavailable
        }
        LedgerError::Aborted { .. } | LedgerError::InvalidTransaction(_) => ErrorKind::InvalidInput,
        LedgerError::Core(CoreError::Entropy(_)) => ErrorKind::Configuration,
        _ => ErrorKind::Internal,
    }
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(CoreError::Entropy(_)) => ErrorKind::Configuration,
            Self::Core(CoreError::InvalidAddress(_) | CoreError::InvalidIdentifier(_)) => {
                ErrorKind::InvalidInput
            }
            Self::Core(_) => ErrorKind::Internal,
            Self::Ledger(e) => ledger_kind(e),
            Self::Seal(e) => match e {
                SealError::SessionInvalid(_)
                | SealError::SignatureMismatch
                | SealError::AlreadySigned => ErrorKind::SessionInvalid,
                SealError::AuthorizationDenied { .. } | SealError::AccessDenied(_) => {
                    ErrorKind::AuthorizationDenied
                }
                SealError::ServiceUnavailable { .. } | SealError::Unavailable(_) => {
                    ErrorKind::ServiceUnavailable
                }
                SealError::InvalidConfig(_)
                | SealError::InvalidThreshold { .. }
                | SealError::KeyServerMismatch { .. } => ErrorKind::Configuration,
                SealError::PackageMismatch { .. } | SealError::InvalidRequest(_) => {
                    ErrorKind::InvalidInput
                }
                SealError::Ledger(e) => ledger_kind(e),
                SealError::Core(CoreError::Entropy(_)) => ErrorKind::Configuration,
                _ => ErrorKind::Internal,
            },
            Self::Blob(e) => match e {
                BlobError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
                BlobError::BlobNotFound(_) => ErrorKind::BlobNotFound,
                BlobError::InvalidBlobId(_) | BlobError::InvalidEpochs => ErrorKind::InvalidInput,
                BlobError::MalformedResponse(_) => ErrorKind::Internal,
            },
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Top-level error for sealpost flows.
#[derive(Debug, Error)]
pub enum SealpostError {
    /// Required settings are absent. All missing names are listed.
    #[error("missing configuration: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A creation step failed. `policy` is set once the policy exists, so
    /// the caller can re-run encryption against it.
    #[error("create failed at {stage}: {source}")]
    Create {
        stage: CreateStage,
        policy: Option<Address>,
        #[source]
        source: StepError,
    },

    #[error("decrypt failed at {stage}: {source}")]
    Decrypt {
        stage: DecryptStage,
        #[source]
        source: StepError,
    },

    #[error("credentials file: {0}")]
    Credentials(String),
}

impl SealpostError {
    pub(crate) fn create(stage: CreateStage, policy: Option<Address>) -> impl FnOnce(StepError) -> Self {
        move |source| Self::Create {
            stage,
            policy,
            source,
        }
    }

    pub(crate) fn decrypt(stage: DecryptStage) -> impl FnOnce(StepError) -> Self {
        move |source| Self::Decrypt { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::InvalidInput(_) | Self::Credentials(_) => ErrorKind::InvalidInput,
            Self::Create { source, .. } | Self::Decrypt { source, .. } => source.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Policy created before the failure, if any.
    pub fn orphaned_policy(&self) -> Option<Address> {
        match self {
            Self::Create { policy, .. } => *policy,
            _ => None,
        }
    }

    /// Text for the person at the terminal.
    pub fn user_message(&self) -> String {
        let base = match self.kind() {
            ErrorKind::Configuration => match self {
                Self::Configuration { missing } => format!(
                    "Missing configuration: {}. Set them in the environment or a .env file.",
                    missing.join(", ")
                ),
                other => format!("Configuration problem: {other}"),
            },
            ErrorKind::AuthorizationDenied => format!(
                "Access denied: you are not an allowed recipient, or the access window has closed ({self}). Retrying will not help."
            ),
            ErrorKind::Unauthorized => {
                "Not authorized to perform this action: the owner capability is required.".to_string()
            }
            ErrorKind::SessionInvalid => {
                "Session key error. Try again or check your wallet configuration.".to_string()
            }
            ErrorKind::BlobNotFound => "The encrypted blob was not found: the id is wrong or its storage expired. Re-upload it from the credentials record.".to_string(),
            ErrorKind::StoreUnavailable => "The blob store is unavailable. Check the publisher/aggregator endpoints and network connectivity, then try again.".to_string(),
            ErrorKind::ServiceUnavailable => "Key servers or the ledger are unavailable. Try again shortly.".to_string(),
            ErrorKind::Timeout => "A remote call timed out. Try again.".to_string(),
            ErrorKind::ObjectNotFound => format!(
                "The ledger did not return the expected object ({self}). Check the package id."
            ),
            ErrorKind::InvalidInput | ErrorKind::Internal => self.to_string(),
        };
        match self.orphaned_policy() {
            Some(policy) => format!(
                "{base}\nPolicy {policy} was already created; encrypt against it with `encrypt-existing`."
            ),
            None => base,
        }
    }
}

/// Result type for sealpost flows.
pub type Result<T> = std::result::Result<T, SealpostError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_ledger::DenialReason;

    #[test]
    fn test_kinds() {
        let denied = SealpostError::Decrypt {
            stage: DecryptStage::Decrypt,
            source: SealError::AuthorizationDenied {
                reason: DenialReason::NotAuthorized.to_string(),
            }
            .into(),
        };
        assert_eq!(denied.kind(), ErrorKind::AuthorizationDenied);
        assert!(!denied.is_retryable());

        let unavailable = SealpostError::Decrypt {
            stage: DecryptStage::Decrypt,
            source: SealError::ServiceUnavailable { got: 0, need: 1 }.into(),
        };
        assert_eq!(unavailable.kind(), ErrorKind::ServiceUnavailable);
        assert!(unavailable.is_retryable());

        let missing = SealpostError::Decrypt {
            stage: DecryptStage::Download,
            source: BlobError::BlobNotFound("x".into()).into(),
        };
        assert_eq!(missing.kind(), ErrorKind::BlobNotFound);

        assert_eq!(StepError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Timeout);
        assert_eq!(
            StepError::from(LedgerError::Unauthorized("cap".into())).kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn test_user_messages_distinguish_denial_from_outage() {
        let denied = SealpostError::Decrypt {
            stage: DecryptStage::Decrypt,
            source: SealError::AuthorizationDenied {
                reason: DenialReason::Expired.to_string(),
            }
            .into(),
        };
        let down = SealpostError::Decrypt {
            stage: DecryptStage::Decrypt,
            source: SealError::ServiceUnavailable { got: 0, need: 1 }.into(),
        };
        assert!(denied.user_message().contains("not an allowed recipient"));
        assert!(denied.user_message().contains("access window has closed"));
        assert!(down.user_message().contains("Try again"));
    }

    #[test]
    fn test_create_error_names_orphan() {
        let policy = Address::from_bytes([4; 32]);
        let err = SealpostError::Create {
            stage: CreateStage::Upload,
            policy: Some(policy),
            source: BlobError::StoreUnavailable {
                status: Some(503),
                message: "down".into(),
            }
            .into(),
        };
        assert_eq!(err.orphaned_policy(), Some(policy));
        assert!(err.user_message().contains(&policy.to_string()));
        assert!(err.to_string().starts_with("create failed at upload"));
    }

    #[test]
    fn test_configuration_lists_missing() {
        let err = SealpostError::Configuration {
            missing: vec!["PACKAGE_ID".into(), "SENDER_PRIVATE_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "missing configuration: PACKAGE_ID, SENDER_PRIVATE_KEY"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
