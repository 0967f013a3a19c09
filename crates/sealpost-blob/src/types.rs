//! Blob ids and publisher response shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BlobError, Result};

/// Identifier the store assigned to an uploaded blob.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Accepts any non-empty id that can sit in a URL path segment.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() || id.contains(['/', '?', '#']) || id.contains(char::is_whitespace) {
            return Err(BlobError::InvalidBlobId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// Ids computed by the store itself are valid by construction.
    pub(crate) fn from_digest(digest: &blake3::Hash) -> Self {
        Self(hex::encode(digest.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobId {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = BlobError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publisher responses
// ─────────────────────────────────────────────────────────────────────────────

/// Which shape the publisher answered with. Both are successful uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    NewlyCreated,
    AlreadyCertified,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub blob_id: BlobId,
    pub outcome: UploadOutcome,
    /// Last epoch the blob is stored for, when the store reports it.
    pub end_epoch: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub blob_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub end_epoch: u64,
}

/// One arm of a publisher response. Some publishers nest the id in
/// `blobObject`, others report `blobId` directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedBlob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_object: Option<BlobObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_epoch: Option<u64>,
}

impl PublishedBlob {
    fn id(&self) -> Option<&str> {
        self.blob_object
            .as_ref()
            .map(|o| o.blob_id.as_str())
            .or(self.blob_id.as_deref())
    }

    fn end_epoch(&self) -> Option<u64> {
        self.blob_object
            .as_ref()
            .and_then(|o| o.storage.as_ref())
            .map(|s| s.end_epoch)
            .or(self.end_epoch)
    }
}

/// Body of `PUT /v1/blobs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newly_created: Option<PublishedBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_certified: Option<PublishedBlob>,
}

impl PublisherResponse {
    pub fn newly_created(blob_id: &BlobId, end_epoch: u64) -> Self {
        Self {
            newly_created: Some(PublishedBlob {
                blob_object: Some(BlobObject {
                    blob_id: blob_id.to_string(),
                    storage: Some(StorageInfo { end_epoch }),
                }),
                ..Default::default()
            }),
            already_certified: None,
        }
    }

    pub fn already_certified(blob_id: &BlobId, end_epoch: u64) -> Self {
        Self {
            newly_created: None,
            already_certified: Some(PublishedBlob {
                blob_object: Some(BlobObject {
                    blob_id: blob_id.to_string(),
                    storage: Some(StorageInfo { end_epoch }),
                }),
                ..Default::default()
            }),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| BlobError::MalformedResponse(e.to_string()))
    }

    /// The single path from either response shape to a receipt.
    pub fn receipt(&self) -> Result<UploadReceipt> {
        let (entry, outcome) = match (&self.newly_created, &self.already_certified) {
            (Some(entry), _) => (entry, UploadOutcome::NewlyCreated),
            (None, Some(entry)) => (entry, UploadOutcome::AlreadyCertified),
            (None, None) => {
                return Err(BlobError::MalformedResponse(
                    "neither newlyCreated nor alreadyCertified present".into(),
                ))
            }
        };
        let id = entry
            .id()
            .ok_or_else(|| BlobError::MalformedResponse("blob id missing".into()))?;
        Ok(UploadReceipt {
            blob_id: BlobId::new(id)?,
            outcome,
            end_epoch: entry.end_epoch(),
        })
    }

    pub fn blob_id(&self) -> Result<BlobId> {
        self.receipt().map(|r| r.blob_id)
    }
}
