//! In-memory blob store.
//!
//! Content-addressed by blake3 and epoch-aware, so tests see the same
//! `alreadyCertified` and expiry behavior as a real publisher.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BlobError, Result};
use crate::store::BlobStore;
use crate::types::{BlobId, PublisherResponse, UploadReceipt};

struct StoredBlob {
    data: Bytes,
    end_epoch: u64,
}

#[derive(Default)]
struct StoreState {
    epoch: u64,
    blobs: HashMap<BlobId, StoredBlob>,
    uploads: u64,
    offline: bool,
}

/// A [`BlobStore`] held in process memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<StoreState>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the store assigns to `data`.
    pub fn content_id(data: &[u8]) -> BlobId {
        BlobId::from_digest(&blake3::hash(data))
    }

    pub async fn current_epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Move the store clock forward; lapsed blobs stop downloading.
    pub async fn advance_epochs(&self, n: u64) {
        self.inner.write().await.epoch += n;
    }

    /// While offline every call fails with `StoreUnavailable`.
    pub async fn set_online(&self, online: bool) {
        self.inner.write().await.offline = !online;
    }

    /// Upload attempts that reached the store.
    pub async fn upload_count(&self) -> u64 {
        self.inner.read().await.uploads
    }

    /// Store `data` and answer the way a publisher does.
    pub async fn publish(&self, data: Bytes, epochs: u32) -> Result<PublisherResponse> {
        if epochs == 0 {
            return Err(BlobError::InvalidEpochs);
        }
        let mut inner = self.inner.write().await;
        if inner.offline {
            return Err(offline());
        }
        inner.uploads += 1;

        let id = Self::content_id(&data);
        let now = inner.epoch;
        let wanted_end = now + u64::from(epochs);
        if let Some(existing) = inner.blobs.get_mut(&id) {
            if existing.end_epoch > now {
                existing.end_epoch = existing.end_epoch.max(wanted_end);
                return Ok(PublisherResponse::already_certified(&id, existing.end_epoch));
            }
        }
        inner.blobs.insert(
            id.clone(),
            StoredBlob {
                data,
                end_epoch: wanted_end,
            },
        );
        Ok(PublisherResponse::newly_created(&id, wanted_end))
    }
}

fn offline() -> BlobError {
    BlobError::StoreUnavailable {
        status: Some(503),
        message: "memory store offline".into(),
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes, epochs: u32) -> Result<UploadReceipt> {
        let response = self.publish(data, epochs).await?;
        // Same normalization path as the HTTP client.
        let json =
            serde_json::to_vec(&response).map_err(|e| BlobError::MalformedResponse(e.to_string()))?;
        let receipt = PublisherResponse::from_json(&json)?.receipt()?;
        debug!(blob_id = %receipt.blob_id, outcome = ?receipt.outcome, "memory blob stored");
        Ok(receipt)
    }

    async fn download(&self, blob_id: &BlobId) -> Result<Bytes> {
        let inner = self.inner.read().await;
        if inner.offline {
            return Err(offline());
        }
        match inner.blobs.get(blob_id) {
            Some(blob) if inner.epoch < blob.end_epoch => Ok(blob.data.clone()),
            _ => Err(BlobError::BlobNotFound(blob_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UploadOutcome;

    #[tokio::test]
    async fn test_second_upload_is_already_certified() {
        let store = MemoryBlobStore::new();
        let a = store.upload(Bytes::from_static(b"data"), 1).await.unwrap();
        let b = store.upload(Bytes::from_static(b"data"), 1).await.unwrap();
        assert_eq!(a.outcome, UploadOutcome::NewlyCreated);
        assert_eq!(b.outcome, UploadOutcome::AlreadyCertified);
        assert_eq!(a.blob_id, b.blob_id);
        assert_eq!(store.upload_count().await, 2);
    }

    #[tokio::test]
    async fn test_blobs_expire_after_their_epochs() {
        let store = MemoryBlobStore::new();
        let receipt = store.upload(Bytes::from_static(b"short"), 1).await.unwrap();
        assert_eq!(receipt.end_epoch, Some(1));
        assert!(store.download(&receipt.blob_id).await.is_ok());

        store.advance_epochs(1).await;
        assert!(matches!(
            store.download(&receipt.blob_id).await,
            Err(BlobError::BlobNotFound(_))
        ));

        // Re-uploading lapsed bytes stores them again.
        let again = store.upload(Bytes::from_static(b"short"), 5).await.unwrap();
        assert_eq!(again.outcome, UploadOutcome::NewlyCreated);
        assert_eq!(again.end_epoch, Some(6));
        assert!(store.download(&again.blob_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_reupload_extends_storage() {
        let store = MemoryBlobStore::new();
        let id = store.upload(Bytes::from_static(b"x"), 1).await.unwrap().blob_id;
        store.upload(Bytes::from_static(b"x"), 5).await.unwrap();
        store.advance_epochs(3).await;
        assert!(store.download(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_store() {
        let store = MemoryBlobStore::new();
        store.set_online(false).await;
        let err = store.upload(Bytes::from_static(b"x"), 1).await.unwrap_err();
        assert!(err.is_transient());
        store.set_online(true).await;
        assert!(store.upload(Bytes::from_static(b"x"), 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_blob() {
        let store = MemoryBlobStore::new();
        let id = MemoryBlobStore::content_id(b"never stored");
        assert!(matches!(store.download(&id).await, Err(BlobError::BlobNotFound(_))));
    }
}
