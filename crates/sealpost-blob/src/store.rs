//! The `BlobStore` trait.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{BlobId, UploadReceipt};

/// Content-addressed storage for ciphertexts.
///
/// Storage is bought for a number of store epochs. A blob whose storage has
/// lapsed downloads as `BlobNotFound`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` for `epochs` epochs.
    ///
    /// Uploading bytes the store already holds is a success, reported as
    /// [`UploadOutcome::AlreadyCertified`](crate::UploadOutcome::AlreadyCertified).
    async fn upload(&self, data: Bytes, epochs: u32) -> Result<UploadReceipt>;

    async fn download(&self, blob_id: &BlobId) -> Result<Bytes>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn upload(&self, data: Bytes, epochs: u32) -> Result<UploadReceipt> {
        (**self).upload(data, epochs).await
    }

    async fn download(&self, blob_id: &BlobId) -> Result<Bytes> {
        (**self).download(blob_id).await
    }
}
