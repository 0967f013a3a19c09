//! HTTP publisher/aggregator client.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{BlobError, Result};
use crate::store::BlobStore;
use crate::types::{BlobId, PublisherResponse, UploadReceipt};

/// Endpoints and limits for [`WalrusClient`].
#[derive(Debug, Clone)]
pub struct WalrusConfig {
    /// Accepts `PUT /v1/blobs?epochs=N`.
    pub publisher_url: String,
    /// Serves `GET /v1/blobs/{id}`.
    pub aggregator_url: String,
    pub request_timeout: Duration,
}

impl WalrusConfig {
    pub fn new(publisher_url: impl Into<String>, aggregator_url: impl Into<String>) -> Self {
        Self {
            publisher_url: publisher_url.into(),
            aggregator_url: aggregator_url.into(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// [`BlobStore`] over the publisher and aggregator HTTP APIs.
pub struct WalrusClient {
    config: WalrusConfig,
    client: reqwest::Client,
}

impl WalrusClient {
    pub fn new(config: WalrusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(BlobError::transport)?;
        Ok(Self { config, client })
    }

    /// Public download link for `blob_id`.
    pub fn blob_url(&self, blob_id: &BlobId) -> String {
        format!(
            "{}/v1/blobs/{}",
            self.config.aggregator_url.trim_end_matches('/'),
            blob_id
        )
    }

    fn upload_url(&self, epochs: u32) -> String {
        format!(
            "{}/v1/blobs?epochs={epochs}",
            self.config.publisher_url.trim_end_matches('/')
        )
    }
}

fn unavailable(status: reqwest::StatusCode, what: &str) -> BlobError {
    BlobError::StoreUnavailable {
        status: Some(status.as_u16()),
        message: format!("{what}: {status}"),
    }
}

#[async_trait]
impl BlobStore for WalrusClient {
    async fn upload(&self, data: Bytes, epochs: u32) -> Result<UploadReceipt> {
        if epochs == 0 {
            return Err(BlobError::InvalidEpochs);
        }
        let url = self.upload_url(epochs);
        let len = data.len();
        debug!(%url, len, "uploading blob");

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(BlobError::transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(status, "upload"));
        }
        let body = response.bytes().await.map_err(BlobError::transport)?;
        let receipt = PublisherResponse::from_json(&body)?.receipt()?;
        info!(blob_id = %receipt.blob_id, outcome = ?receipt.outcome, len, epochs, "blob stored");
        Ok(receipt)
    }

    async fn download(&self, blob_id: &BlobId) -> Result<Bytes> {
        let url = self.blob_url(blob_id);
        debug!(%url, "downloading blob");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(BlobError::transport)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::BlobNotFound(blob_id.to_string()));
        }
        if !status.is_success() {
            return Err(unavailable(status, "download"));
        }
        response.bytes().await.map_err(BlobError::transport)
    }
}
