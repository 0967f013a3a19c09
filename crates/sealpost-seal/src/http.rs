//! HTTP client for a remote key server.
//!
//! Routes:
//! - `GET  {url}/v1/service` → [`KeyServerInfo`]
//! - `POST {url}/v1/fetch_share` with a [`FetchShareRequest`] → [`FetchShareResponse`]
//!
//! Failures carry a JSON [`ErrorBody`]. 401 means the session was rejected,
//! 403 that the ledger denied the approval. Anything else is treated as the
//! server being unavailable.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SealError};
use crate::keyserver::{
    FetchShareRequest, FetchShareResponse, KeyServer, KeyServerConfig, KeyServerInfo,
};

pub const SERVICE_PATH: &str = "/v1/service";
pub const FETCH_SHARE_PATH: &str = "/v1/fetch_share";

/// Error payload returned by key servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// HTTP status a key server answers with for `err`.
pub fn status_code_for(err: &SealError) -> u16 {
    match err {
        SealError::SessionInvalid(_)
        | SealError::SignatureMismatch
        | SealError::AlreadySigned => 401,
        SealError::AccessDenied(_) => 403,
        SealError::InvalidRequest(_) | SealError::Serialization(_) => 400,
        SealError::Unavailable(_) => 503,
        _ => 500,
    }
}

/// [`KeyServer`] reached over HTTP.
pub struct HttpKeyServer {
    config: KeyServerConfig,
    client: reqwest::Client,
}

impl HttpKeyServer {
    pub fn new(config: KeyServerConfig, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SealError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &KeyServerConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                SealError::Unavailable(format!("{}: malformed response: {e}", self.config.url))
            });
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        match status.as_u16() {
            401 => Err(SealError::SessionInvalid(message)),
            403 => Err(SealError::AccessDenied(message)),
            _ => Err(SealError::Unavailable(format!(
                "{} returned {status}: {message}",
                self.config.url
            ))),
        }
    }
}

#[async_trait]
impl KeyServer for HttpKeyServer {
    async fn info(&self) -> Result<KeyServerInfo> {
        let url = self.endpoint(SERVICE_PATH);
        debug!(%url, "key server info");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SealError::Unavailable(format!("{url}: {e}")))?;
        self.read(response).await
    }

    async fn fetch_share(&self, request: &FetchShareRequest) -> Result<FetchShareResponse> {
        let url = self.endpoint(FETCH_SHARE_PATH);
        debug!(%url, identifier = %request.body.identifier, "fetch share");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SealError::Unavailable(format!("{url}: {e}")))?;
        self.read(response).await
    }
}
