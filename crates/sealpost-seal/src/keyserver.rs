//! Key server configuration, request types and the `KeyServer` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use sealpost_core::{to_canonical_bytes, Address, Ed25519Signature, MessageIdentifier};

use crate::crypto::X25519PublicKey;
use crate::envelope::WrappedShare;
use crate::error::{Result, SealError};
use crate::session::{SessionCertificate, SessionKey};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Where a key server lives and which on-ledger object identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyServerConfig {
    pub object_id: Address,
    pub url: String,
}

impl KeyServerConfig {
    pub fn new(object_id: Address, url: impl Into<String>) -> Self {
        Self {
            object_id,
            url: url.into(),
        }
    }

    /// Parse `"<object id>@<url>"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (id, url) = s
            .split_once('@')
            .ok_or_else(|| SealError::InvalidConfig(format!("expected id@url, got {s:?}")))?;
        let object_id = Address::from_hex(id.trim())?;
        let url = url.trim();
        if url.is_empty() {
            return Err(SealError::InvalidConfig(format!("key server {id} has no url")));
        }
        Ok(Self::new(object_id, url))
    }
}

/// The key servers a ciphertext is split across, and how many must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyServerSet {
    servers: Vec<KeyServerConfig>,
    threshold: usize,
}

impl KeyServerSet {
    /// Validate `1 ≤ threshold ≤ servers.len()` and unique object ids.
    pub fn new(servers: Vec<KeyServerConfig>, threshold: usize) -> Result<Self> {
        if threshold == 0 || threshold > servers.len() || servers.len() > 255 {
            return Err(SealError::InvalidThreshold {
                threshold,
                total: servers.len(),
            });
        }
        let mut seen = HashSet::new();
        for server in &servers {
            if !seen.insert(server.object_id) {
                return Err(SealError::InvalidConfig(format!(
                    "key server {} listed twice",
                    server.object_id
                )));
            }
        }
        if threshold == 1 || servers.len() == 1 {
            warn!(
                threshold,
                servers = servers.len(),
                "single key server can release every key; use threshold >= 2 across independent operators"
            );
        }
        Ok(Self { servers, threshold })
    }

    pub fn servers(&self) -> &[KeyServerConfig] {
        &self.servers
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn position(&self, object_id: &Address) -> Option<usize> {
        self.servers.iter().position(|s| &s.object_id == object_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// What a key server says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyServerInfo {
    pub object_id: Address,
    pub name: String,
    pub public_key: X25519PublicKey,
}

/// The part of a share request covered by the session-key signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchShareBody {
    pub package: Address,
    pub identifier: MessageIdentifier,
    /// Unsubmitted approval transaction kind, dry-run by the server.
    #[serde(with = "hex_bytes")]
    pub approval_kind_bytes: Vec<u8>,
    pub wrapped_share: WrappedShare,
    /// Fresh client key the released share is re-wrapped to.
    pub response_key: X25519PublicKey,
}

impl FetchShareBody {
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_bytes(self).map_err(|e| SealError::Serialization(e.to_string()))
    }
}

/// A request for one key share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchShareRequest {
    pub certificate: SessionCertificate,
    pub body: FetchShareBody,
    pub request_signature: Ed25519Signature,
}

impl FetchShareRequest {
    /// Build a request signed by `session`.
    pub fn signed(session: &SessionKey, body: FetchShareBody) -> Result<Self> {
        let certificate = session.certificate()?;
        let request_signature = session.sign_request(&body.signing_bytes()?)?;
        Ok(Self {
            certificate,
            body,
            request_signature,
        })
    }
}

/// A released share, wrapped to the request's response key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchShareResponse {
    pub share: WrappedShare,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A threshold key server.
///
/// Servers hold no policy logic of their own. They release a share only if
/// the ledger approves the request's approval transaction for the session's
/// identity.
#[async_trait]
pub trait KeyServer: Send + Sync {
    async fn info(&self) -> Result<KeyServerInfo>;

    /// Errors: `SessionInvalid` for bad certificates or request signatures,
    /// `AccessDenied` when the ledger rejects the approval, `Unavailable`
    /// when the server or its ledger cannot be reached.
    async fn fetch_share(&self, request: &FetchShareRequest) -> Result<FetchShareResponse>;
}

#[async_trait]
impl<T: KeyServer + ?Sized> KeyServer for Arc<T> {
    async fn info(&self) -> Result<KeyServerInfo> {
        (**self).info().await
    }

    async fn fetch_share(&self, request: &FetchShareRequest) -> Result<FetchShareResponse> {
        (**self).fetch_share(request).await
    }
}
