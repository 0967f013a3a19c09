//! JSON-RPC 2.0 ledger client.
//!
//! Talks to a ledger gateway over HTTP. Byte fields travel as lowercase hex
//! strings; addresses as `0x…` strings.
//!
//! | Method | Params | Result |
//! |---|---|---|
//! | `ledger_executeTransaction` | [`wire::ExecuteParams`] | [`wire::ExecuteResult`] |
//! | `ledger_getTransaction` | [`wire::GetTransactionParams`] | [`TransactionResponse`] |
//! | `ledger_getOwnedObjects` | [`wire::GetOwnedObjectsParams`] | `[OwnedObject]` |
//! | `ledger_dryRunApproval` | [`wire::DryRunApprovalParams`] | [`PolicyVerdict`] |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use sealpost_core::Address;

use crate::error::{LedgerError, Result};
use crate::rpc::LedgerRpc;
use crate::transaction::{
    OwnedObject, PolicyVerdict, SignedTransaction, SubmitOutcome, TransactionDigest,
    TransactionResponse,
};

pub const METHOD_EXECUTE: &str = "ledger_executeTransaction";
pub const METHOD_GET_TRANSACTION: &str = "ledger_getTransaction";
pub const METHOD_GET_OWNED_OBJECTS: &str = "ledger_getOwnedObjects";
pub const METHOD_DRY_RUN_APPROVAL: &str = "ledger_dryRunApproval";

/// Error code the gateway uses for shared-object version conflicts.
pub const VERSION_CONFLICT_CODE: i64 = -32010;
/// Error code for a signature that does not match the sender.
pub const INVALID_SIGNATURE_CODE: i64 = -32011;
/// Error code for an unknown digest.
pub const UNKNOWN_TRANSACTION_CODE: i64 = -32012;
/// Standard JSON-RPC invalid-params code.
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// Request and response bodies of the gateway protocol.
pub mod wire {
    use serde::{Deserialize, Serialize};

    use sealpost_core::{Address, Ed25519PublicKey, Ed25519Signature, SignatureWithKey};

    use crate::error::{LedgerError, Result};
    use crate::transaction::{SignedTransaction, TransactionDigest, TransactionResponse};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RpcRequest<P> {
        pub jsonrpc: String,
        pub id: u64,
        pub method: String,
        pub params: P,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RpcErrorObject {
        pub code: i64,
        pub message: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RpcResponse<R> {
        pub jsonrpc: String,
        pub id: u64,
        // No `default` here: it would demand `R: Default`. A missing
        // `Option` field already reads as `None`.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub result: Option<R>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<RpcErrorObject>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExecuteParams {
        pub tx_bytes: String,
        pub signature: String,
        pub public_key: String,
        /// Ask the node to wait for effects before answering.
        pub wait_for_effects: bool,
    }

    impl ExecuteParams {
        pub fn from_signed(tx: &SignedTransaction, wait_for_effects: bool) -> Self {
            Self {
                tx_bytes: hex::encode(&tx.tx_bytes),
                signature: tx.signature.signature.to_hex(),
                public_key: tx.signature.public_key.to_hex(),
                wait_for_effects,
            }
        }

        pub fn to_signed(&self) -> Result<SignedTransaction> {
            let tx_bytes = hex::decode(&self.tx_bytes)
                .map_err(|e| LedgerError::InvalidTransaction(format!("txBytes: {e}")))?;
            Ok(SignedTransaction {
                tx_bytes,
                signature: SignatureWithKey {
                    signature: Ed25519Signature::from_hex(&self.signature)?,
                    public_key: Ed25519PublicKey::from_hex(&self.public_key)?,
                },
            })
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExecuteResult {
        pub digest: TransactionDigest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub effects: Option<TransactionResponse>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GetTransactionParams {
        pub digest: TransactionDigest,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GetOwnedObjectsParams {
        pub owner: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub struct_type: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DryRunApprovalParams {
        pub kind_bytes: String,
        pub sender: Address,
    }
}

use wire::{
    DryRunApprovalParams, ExecuteParams, ExecuteResult, GetOwnedObjectsParams,
    GetTransactionParams, RpcErrorObject, RpcRequest, RpcResponse,
};

/// Connection settings for a gateway.
#[derive(Debug, Clone)]
pub struct JsonRpcConfig {
    pub url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Whether submits ask the node to wait for effects.
    pub wait_for_effects: bool,
}

impl JsonRpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Duration::from_secs(30),
            wait_for_effects: true,
        }
    }
}

/// [`LedgerRpc`] over HTTP JSON-RPC.
pub struct JsonRpcLedger {
    config: JsonRpcConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(config: JsonRpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        };
        debug!(method, id, url = %self.config.url, "ledger rpc");

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Unavailable(format!("{method}: HTTP {status}")));
        }

        let body: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::MalformedResponse(format!("{method}: {e}")))?;

        if let Some(error) = body.error {
            return Err(map_rpc_error(error));
        }
        body.result
            .ok_or_else(|| LedgerError::MalformedResponse(format!("{method}: missing result")))
    }
}

fn map_rpc_error(error: RpcErrorObject) -> LedgerError {
    match error.code {
        VERSION_CONFLICT_CODE => LedgerError::VersionConflict(error.message),
        INVALID_SIGNATURE_CODE => LedgerError::InvalidSignature,
        UNKNOWN_TRANSACTION_CODE => LedgerError::UnknownTransaction(error.message),
        INVALID_PARAMS_CODE => LedgerError::InvalidTransaction(error.message),
        code => LedgerError::Rpc {
            code,
            message: error.message,
        },
    }
}

/// The JSON-RPC error object a gateway should send for `error`.
pub fn rpc_error_for(error: &LedgerError) -> RpcErrorObject {
    let code = match error {
        LedgerError::VersionConflict(_) => VERSION_CONFLICT_CODE,
        LedgerError::InvalidSignature => INVALID_SIGNATURE_CODE,
        LedgerError::UnknownTransaction(_) => UNKNOWN_TRANSACTION_CODE,
        LedgerError::InvalidTransaction(_) | LedgerError::Core(_) => INVALID_PARAMS_CODE,
        LedgerError::Rpc { code, .. } => *code,
        _ => -32000,
    };
    let message = match error {
        LedgerError::VersionConflict(m)
        | LedgerError::UnknownTransaction(m)
        | LedgerError::InvalidTransaction(m) => m.clone(),
        other => other.to_string(),
    };
    RpcErrorObject { code, message }
}

#[async_trait]
impl LedgerRpc for JsonRpcLedger {
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<SubmitOutcome> {
        let params = ExecuteParams::from_signed(tx, self.config.wait_for_effects);
        let result: ExecuteResult = self.call(METHOD_EXECUTE, params).await?;
        Ok(match result.effects {
            Some(effects) => SubmitOutcome::Executed(effects),
            None => SubmitOutcome::Pending(result.digest),
        })
    }

    async fn wait_for_transaction(&self, digest: &TransactionDigest) -> Result<TransactionResponse> {
        self.call(METHOD_GET_TRANSACTION, GetTransactionParams { digest: *digest })
            .await
    }

    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<OwnedObject>> {
        let params = GetOwnedObjectsParams {
            owner: *owner,
            struct_type: struct_type.map(str::to_string),
        };
        self.call(METHOD_GET_OWNED_OBJECTS, params).await
    }

    async fn evaluate_policy(&self, kind_bytes: &[u8], sender: &Address) -> Result<PolicyVerdict> {
        let params = DryRunApprovalParams {
            kind_bytes: hex::encode(kind_bytes),
            sender: *sender,
        };
        self.call(METHOD_DRY_RUN_APPROVAL, params).await
    }
}
