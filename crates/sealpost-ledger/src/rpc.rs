//! The ledger boundary.
//!
//! The ledger itself (consensus, execution, storage) is an external service.
//! This trait is the whole of what sealpost needs from it. Implementations
//! include a JSON-RPC gateway client and an in-memory ledger for tests.

use async_trait::async_trait;

use sealpost_core::Address;

use crate::error::Result;
use crate::transaction::{
    OwnedObject, PolicyVerdict, SignedTransaction, SubmitOutcome, TransactionDigest,
    TransactionResponse,
};

/// Async interface to a ledger node.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a signed transaction for execution.
    ///
    /// Nodes may answer with the full effects or just the digest; in the
    /// latter case callers follow up with [`wait_for_transaction`].
    ///
    /// [`wait_for_transaction`]: LedgerRpc::wait_for_transaction
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<SubmitOutcome>;

    /// Block until `digest` is final and return its effects.
    async fn wait_for_transaction(&self, digest: &TransactionDigest)
        -> Result<TransactionResponse>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Objects owned by `owner`, optionally filtered by exact struct type.
    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<OwnedObject>>;

    /// Dry-run an approval request: evaluate `kind_bytes` as if `sender`
    /// had signed it, against current ledger state, without executing.
    async fn evaluate_policy(&self, kind_bytes: &[u8], sender: &Address)
        -> Result<PolicyVerdict>;
}

#[async_trait]
impl<T: LedgerRpc + ?Sized> LedgerRpc for std::sync::Arc<T> {
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<SubmitOutcome> {
        (**self).submit_transaction(tx).await
    }

    async fn wait_for_transaction(
        &self,
        digest: &TransactionDigest,
    ) -> Result<TransactionResponse> {
        (**self).wait_for_transaction(digest).await
    }

    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<OwnedObject>> {
        (**self).get_owned_objects(owner, struct_type).await
    }

    async fn evaluate_policy(
        &self,
        kind_bytes: &[u8],
        sender: &Address,
    ) -> Result<PolicyVerdict> {
        (**self).evaluate_policy(kind_bytes, sender).await
    }
}
