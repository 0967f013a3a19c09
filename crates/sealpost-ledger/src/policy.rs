//! The access-policy client.
//!
//! Access policies live on the ledger in the `sealed_policy` module of a
//! package. Creating one yields two objects: the [`AccessPolicy`] itself
//! and an [`OwnerCap`] that authorizes every later mutation. The approval
//! predicate `seal_approve` is what key servers dry-run before releasing
//! key material.
//!
//! [`AccessPolicy`]: PolicyModule::policy_type
//! [`OwnerCap`]: PolicyModule::owner_cap_type

use std::time::Duration;

use tracing::{debug, info, warn};

use sealpost_core::{Address, Keypair, MessageIdentifier};

use crate::error::{LedgerError, Result};
use crate::rpc::LedgerRpc;
use crate::transaction::{
    CallArg, ExecutionStatus, MoveCall, SignedTransaction, SubmitOutcome, Transaction,
    TransactionDigest, TransactionKind, TransactionResponse,
};

/// Module name inside the policy package.
pub const POLICY_MODULE: &str = "sealed_policy";

/// The ledger's shared clock object.
pub const CLOCK_OBJECT: Address = Address::well_known(6);

pub const FN_CREATE_POLICY: &str = "create_policy_entry";
pub const FN_ADD_RECIPIENT: &str = "add_recipient";
pub const FN_TRANSFER_POLICY: &str = "transfer_policy";
pub const FN_ATTACH_BLOB: &str = "attach_blob";
pub const FN_SEAL_APPROVE: &str = "seal_approve";

/// Abort codes raised by the policy module.
pub mod abort {
    pub const E_NOT_OWNER: u64 = 1;
    pub const E_DUPLICATE_RECIPIENT: u64 = 2;
    pub const E_INVALID_EXPIRY: u64 = 3;
    pub const E_NO_ACCESS: u64 = 4;
    pub const E_UNKNOWN_OBJECT: u64 = 5;
    pub const E_BAD_ARGUMENTS: u64 = 6;
}

/// Names and call builders for one deployment of the policy module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyModule {
    pub package: Address,
}

impl PolicyModule {
    pub const fn new(package: Address) -> Self {
        Self { package }
    }

    fn struct_type(&self, name: &str) -> String {
        format!("{}::{}::{}", self.package, POLICY_MODULE, name)
    }

    /// Fully-qualified type of the policy object.
    pub fn policy_type(&self) -> String {
        self.struct_type("AccessPolicy")
    }

    /// Fully-qualified type of the owner capability.
    pub fn owner_cap_type(&self) -> String {
        self.struct_type("OwnerCap")
    }

    fn call(&self, function: &str, arguments: Vec<CallArg>) -> MoveCall {
        MoveCall {
            package: self.package,
            module: POLICY_MODULE.to_string(),
            function: function.to_string(),
            arguments,
        }
    }

    pub fn create_policy_call(
        &self,
        first: Address,
        second: Address,
        preview: &str,
        expiry_days: u64,
    ) -> MoveCall {
        self.call(
            FN_CREATE_POLICY,
            vec![
                CallArg::Address(first),
                CallArg::Address(second),
                CallArg::Text(preview.to_string()),
                CallArg::U64(expiry_days),
                CallArg::Object(CLOCK_OBJECT),
            ],
        )
    }

    pub fn add_recipient_call(&self, policy: Address, cap: Address, recipient: Address) -> MoveCall {
        self.call(
            FN_ADD_RECIPIENT,
            vec![
                CallArg::Object(policy),
                CallArg::Object(cap),
                CallArg::Address(recipient),
            ],
        )
    }

    pub fn transfer_policy_call(&self, policy: Address, cap: Address, new_owner: Address) -> MoveCall {
        self.call(
            FN_TRANSFER_POLICY,
            vec![
                CallArg::Object(policy),
                CallArg::Object(cap),
                CallArg::Address(new_owner),
            ],
        )
    }

    pub fn attach_blob_call(&self, policy: Address, cap: Address, blob_id: &str) -> MoveCall {
        self.call(
            FN_ATTACH_BLOB,
            vec![
                CallArg::Object(policy),
                CallArg::Object(cap),
                CallArg::Text(blob_id.to_string()),
            ],
        )
    }

    pub fn seal_approve_call(&self, identifier: &MessageIdentifier, policy: Address) -> MoveCall {
        self.call(
            FN_SEAL_APPROVE,
            vec![
                CallArg::Bytes(identifier.as_bytes().to_vec()),
                CallArg::Object(policy),
                CallArg::Object(CLOCK_OBJECT),
            ],
        )
    }
}

/// Retry settings for transactions that touch shared objects.
#[derive(Debug, Clone)]
pub struct PolicyClientConfig {
    /// How many times a version conflict is resubmitted before surfacing.
    pub max_conflict_retries: u32,
    /// Delay before the first resubmission; doubles each time.
    pub conflict_backoff: Duration,
}

impl Default for PolicyClientConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            conflict_backoff: Duration::from_millis(200),
        }
    }
}

/// A freshly created policy and the capability that controls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyHandle {
    pub policy: Address,
    pub owner_cap: Address,
    pub digest: TransactionDigest,
}

/// An unsubmitted approval transaction.
///
/// Only the kind bytes travel to key servers; they dry-run them against
/// the ledger with the session's identity as sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub policy: Address,
    pub identifier: MessageIdentifier,
    pub kind_bytes: Vec<u8>,
}

/// Creates and mutates access policies, and builds approval requests.
pub struct PolicyClient<L> {
    ledger: L,
    module: PolicyModule,
    config: PolicyClientConfig,
}

impl<L: LedgerRpc> PolicyClient<L> {
    pub fn new(ledger: L, module: PolicyModule) -> Self {
        Self::with_config(ledger, module, PolicyClientConfig::default())
    }

    pub fn with_config(ledger: L, module: PolicyModule, config: PolicyClientConfig) -> Self {
        Self {
            ledger,
            module,
            config,
        }
    }

    pub fn module(&self) -> &PolicyModule {
        &self.module
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a policy with its first two recipients.
    ///
    /// Not idempotent: every call creates a new policy.
    pub async fn create_policy(
        &self,
        owner: &Keypair,
        first: Address,
        second: Address,
        preview: &str,
        expiry_days: u64,
    ) -> Result<PolicyHandle> {
        let call = self
            .module
            .create_policy_call(first, second, preview, expiry_days);
        let response = self.execute(owner, call).await?;

        let digest = response.digest;
        if response.object_changes.is_none() {
            return Err(LedgerError::ObjectNotFound {
                expected: "object change list".into(),
                digest: digest.to_hex(),
            });
        }
        let policy = response
            .find_created(&self.module.policy_type())
            .ok_or_else(|| LedgerError::ObjectNotFound {
                expected: self.module.policy_type(),
                digest: digest.to_hex(),
            })?;
        let owner_cap = response
            .find_created(&self.module.owner_cap_type())
            .ok_or_else(|| LedgerError::ObjectNotFound {
                expected: self.module.owner_cap_type(),
                digest: digest.to_hex(),
            })?;

        info!(%policy, %owner_cap, %digest, "access policy created");
        Ok(PolicyHandle {
            policy,
            owner_cap,
            digest,
        })
    }

    /// Append one recipient. The caller must hold `cap`.
    pub async fn add_recipient(
        &self,
        owner: &Keypair,
        policy: Address,
        cap: Address,
        recipient: Address,
    ) -> Result<TransactionDigest> {
        let call = self.module.add_recipient_call(policy, cap, recipient);
        let response = self.execute(owner, call).await?;
        debug!(%policy, %recipient, digest = %response.digest, "recipient added");
        Ok(response.digest)
    }

    /// Append recipients one at a time.
    ///
    /// Each addition waits for finality before the next is submitted, since
    /// all of them rewrite the same recipient set.
    pub async fn add_recipients(
        &self,
        owner: &Keypair,
        policy: Address,
        cap: Address,
        recipients: &[Address],
    ) -> Result<Vec<TransactionDigest>> {
        let mut digests = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            digests.push(self.add_recipient(owner, policy, cap, *recipient).await?);
        }
        if !recipients.is_empty() {
            info!(%policy, count = recipients.len(), "recipients added");
        }
        Ok(digests)
    }

    /// Hand the owner capability to `new_owner`.
    pub async fn transfer_policy(
        &self,
        owner: &Keypair,
        policy: Address,
        cap: Address,
        new_owner: Address,
    ) -> Result<TransactionDigest> {
        let call = self.module.transfer_policy_call(policy, cap, new_owner);
        let response = self.execute(owner, call).await?;
        info!(%policy, %new_owner, "policy ownership transferred");
        Ok(response.digest)
    }

    /// Record the blob holding the policy's live ciphertext.
    pub async fn attach_blob(
        &self,
        owner: &Keypair,
        policy: Address,
        cap: Address,
        blob_id: &str,
    ) -> Result<TransactionDigest> {
        let call = self.module.attach_blob_call(policy, cap, blob_id);
        let response = self.execute(owner, call).await?;
        info!(%policy, blob_id, "blob attached to policy");
        Ok(response.digest)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up the owner capability `owner` holds for `policy`.
    ///
    /// Only a capability whose summary names `policy` counts. Caps the node
    /// reports without content are never guessed at, so the caller sees
    /// `None` and can ask for the cap id explicitly.
    pub async fn find_owner_cap(&self, owner: &Address, policy: &Address) -> Result<Option<Address>> {
        let caps = self
            .ledger
            .get_owned_objects(owner, Some(&self.module.owner_cap_type()))
            .await?;

        let wanted = policy.to_string();
        let found = caps
            .iter()
            .find(|cap| cap.fields.get("policy").and_then(|v| v.as_str()) == Some(wanted.as_str()))
            .map(|cap| cap.object_id);
        if found.is_none() && !caps.is_empty() {
            debug!(%owner, %policy, held = caps.len(), "no owner capability names this policy");
        }
        Ok(found)
    }

    /// Build, but do not submit, the approval transaction for `identifier`.
    pub fn build_approval_request(
        &self,
        identifier: &MessageIdentifier,
        policy: Address,
    ) -> Result<ApprovalRequest> {
        let kind = TransactionKind::single(self.module.seal_approve_call(identifier, policy));
        let kind_bytes = kind.to_bytes()?;
        debug!(%policy, identifier = %identifier, len = kind_bytes.len(), "approval request built");
        Ok(ApprovalRequest {
            policy,
            identifier: identifier.clone(),
            kind_bytes,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign, submit, wait for finality and check the execution status.
    async fn execute(&self, signer: &Keypair, call: MoveCall) -> Result<TransactionResponse> {
        let function = call.function.clone();
        let mut backoff = self.config.conflict_backoff;
        let mut attempt = 0u32;

        let response = loop {
            let tx = Transaction::new(signer.address(), TransactionKind::single(call.clone()));
            let signed = SignedTransaction::sign(&tx, signer)?;

            match self.submit_and_wait(&signed).await {
                Ok(response) => break response,
                Err(LedgerError::VersionConflict(reason))
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        function = %function,
                        attempt,
                        reason = %reason,
                        "version conflict, resubmitting after {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        };

        match &response.status {
            ExecutionStatus::Success => Ok(response),
            ExecutionStatus::Aborted {
                function,
                code,
                message,
            } if *code == abort::E_NOT_OWNER => Err(LedgerError::Unauthorized(format!(
                "{function}: {message}"
            ))),
            ExecutionStatus::Aborted {
                function,
                code,
                message,
            } => Err(LedgerError::Aborted {
                function: function.clone(),
                code: *code,
                message: message.clone(),
            }),
        }
    }

    async fn submit_and_wait(&self, signed: &SignedTransaction) -> Result<TransactionResponse> {
        match self.ledger.submit_transaction(signed).await? {
            SubmitOutcome::Executed(response) => Ok(response),
            SubmitOutcome::Pending(digest) => {
                debug!(%digest, "submit returned digest only, waiting for finality");
                self.ledger.wait_for_transaction(&digest).await
            }
        }
    }
}
