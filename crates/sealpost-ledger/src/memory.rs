//! In-memory ledger.
//!
//! Executes the policy module deterministically in process. Primarily for
//! tests: it has the same observable semantics as a real node for every
//! call sealpost makes, plus knobs to simulate the awkward cases (digest-only
//! submits, missing change lists, version conflicts, a moving clock).

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use sealpost_core::Address;

use crate::error::{LedgerError, Result};
use crate::policy::{
    abort, PolicyModule, FN_ADD_RECIPIENT, FN_ATTACH_BLOB, FN_CREATE_POLICY, FN_SEAL_APPROVE,
    FN_TRANSFER_POLICY, POLICY_MODULE,
};
use crate::rpc::LedgerRpc;
use crate::transaction::{
    DenialReason, ExecutionStatus, LedgerEvent, MoveCall, ObjectChange, OwnedObject,
    PolicyVerdict, SignedTransaction, SubmitOutcome, TransactionDigest, TransactionKind,
    TransactionResponse,
};

/// Milliseconds in one day.
pub const MS_PER_DAY: u64 = 86_400_000;

/// Get current time in milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// On-ledger state of an access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub recipients: Vec<Address>,
    pub preview: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub blob_id: Option<String>,
    pub owner_cap: Address,
}

#[derive(Debug, Clone)]
enum ObjectBody {
    Policy(PolicyRecord),
    OwnerCap { policy: Address },
}

#[derive(Debug, Clone)]
struct LedgerObject {
    object_type: String,
    owner: Address,
    version: u64,
    body: ObjectBody,
}

struct LedgerState {
    now_ms: u64,
    objects: HashMap<Address, LedgerObject>,
    transactions: HashMap<TransactionDigest, TransactionResponse>,
    digest_only: bool,
    omit_object_changes: bool,
    omit_object_fields: bool,
    pending_conflicts: u32,
    submissions: u64,
}

/// A call aborted during execution.
struct Abort {
    code: u64,
    message: String,
}

impl Abort {
    fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Deterministic in-process ledger running one policy package.
pub struct MemoryLedger {
    module: PolicyModule,
    inner: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// A ledger whose clock starts at the current wall time.
    pub fn new(package: Address) -> Self {
        Self::with_time(package, now_millis())
    }

    /// A ledger whose clock starts at `now_ms`.
    pub fn with_time(package: Address, now_ms: u64) -> Self {
        Self {
            module: PolicyModule::new(package),
            inner: RwLock::new(LedgerState {
                now_ms,
                objects: HashMap::new(),
                transactions: HashMap::new(),
                digest_only: false,
                omit_object_changes: false,
                omit_object_fields: false,
                pending_conflicts: 0,
                submissions: 0,
            }),
        }
    }

    pub fn module(&self) -> &PolicyModule {
        &self.module
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Test knobs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn now_ms(&self) -> u64 {
        self.inner.read().await.now_ms
    }

    pub async fn set_time_ms(&self, now_ms: u64) {
        self.inner.write().await.now_ms = now_ms;
    }

    pub async fn advance_clock(&self, by: Duration) {
        let mut inner = self.inner.write().await;
        inner.now_ms = inner.now_ms.saturating_add(by.as_millis() as u64);
    }

    /// When set, submits acknowledge only the digest.
    pub async fn set_digest_only(&self, enabled: bool) {
        self.inner.write().await.digest_only = enabled;
    }

    /// When set, responses carry no object change list.
    pub async fn set_omit_object_changes(&self, enabled: bool) {
        self.inner.write().await.omit_object_changes = enabled;
    }

    /// When set, owned-object queries return ids and types without content.
    pub async fn set_omit_object_fields(&self, enabled: bool) {
        self.inner.write().await.omit_object_fields = enabled;
    }

    /// Fail the next `n` submissions with a version conflict.
    pub async fn inject_version_conflicts(&self, n: u32) {
        self.inner.write().await.pending_conflicts = n;
    }

    /// Number of submit calls seen, including rejected ones.
    pub async fn submission_count(&self) -> u64 {
        self.inner.read().await.submissions
    }

    /// Current state of a policy object.
    pub async fn policy(&self, id: &Address) -> Option<PolicyRecord> {
        let inner = self.inner.read().await;
        match inner.objects.get(id).map(|o| &o.body) {
            Some(ObjectBody::Policy(record)) => Some(record.clone()),
            _ => None,
        }
    }

    /// Current owner of any object.
    pub async fn owner_of(&self, id: &Address) -> Option<Address> {
        self.inner.read().await.objects.get(id).map(|o| o.owner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    fn execute(
        &self,
        state: &mut LedgerState,
        sender: Address,
        kind: &TransactionKind,
        digest: TransactionDigest,
    ) -> TransactionResponse {
        // Calls run against a scratch copy; an abort anywhere discards it.
        let mut objects = state.objects.clone();
        let mut changes = Vec::new();
        let mut events = Vec::new();
        let mut created = 0u64;

        for call in &kind.calls {
            let result = self.execute_call(
                &mut objects,
                state.now_ms,
                sender,
                call,
                digest,
                &mut created,
                &mut changes,
                &mut events,
            );
            if let Err(abort) = result {
                debug!(function = %call.function, code = abort.code, "call aborted");
                return TransactionResponse {
                    digest,
                    status: ExecutionStatus::Aborted {
                        function: call.function.clone(),
                        code: abort.code,
                        message: abort.message,
                    },
                    object_changes: Some(Vec::new()),
                    events: Vec::new(),
                };
            }
        }

        state.objects = objects;
        TransactionResponse {
            digest,
            status: ExecutionStatus::Success,
            object_changes: Some(changes),
            events,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_call(
        &self,
        objects: &mut HashMap<Address, LedgerObject>,
        now_ms: u64,
        sender: Address,
        call: &MoveCall,
        digest: TransactionDigest,
        created: &mut u64,
        changes: &mut Vec<ObjectChange>,
        events: &mut Vec<LedgerEvent>,
    ) -> std::result::Result<(), Abort> {
        if call.package != self.module.package || call.module != POLICY_MODULE {
            return Err(Abort::new(
                abort::E_BAD_ARGUMENTS,
                format!("unknown function {}", call.target()),
            ));
        }

        let args = &call.arguments;
        match call.function.as_str() {
            FN_CREATE_POLICY => {
                let (first, second, preview, days) = match args.as_slice() {
                    [a, b, p, d, _clock] => (
                        a.as_address().copied(),
                        b.as_address().copied(),
                        p.as_text(),
                        d.as_u64(),
                    ),
                    _ => (None, None, None, None),
                };
                let (Some(first), Some(second), Some(preview), Some(days)) =
                    (first, second, preview, days)
                else {
                    return Err(Abort::new(abort::E_BAD_ARGUMENTS, "create_policy_entry arguments"));
                };
                if first == second {
                    return Err(Abort::new(abort::E_DUPLICATE_RECIPIENT, "recipients must differ"));
                }
                if days == 0 {
                    return Err(Abort::new(abort::E_INVALID_EXPIRY, "expiry must be at least one day"));
                }

                let policy_id = derive_object_id(&digest, next(created));
                let cap_id = derive_object_id(&digest, next(created));
                let record = PolicyRecord {
                    recipients: vec![first, second],
                    preview: preview.to_string(),
                    created_at_ms: now_ms,
                    expires_at_ms: now_ms.saturating_add(days.saturating_mul(MS_PER_DAY)),
                    blob_id: None,
                    owner_cap: cap_id,
                };

                objects.insert(
                    policy_id,
                    LedgerObject {
                        object_type: self.module.policy_type(),
                        owner: sender,
                        version: 1,
                        body: ObjectBody::Policy(record),
                    },
                );
                objects.insert(
                    cap_id,
                    LedgerObject {
                        object_type: self.module.owner_cap_type(),
                        owner: sender,
                        version: 1,
                        body: ObjectBody::OwnerCap { policy: policy_id },
                    },
                );

                changes.push(ObjectChange::Created {
                    object_id: policy_id,
                    object_type: self.module.policy_type(),
                    owner: sender,
                    version: 1,
                });
                changes.push(ObjectChange::Created {
                    object_id: cap_id,
                    object_type: self.module.owner_cap_type(),
                    owner: sender,
                    version: 1,
                });
                events.push(LedgerEvent {
                    event_type: format!("{}::{}::PolicyCreated", self.module.package, POLICY_MODULE),
                    data: json!({
                        "policy": policy_id.to_string(),
                        "expiresAtMs": now_ms.saturating_add(days.saturating_mul(MS_PER_DAY)),
                    }),
                });
                Ok(())
            }

            FN_ADD_RECIPIENT => {
                let (policy_id, cap_id, recipient) = owner_call_args(args, |a| a.as_address().copied())?;
                authorize(objects, sender, &policy_id, &cap_id)?;
                let policy = policy_mut(objects, &policy_id)?;
                if policy.recipients.contains(&recipient) {
                    return Err(Abort::new(
                        abort::E_DUPLICATE_RECIPIENT,
                        format!("{recipient} is already a recipient"),
                    ));
                }
                policy.recipients.push(recipient);
                changes.push(bump(objects, &policy_id));
                Ok(())
            }

            FN_TRANSFER_POLICY => {
                let (policy_id, cap_id, new_owner) = owner_call_args(args, |a| a.as_address().copied())?;
                authorize(objects, sender, &policy_id, &cap_id)?;
                for id in [policy_id, cap_id] {
                    if let Some(obj) = objects.get_mut(&id) {
                        obj.owner = new_owner;
                        obj.version += 1;
                        changes.push(ObjectChange::Transferred {
                            object_id: id,
                            object_type: obj.object_type.clone(),
                            recipient: new_owner,
                        });
                    }
                }
                Ok(())
            }

            FN_ATTACH_BLOB => {
                let (policy_id, cap_id, blob_id) =
                    owner_call_args(args, |a| a.as_text().map(str::to_string))?;
                authorize(objects, sender, &policy_id, &cap_id)?;
                policy_mut(objects, &policy_id)?.blob_id = Some(blob_id);
                changes.push(bump(objects, &policy_id));
                Ok(())
            }

            FN_SEAL_APPROVE => match evaluate_approval(objects, now_ms, sender, call) {
                Ok(PolicyVerdict::Approved) => Ok(()),
                Ok(PolicyVerdict::Denied(reason)) => {
                    Err(Abort::new(abort::E_NO_ACCESS, reason.to_string()))
                }
                Err(e) => Err(Abort::new(abort::E_BAD_ARGUMENTS, e.to_string())),
            },

            other => Err(Abort::new(
                abort::E_BAD_ARGUMENTS,
                format!("unknown function {other}"),
            )),
        }
    }
}

fn next(counter: &mut u64) -> u64 {
    let n = *counter;
    *counter += 1;
    n
}

/// Object ids are `blake3(digest ‖ creation index)`.
fn derive_object_id(digest: &TransactionDigest, index: u64) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(digest.as_bytes());
    hasher.update(&index.to_le_bytes());
    Address::from_bytes(*hasher.finalize().as_bytes())
}

/// `(policy, cap, extra)` for the owner-gated calls.
fn owner_call_args<T>(
    args: &[crate::transaction::CallArg],
    extra: impl Fn(&crate::transaction::CallArg) -> Option<T>,
) -> std::result::Result<(Address, Address, T), Abort> {
    match args {
        [p, c, x] => match (p.as_object(), c.as_object(), extra(x)) {
            (Some(p), Some(c), Some(x)) => Ok((*p, *c, x)),
            _ => Err(Abort::new(abort::E_BAD_ARGUMENTS, "argument types")),
        },
        _ => Err(Abort::new(abort::E_BAD_ARGUMENTS, "argument count")),
    }
}

/// The sender must own `cap`, and `cap` must control `policy`.
fn authorize(
    objects: &HashMap<Address, LedgerObject>,
    sender: Address,
    policy: &Address,
    cap: &Address,
) -> std::result::Result<(), Abort> {
    match objects.get(cap) {
        Some(LedgerObject {
            owner,
            body: ObjectBody::OwnerCap { policy: controlled },
            ..
        }) if *owner == sender && controlled == policy => Ok(()),
        Some(_) => Err(Abort::new(
            abort::E_NOT_OWNER,
            "sender does not hold the owner capability for this policy",
        )),
        None => Err(Abort::new(abort::E_NOT_OWNER, format!("no such capability {cap}"))),
    }
}

fn policy_mut<'a>(
    objects: &'a mut HashMap<Address, LedgerObject>,
    id: &Address,
) -> std::result::Result<&'a mut PolicyRecord, Abort> {
    match objects.get_mut(id).map(|o| &mut o.body) {
        Some(ObjectBody::Policy(record)) => Ok(record),
        _ => Err(Abort::new(abort::E_UNKNOWN_OBJECT, format!("no such policy {id}"))),
    }
}

fn bump(objects: &mut HashMap<Address, LedgerObject>, id: &Address) -> ObjectChange {
    let (object_type, version) = match objects.get_mut(id) {
        Some(obj) => {
            obj.version += 1;
            (obj.object_type.clone(), obj.version)
        }
        None => (String::new(), 0),
    };
    ObjectChange::Mutated {
        object_id: *id,
        object_type,
        version,
    }
}

/// The `seal_approve` predicate.
fn evaluate_approval(
    objects: &HashMap<Address, LedgerObject>,
    now_ms: u64,
    sender: Address,
    call: &MoveCall,
) -> Result<PolicyVerdict> {
    let (identifier, policy_id) = match call.arguments.as_slice() {
        [id, policy, _clock] => match (id.as_bytes(), policy.as_object()) {
            (Some(id), Some(policy)) => (id, policy),
            _ => {
                return Err(LedgerError::InvalidTransaction(
                    "seal_approve expects (bytes, policy, clock)".into(),
                ))
            }
        },
        _ => {
            return Err(LedgerError::InvalidTransaction(
                "seal_approve expects three arguments".into(),
            ))
        }
    };

    let policy = match objects.get(policy_id).map(|o| &o.body) {
        Some(ObjectBody::Policy(record)) => record,
        _ => return Ok(PolicyVerdict::Denied(DenialReason::UnknownPolicy)),
    };
    if !identifier.starts_with(policy_id.as_bytes()) {
        return Ok(PolicyVerdict::Denied(DenialReason::BadIdentifier));
    }
    if !policy.recipients.contains(&sender) {
        return Ok(PolicyVerdict::Denied(DenialReason::NotAuthorized));
    }
    if now_ms > policy.expires_at_ms {
        return Ok(PolicyVerdict::Denied(DenialReason::Expired));
    }
    Ok(PolicyVerdict::Approved)
}

#[async_trait]
impl LedgerRpc for MemoryLedger {
    async fn submit_transaction(&self, signed: &SignedTransaction) -> Result<SubmitOutcome> {
        let mut inner = self.inner.write().await;
        inner.submissions += 1;

        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            return Err(LedgerError::VersionConflict(
                "shared object version changed during submission".into(),
            ));
        }

        let tx = signed.verify()?;
        let digest = signed.digest();

        // Replays return the original effects.
        let response = if let Some(existing) = inner.transactions.get(&digest).cloned() {
            existing
        } else {
            let state = &mut *inner;
            let mut response = self.execute(state, tx.sender, &tx.kind, digest);
            if state.omit_object_changes {
                response.object_changes = None;
            }
            state.transactions.insert(digest, response.clone());
            response
        };

        if inner.digest_only {
            Ok(SubmitOutcome::Pending(digest))
        } else {
            Ok(SubmitOutcome::Executed(response))
        }
    }

    async fn wait_for_transaction(&self, digest: &TransactionDigest) -> Result<TransactionResponse> {
        self.inner
            .read()
            .await
            .transactions
            .get(digest)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownTransaction(digest.to_hex()))
    }

    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<OwnedObject>> {
        let inner = self.inner.read().await;
        let mut owned: Vec<OwnedObject> = inner
            .objects
            .iter()
            .filter(|(_, obj)| obj.owner == *owner)
            .filter(|(_, obj)| struct_type.map_or(true, |t| obj.object_type == t))
            .map(|(id, obj)| OwnedObject {
                object_id: *id,
                object_type: obj.object_type.clone(),
                version: obj.version,
                fields: match &obj.body {
                    _ if inner.omit_object_fields => serde_json::Value::Null,
                    ObjectBody::OwnerCap { policy } => json!({ "policy": policy.to_string() }),
                    ObjectBody::Policy(record) => json!({
                        "recipientCount": record.recipients.len(),
                        "expiresAtMs": record.expires_at_ms,
                    }),
                },
            })
            .collect();
        owned.sort_by_key(|o| o.object_id);
        Ok(owned)
    }

    async fn evaluate_policy(&self, kind_bytes: &[u8], sender: &Address) -> Result<PolicyVerdict> {
        let kind = TransactionKind::from_bytes(kind_bytes)?;
        if kind.calls.is_empty() {
            return Err(LedgerError::InvalidTransaction("empty approval request".into()));
        }

        let inner = self.inner.read().await;
        for call in &kind.calls {
            if call.package != self.module.package
                || call.module != POLICY_MODULE
                || call.function != FN_SEAL_APPROVE
            {
                return Err(LedgerError::InvalidTransaction(format!(
                    "approval requests may only call seal_approve, found {}",
                    call.target()
                )));
            }
            let verdict = evaluate_approval(&inner.objects, inner.now_ms, *sender, call)?;
            if !verdict.is_approved() {
                debug!(%sender, ?verdict, "approval denied");
                return Ok(verdict);
            }
        }
        Ok(PolicyVerdict::Approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{CallArg, Transaction};
    use sealpost_core::{Keypair, MessageIdentifier};

    const T0: u64 = 1_700_000_000_000;

    fn package() -> Address {
        Address::from_bytes([0xee; 32])
    }

    async fn submit(ledger: &MemoryLedger, kp: &Keypair, call: MoveCall) -> TransactionResponse {
        let tx = Transaction::new(kp.address(), TransactionKind::single(call));
        let signed = SignedTransaction::sign(&tx, kp).unwrap();
        match ledger.submit_transaction(&signed).await.unwrap() {
            SubmitOutcome::Executed(r) => r,
            SubmitOutcome::Pending(d) => ledger.wait_for_transaction(&d).await.unwrap(),
        }
    }

    async fn create(ledger: &MemoryLedger, owner: &Keypair, a: Address, b: Address) -> (Address, Address) {
        let call = ledger.module().create_policy_call(a, b, "preview", 30);
        let resp = submit(ledger, owner, call).await;
        assert_eq!(resp.status, ExecutionStatus::Success);
        (
            resp.find_created(&ledger.module().policy_type()).unwrap(),
            resp.find_created(&ledger.module().owner_cap_type()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_policy_records_recipients_and_expiry() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        let a = Keypair::from_seed(&[2; 32]).address();
        let b = Keypair::from_seed(&[3; 32]).address();

        let (policy, cap) = create(&ledger, &owner, a, b).await;
        let record = ledger.policy(&policy).await.unwrap();
        assert_eq!(record.recipients, vec![a, b]);
        assert_eq!(record.owner_cap, cap);
        assert_eq!(record.expires_at_ms, T0 + 30 * MS_PER_DAY);
        assert_eq!(ledger.owner_of(&cap).await, Some(owner.address()));
    }

    #[tokio::test]
    async fn test_duplicate_recipients_abort() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        let a = Keypair::from_seed(&[2; 32]).address();

        let call = ledger.module().create_policy_call(a, a, "p", 30);
        let resp = submit(&ledger, &owner, call).await;
        assert!(matches!(
            resp.status,
            ExecutionStatus::Aborted { code: abort::E_DUPLICATE_RECIPIENT, .. }
        ));
        assert_eq!(resp.object_changes, Some(vec![]));
    }

    #[tokio::test]
    async fn test_add_recipient_requires_cap_holder() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        let intruder = Keypair::from_seed(&[9; 32]);
        let a = Keypair::from_seed(&[2; 32]).address();
        let b = Keypair::from_seed(&[3; 32]).address();
        let (policy, cap) = create(&ledger, &owner, a, b).await;

        let call = ledger
            .module()
            .add_recipient_call(policy, cap, intruder.address());
        let resp = submit(&ledger, &intruder, call).await;
        assert!(matches!(
            resp.status,
            ExecutionStatus::Aborted { code: abort::E_NOT_OWNER, .. }
        ));
        assert_eq!(ledger.policy(&policy).await.unwrap().recipients.len(), 2);
    }

    #[tokio::test]
    async fn test_evaluate_policy_reasons() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        let a = Keypair::from_seed(&[2; 32]).address();
        let b = Keypair::from_seed(&[3; 32]).address();
        let c = Keypair::from_seed(&[4; 32]).address();
        let (policy, _cap) = create(&ledger, &owner, a, b).await;

        let id = MessageIdentifier::derive(&policy).unwrap();
        let kind = TransactionKind::single(ledger.module().seal_approve_call(&id, policy));
        let bytes = kind.to_bytes().unwrap();

        assert_eq!(ledger.evaluate_policy(&bytes, &a).await.unwrap(), PolicyVerdict::Approved);
        assert_eq!(
            ledger.evaluate_policy(&bytes, &c).await.unwrap(),
            PolicyVerdict::Denied(DenialReason::NotAuthorized)
        );

        let foreign = MessageIdentifier::derive(&Address::from_bytes([5; 32])).unwrap();
        let kind = TransactionKind::single(ledger.module().seal_approve_call(&foreign, policy));
        assert_eq!(
            ledger.evaluate_policy(&kind.to_bytes().unwrap(), &a).await.unwrap(),
            PolicyVerdict::Denied(DenialReason::BadIdentifier)
        );

        let missing = Address::from_bytes([6; 32]);
        let id = MessageIdentifier::derive(&missing).unwrap();
        let kind = TransactionKind::single(ledger.module().seal_approve_call(&id, missing));
        assert_eq!(
            ledger.evaluate_policy(&kind.to_bytes().unwrap(), &a).await.unwrap(),
            PolicyVerdict::Denied(DenialReason::UnknownPolicy)
        );

        ledger.advance_clock(Duration::from_millis(30 * MS_PER_DAY + 1)).await;
        assert_eq!(
            ledger.evaluate_policy(&bytes, &a).await.unwrap(),
            PolicyVerdict::Denied(DenialReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_evaluate_rejects_non_approval_calls() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let a = Address::from_bytes([2; 32]);
        let kind = TransactionKind::single(ledger.module().create_policy_call(
            a,
            Address::from_bytes([3; 32]),
            "p",
            1,
        ));
        assert!(matches!(
            ledger.evaluate_policy(&kind.to_bytes().unwrap(), &a).await,
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert!(ledger.evaluate_policy(&[0xff, 0x00], &a).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_forged_signature() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let kp = Keypair::from_seed(&[1; 32]);
        let other = Keypair::from_seed(&[2; 32]);
        let tx = Transaction::new(
            kp.address(),
            TransactionKind::single(MoveCall {
                package: package(),
                module: POLICY_MODULE.into(),
                function: FN_CREATE_POLICY.into(),
                arguments: vec![CallArg::U64(1)],
            }),
        );
        let mut signed = SignedTransaction::sign(&tx, &kp).unwrap();
        signed.signature = other.sign_with_key(b"anything");
        assert!(matches!(
            ledger.submit_transaction(&signed).await,
            Err(LedgerError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_digest_only_and_conflicts() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        ledger.set_digest_only(true).await;
        ledger.inject_version_conflicts(1).await;

        let call = ledger.module().create_policy_call(
            Address::from_bytes([2; 32]),
            Address::from_bytes([3; 32]),
            "p",
            1,
        );
        let tx = Transaction::new(owner.address(), TransactionKind::single(call));
        let signed = SignedTransaction::sign(&tx, &owner).unwrap();

        assert!(matches!(
            ledger.submit_transaction(&signed).await,
            Err(LedgerError::VersionConflict(_))
        ));
        let outcome = ledger.submit_transaction(&signed).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Pending(signed.digest()));
        let resp = ledger.wait_for_transaction(&signed.digest()).await.unwrap();
        assert_eq!(resp.status, ExecutionStatus::Success);
        assert_eq!(ledger.submission_count().await, 2);
    }

    #[tokio::test]
    async fn test_owned_objects_filter() {
        let ledger = MemoryLedger::with_time(package(), T0);
        let owner = Keypair::from_seed(&[1; 32]);
        let (policy, cap) = create(
            &ledger,
            &owner,
            Address::from_bytes([2; 32]),
            Address::from_bytes([3; 32]),
        )
        .await;

        let caps = ledger
            .get_owned_objects(&owner.address(), Some(&ledger.module().owner_cap_type()))
            .await
            .unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].object_id, cap);
        assert_eq!(caps[0].fields["policy"], policy.to_string());

        let all = ledger.get_owned_objects(&owner.address(), None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
