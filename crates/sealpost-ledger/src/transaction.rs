//! Transaction model.
//!
//! A transaction is a list of calls into on-ledger modules, made by one
//! sender. Transactions are encoded canonically (CBOR) before signing; the
//! digest is the Blake3 hash of those bytes.
//!
//! The "kind" of a transaction is its call list alone, without sender or
//! nonce. Approval requests carry only kind bytes: they are evaluated,
//! never executed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use sealpost_core::{
    from_canonical_bytes, to_canonical_bytes, transaction_signing_bytes, Address, Keypair,
    SignatureWithKey,
};

use crate::error::{LedgerError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Digest
// ─────────────────────────────────────────────────────────────────────────────

/// Blake3 hash of a transaction's canonical bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionDigest(pub [u8; 32]);

impl TransactionDigest {
    pub fn of(tx_bytes: &[u8]) -> Self {
        Self(*blake3::hash(tx_bytes).as_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| LedgerError::MalformedResponse(format!("digest: {e}")))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::MalformedResponse("digest must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TransactionDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransactionDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TransactionDigest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Calls
// ─────────────────────────────────────────────────────────────────────────────

/// A single argument to a module call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// A plain address value (e.g. a recipient identity).
    Address(Address),
    Text(String),
    U64(u64),
    Bytes(Vec<u8>),
    /// A reference to a ledger object by id.
    Object(Address),
}

impl CallArg {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Self::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Address> {
        match self {
            Self::Object(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A call into `package::module::function`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: Address,
    pub module: String,
    pub function: String,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    /// `package::module::function`, as shown in logs and abort messages.
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

/// The call list of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionKind {
    pub calls: Vec<MoveCall>,
}

impl TransactionKind {
    pub fn single(call: MoveCall) -> Self {
        Self { calls: vec![call] }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_canonical_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_canonical_bytes(bytes)
            .map_err(|e| LedgerError::InvalidTransaction(format!("kind bytes: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub kind: TransactionKind,
    /// Distinguishes otherwise identical transactions from one sender.
    pub nonce: u64,
}

impl Transaction {
    /// Build a transaction with a fresh random nonce.
    pub fn new(sender: Address, kind: TransactionKind) -> Self {
        Self {
            sender,
            kind,
            nonce: rand::random(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_canonical_bytes(self)?)
    }

    pub fn digest(&self) -> Result<TransactionDigest> {
        Ok(TransactionDigest::of(&self.to_bytes()?))
    }
}

/// Transaction bytes plus the sender's signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx_bytes: Vec<u8>,
    pub signature: SignatureWithKey,
}

impl SignedTransaction {
    /// Encode and sign `tx` with `keypair`.
    ///
    /// The keypair must control `tx.sender`.
    pub fn sign(tx: &Transaction, keypair: &Keypair) -> Result<Self> {
        if keypair.address() != tx.sender {
            return Err(LedgerError::InvalidSignature);
        }
        let tx_bytes = tx.to_bytes()?;
        let signature = keypair.sign_with_key(&transaction_signing_bytes(&tx_bytes));
        Ok(Self {
            tx_bytes,
            signature,
        })
    }

    pub fn digest(&self) -> TransactionDigest {
        TransactionDigest::of(&self.tx_bytes)
    }

    /// Decode the transaction and check the signature belongs to its sender.
    pub fn verify(&self) -> Result<Transaction> {
        let tx: Transaction = from_canonical_bytes(&self.tx_bytes)
            .map_err(|e| LedgerError::InvalidTransaction(e.to_string()))?;
        self.signature
            .verify_from(&tx.sender, &transaction_signing_bytes(&self.tx_bytes))
            .map_err(|_| LedgerError::InvalidSignature)?;
        Ok(tx)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionStatus {
    Success,
    /// A module call aborted. No state changed.
    Aborted {
        function: String,
        code: u64,
        message: String,
    },
}

/// One entry of a transaction's object-change list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Created {
        object_id: Address,
        object_type: String,
        owner: Address,
        version: u64,
    },
    #[serde(rename_all = "camelCase")]
    Mutated {
        object_id: Address,
        object_type: String,
        version: u64,
    },
    #[serde(rename_all = "camelCase")]
    Transferred {
        object_id: Address,
        object_type: String,
        recipient: Address,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        object_id: Address,
        object_type: String,
    },
}

impl ObjectChange {
    pub fn object_id(&self) -> &Address {
        match self {
            Self::Created { object_id, .. }
            | Self::Mutated { object_id, .. }
            | Self::Transferred { object_id, .. }
            | Self::Deleted { object_id, .. } => object_id,
        }
    }

    pub fn object_type(&self) -> &str {
        match self {
            Self::Created { object_type, .. }
            | Self::Mutated { object_type, .. }
            | Self::Transferred { object_type, .. }
            | Self::Deleted { object_type, .. } => object_type,
        }
    }
}

/// An event emitted by a module during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Everything the ledger reports about an executed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub digest: TransactionDigest,
    pub status: ExecutionStatus,
    /// Absent when the node was asked for effects only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_changes: Option<Vec<ObjectChange>>,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
}

impl TransactionResponse {
    /// Id of the first object of `object_type` this transaction created.
    pub fn find_created(&self, object_type: &str) -> Option<Address> {
        self.object_changes.as_ref()?.iter().find_map(|change| match change {
            ObjectChange::Created {
                object_id,
                object_type: ty,
                ..
            } if ty == object_type => Some(*object_id),
            _ => None,
        })
    }
}

/// What a submit call returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The node waited for execution.
    Executed(TransactionResponse),
    /// The node only acknowledged the digest; wait for it.
    Pending(TransactionDigest),
}

/// Summary of an object owned by an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedObject {
    pub object_id: Address,
    pub object_type: String,
    pub version: u64,
    /// Selected public fields of the object, when the node reports them.
    #[serde(default)]
    pub fields: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy evaluation
// ─────────────────────────────────────────────────────────────────────────────

/// Why the approval predicate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DenialReason {
    /// The sender is not on the recipient list.
    NotAuthorized,
    /// The access window has closed.
    Expired,
    /// The identifier is not in the policy's namespace.
    BadIdentifier,
    /// The referenced policy object does not exist.
    UnknownPolicy,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotAuthorized => "sender is not an allowed recipient",
            Self::Expired => "access window has closed",
            Self::BadIdentifier => "identifier is outside the policy namespace",
            Self::UnknownPolicy => "policy object does not exist",
        };
        f.write_str(s)
    }
}

/// Result of dry-running an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "camelCase")]
pub enum PolicyVerdict {
    Approved,
    Denied(DenialReason),
}

impl PolicyVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}
