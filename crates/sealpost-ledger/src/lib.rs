//! # Sealpost Ledger
//!
//! The ledger boundary. Access policies live on an external ledger; this
//! crate models the transactions sealpost sends to it, the client that
//! creates and mutates policies, and two implementations of the node
//! interface.
//!
//! ## Key Types
//!
//! - [`LedgerRpc`] - The async trait every ledger backend implements
//! - [`PolicyClient`] - Creates policies, manages recipients, builds approval requests
//! - [`MemoryLedger`] - Deterministic in-process ledger for tests and local runs
//! - [`JsonRpcLedger`] - HTTP JSON-RPC gateway client
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost_core::{Address, Keypair, MessageIdentifier};
//! use sealpost_ledger::{MemoryLedger, PolicyClient, PolicyModule};
//!
//! async fn example() {
//!     let package = Address::from_bytes([0x01; 32]);
//!     let client = PolicyClient::new(MemoryLedger::new(package), PolicyModule::new(package));
//!
//!     let owner = Keypair::generate();
//!     let a = Keypair::generate().address();
//!     let b = Keypair::generate().address();
//!     let handle = client.create_policy(&owner, a, b, "preview", 30).await.unwrap();
//!
//!     let id = MessageIdentifier::derive(&handle.policy).unwrap();
//!     let approval = client.build_approval_request(&id, handle.policy).unwrap();
//!     // hand `approval.kind_bytes` to the key servers
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Finality**: mutations wait for effects; digest-only submits are followed by a wait
//! - **Conflicts**: version conflicts are resubmitted with exponential backoff
//! - **Approval**: approval requests are evaluated by the ledger, never executed

pub mod error;
pub mod jsonrpc;
pub mod memory;
pub mod policy;
pub mod rpc;
pub mod transaction;

pub use error::{LedgerError, Result};
pub use jsonrpc::{JsonRpcConfig, JsonRpcLedger};
pub use memory::{now_millis, MemoryLedger, PolicyRecord, MS_PER_DAY};
pub use policy::{
    ApprovalRequest, PolicyClient, PolicyClientConfig, PolicyHandle, PolicyModule, CLOCK_OBJECT,
    POLICY_MODULE,
};
pub use rpc::LedgerRpc;
pub use transaction::{
    CallArg, DenialReason, ExecutionStatus, LedgerEvent, MoveCall, ObjectChange, OwnedObject,
    PolicyVerdict, SignedTransaction, SubmitOutcome, Transaction, TransactionDigest,
    TransactionKind, TransactionResponse,
};
