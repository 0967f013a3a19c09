//! # Sealpost
//!
//! Ledger-gated sealed messages.
//!
//! ## Overview
//!
//! A sender registers an access policy on a ledger, encrypts a message to
//! an identifier namespaced under that policy, and stores the ciphertext in
//! a content-addressed blob store. A reader proves who they are with a
//! signed session; key servers release their key shares only when the
//! ledger's policy predicate accepts the reader.
//!
//! - **Policy**: recipients and an expiry, held on the ledger
//! - **Identifier**: `policy address ‖ nonce`, fixed once per message
//! - **Session**: short-lived key bound to the reader's signature
//! - **Credentials record**: the JSON file handed to recipients
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost::{OpenRequest, Orchestrator, Recipients, SealpostConfig};
//! use sealpost::blob::WalrusClient;
//! use sealpost::core::Keypair;
//! use sealpost::ledger::JsonRpcLedger;
//! use sealpost::seal::HttpKeyServer;
//!
//! async fn example(
//!     orchestrator: Orchestrator<JsonRpcLedger, HttpKeyServer, WalrusClient>,
//!     sender: Keypair,
//!     alice: Keypair,
//!     bob: Keypair,
//! ) -> sealpost::Result<()> {
//!     let recipients = Recipients::new()
//!         .with("alice", alice.address())?
//!         .with("bob", bob.address())?;
//!     let record = orchestrator
//!         .create_and_seal(&sender, b"hello", &recipients, 30)
//!         .await?;
//!     record.save("output/credentials.json")?;
//!
//!     let plaintext = orchestrator.open(&alice, &OpenRequest::from(&record)).await?;
//!     assert_eq!(plaintext, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sealpost::core` - Addresses, identifiers, signing keys
//! - `sealpost::ledger` - Policy client and ledger backends
//! - `sealpost::seal` - Threshold encryption, sessions, key servers
//! - `sealpost::blob` - Blob store adapters
//!
//! ## Design Notes
//!
//! - Creation is not transactional. A failure after the policy exists
//!   returns [`SealpostError::Create`] with the policy address set.
//! - Re-uploads reuse the stored identifier; it is never derived twice for
//!   one message.

pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod retry;

// Re-export component crates
pub use sealpost_blob as blob;
pub use sealpost_core as core;
pub use sealpost_ledger as ledger;
pub use sealpost_seal as seal;

// Re-export main types for convenience
pub use config::{Endpoints, Network, SealpostConfig};
pub use credentials::{CredentialsRecord, Recipients};
pub use error::{CreateStage, DecryptStage, ErrorKind, Result, SealpostError, StepError};
pub use orchestrator::{OpenRequest, Orchestrator, SealTarget};
pub use retry::RetryPolicy;

pub use sealpost_core::{Address, ChallengeSigner, Keypair, MessageIdentifier};
