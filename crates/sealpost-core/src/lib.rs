//! # Sealpost Core
//!
//! Pure primitives shared by every sealpost crate: ledger addresses,
//! ed25519 identities, canonical encoding, and message identifiers.
//!
//! This crate contains no I/O and no networking.
//!
//! ## Key Types
//!
//! - [`Address`] - Fixed-width ledger address (identities and objects)
//! - [`Keypair`] - An ed25519 identity that can sign challenges and transactions
//! - [`MessageIdentifier`] - The namespaced id an encrypted artifact is keyed to
//! - [`ChallengeSigner`] - Capability interface for anything holding an identity
//!
//! ## Identifiers
//!
//! A [`MessageIdentifier`] is `policy_address ‖ nonce`. The ledger predicate
//! checks the prefix, so an identifier is only usable with the policy it was
//! derived from:
//!
//! ```rust
//! use sealpost_core::{Address, MessageIdentifier};
//!
//! let policy = Address::from_bytes([0x11; 32]);
//! let id = MessageIdentifier::derive(&policy).unwrap();
//! assert!(id.belongs_to(&policy));
//! ```

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod identifier;
pub mod signer;
pub mod types;

pub use canonical::{
    from_canonical_bytes, personal_message_bytes, request_signing_bytes, to_canonical_bytes,
    transaction_signing_bytes, PERSONAL_MESSAGE_DOMAIN, REQUEST_DOMAIN, TRANSACTION_DOMAIN,
};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, SignatureWithKey};
pub use error::{CoreError, Result};
pub use identifier::{MessageIdentifier, NONCE_LENGTH};
pub use signer::ChallengeSigner;
pub use types::{Address, ADDRESS_LENGTH};
