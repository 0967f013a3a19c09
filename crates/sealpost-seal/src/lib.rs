//! # Sealpost Seal
//!
//! Threshold encryption gated by a ledger predicate.
//!
//! A payload is encrypted under a random content key. The key is split with
//! Shamir sharing across a [`KeyServerSet`], one share wrapped to each
//! server. To decrypt, a reader presents a signed [`SessionKey`] and an
//! unsubmitted approval transaction; each server dry-runs the approval on
//! the ledger and releases its share only if the policy says yes.
//!
//! ## Key Types
//!
//! - [`ThresholdClient`]: `encrypt` / `decrypt` against a key server set
//! - [`SessionKey`]: the mint → sign → bind handshake
//! - [`KeyServer`]: trait implemented by [`LocalKeyServer`] and [`HttpKeyServer`]
//! - [`EncryptedObject`]: the envelope that gets stored
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost_seal::{SessionKey, ThresholdClient, HttpKeyServer};
//! # async fn example(
//! #     client: ThresholdClient<HttpKeyServer>,
//! #     reader: sealpost_core::Keypair,
//! #     package: sealpost_core::Address,
//! #     id: sealpost_core::MessageIdentifier,
//! #     approval: Vec<u8>,
//! # ) -> sealpost_seal::Result<()> {
//! let sealed = client.encrypt(package, &id, b"hello").await?;
//!
//! let mut session = SessionKey::mint(reader.address(), package, 10)?;
//! session.sign_with(&reader).await?;
//! let plaintext = client.decrypt(&sealed.ciphertext, &mut session, &approval).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! - Servers hold no policy logic; the ledger predicate decides.
//! - `threshold == 1` works but one compromised server releases everything.
//!   [`KeyServerSet::new`] warns about it.
//! - The backup key returned by `encrypt` bypasses servers and ledger alike.

pub mod client;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod http;
pub mod keyserver;
pub mod local;
pub mod session;
pub mod shares;

pub use client::{decrypt_with_backup_key, EncryptOutput, ThresholdClient};
pub use crypto::{AeadNonce, ContentKey, X25519PublicKey, X25519StaticSecret};
pub use envelope::{EncryptedObject, WrappedShare, ENVELOPE_VERSION};
pub use error::{Result, SealError};
pub use http::{status_code_for, ErrorBody, HttpKeyServer};
pub use keyserver::{
    FetchShareBody, FetchShareRequest, FetchShareResponse, KeyServer, KeyServerConfig,
    KeyServerInfo, KeyServerSet,
};
pub use local::LocalKeyServer;
pub use session::{SessionCertificate, SessionKey, SessionState, MAX_SESSION_TTL_MIN};
pub use shares::{combine_shares, split_secret, Share, ShareId};
