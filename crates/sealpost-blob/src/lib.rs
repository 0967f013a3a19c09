//! # Sealpost Blob
//!
//! Storage for sealed ciphertexts.
//!
//! ## Key Types
//!
//! - [`BlobStore`]: upload / download trait
//! - [`WalrusClient`]: publisher + aggregator over HTTP
//! - [`MemoryBlobStore`]: in-process store for tests
//! - [`PublisherResponse`]: both publisher answer shapes, normalized by
//!   [`PublisherResponse::receipt`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use sealpost_blob::{BlobStore, WalrusClient, WalrusConfig};
//!
//! # async fn example() -> sealpost_blob::Result<()> {
//! let store = WalrusClient::new(WalrusConfig::new(
//!     "https://publisher.walrus-testnet.walrus.space",
//!     "https://aggregator.walrus-testnet.walrus.space",
//! ))?;
//! let receipt = store.upload(Bytes::from_static(b"ciphertext"), 1).await?;
//! let bytes = store.download(&receipt.blob_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! Storage is bought per epoch. A short duration is cheap but recipients
//! who come late get `BlobNotFound`; re-upload from the credentials record.

pub mod error;
pub mod memory;
pub mod store;
pub mod types;
pub mod walrus;

pub use error::{BlobError, Result};
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
pub use types::{BlobId, PublisherResponse, UploadOutcome, UploadReceipt};
pub use walrus::{WalrusClient, WalrusConfig};
