//! # Sealpost Testkit
//!
//! Testing utilities for sealpost.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-process network (ledger, key servers, blob store)
//!   wired into an [`Orchestrator`](sealpost::Orchestrator)
//! - **Parties**: deterministic keypairs for multi-party scenarios
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sealpost_testkit::{parties, recipients_of, TestNetwork};
//!
//! # async fn example() {
//! let net = TestNetwork::new();
//! let p = parties(3);
//! let record = net
//!     .orchestrator
//!     .create_and_seal(&p[0].keypair, b"hello", &recipients_of(&[&p[1], &p[2]]), 30)
//!     .await
//!     .unwrap();
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealpost_testkit::generators::address;
//! use sealpost_core::MessageIdentifier;
//!
//! proptest! {
//!     #[test]
//!     fn identifier_starts_with_policy(policy in address()) {
//!         let id = MessageIdentifier::derive(&policy).unwrap();
//!         prop_assert!(id.belongs_to(&policy));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    parties, recipients_of, test_config, Party, TestKeyServer, TestNetwork, TestOrchestrator,
    TEST_PACKAGE,
};
