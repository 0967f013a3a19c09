//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use sealpost::{Network, Orchestrator, Recipients, RetryPolicy, SealpostConfig};
use sealpost_blob::MemoryBlobStore;
use sealpost_core::{Address, Keypair};
use sealpost_ledger::MemoryLedger;
use sealpost_seal::{KeyServerConfig, KeyServerSet, LocalKeyServer, X25519StaticSecret};

/// Package id the in-process ledger runs.
pub const TEST_PACKAGE: Address = Address::from_bytes([0x5e; 32]);

pub type TestKeyServer = Arc<LocalKeyServer<Arc<MemoryLedger>>>;
pub type TestOrchestrator = Orchestrator<Arc<MemoryLedger>, TestKeyServer, Arc<MemoryBlobStore>>;

/// Configuration tuned for tests: short backoff and deadlines.
pub fn test_config(key_servers: KeyServerSet) -> SealpostConfig {
    let mut config = SealpostConfig::new(Network::Localnet, TEST_PACKAGE, key_servers);
    config.retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    };
    config.call_timeout = Duration::from_secs(5);
    config
}

/// A ledger, key servers and a blob store, all in process.
pub struct TestNetwork {
    pub ledger: Arc<MemoryLedger>,
    pub key_servers: Vec<TestKeyServer>,
    pub blobs: Arc<MemoryBlobStore>,
    pub orchestrator: TestOrchestrator,
}

impl TestNetwork {
    /// Two-of-three key servers.
    pub fn new() -> Self {
        Self::with_threshold(3, 2)
    }

    /// `threshold`-of-`total` key servers.
    pub fn with_threshold(total: u8, threshold: usize) -> Self {
        Self::with_config(total, threshold, |_| {})
    }

    /// Like [`with_threshold`](Self::with_threshold), letting the caller
    /// adjust the configuration first.
    pub fn with_config(total: u8, threshold: usize, adjust: impl FnOnce(&mut SealpostConfig)) -> Self {
        let ledger = Arc::new(MemoryLedger::new(TEST_PACKAGE));
        let blobs = Arc::new(MemoryBlobStore::new());
        let key_servers: Vec<TestKeyServer> = (1..=total)
            .map(|i| {
                Arc::new(LocalKeyServer::new(
                    Address::from_bytes([i; 32]),
                    format!("ks-{i}"),
                    X25519StaticSecret::from_bytes([i.wrapping_add(100); 32]),
                    ledger.clone(),
                ))
            })
            .collect();

        let set = KeyServerSet::new(
            key_servers
                .iter()
                .map(|s| KeyServerConfig::new(*s.object_id(), "local"))
                .collect(),
            threshold,
        )
        .expect("valid key server set");
        let mut config = test_config(set);
        adjust(&mut config);

        let orchestrator =
            Orchestrator::new(config, ledger.clone(), key_servers.clone(), blobs.clone())
                .expect("valid orchestrator");
        Self {
            ledger,
            key_servers,
            blobs,
            orchestrator,
        }
    }

    /// Take the first `n` key servers offline.
    pub fn take_offline(&self, n: usize) {
        for server in self.key_servers.iter().take(n) {
            server.set_online(false);
        }
    }

    /// Shares released across all key servers.
    pub fn released_shares(&self) -> usize {
        self.key_servers.iter().map(|s| s.released_count()).sum()
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// A named participant with a deterministic key.
pub struct Party {
    pub name: String,
    pub keypair: Keypair,
}

impl Party {
    pub fn with_seed(name: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            name: name.into(),
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }
}

/// Create parties `party0`, `party1`, ... with distinct seeds.
pub fn parties(count: usize) -> Vec<Party> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0xa5;
            Party::with_seed(format!("party{i}"), seed)
        })
        .collect()
}

/// Recipients named after the parties, in order.
pub fn recipients_of(parties: &[&Party]) -> Recipients {
    let mut recipients = Recipients::new();
    for party in parties {
        recipients
            .insert(party.name.clone(), party.address())
            .expect("distinct parties");
    }
    recipients
}
