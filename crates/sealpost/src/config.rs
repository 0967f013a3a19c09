//! Runtime configuration.
//!
//! Everything network-specific lives here: endpoints, the policy package,
//! the key server set and the threshold. Logic code never embeds them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sealpost_core::Address;
use sealpost_seal::{KeyServerConfig, KeyServerSet};

use crate::error::{Result, SealpostError};
use crate::retry::RetryPolicy;

/// Ledger network the deployment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
    Localnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
            Self::Localnet => "localnet",
        }
    }

    pub fn default_endpoints(&self) -> Endpoints {
        match self {
            Self::Testnet => Endpoints {
                ledger_rpc: "https://fullnode.testnet.sui.io".into(),
                blob_publisher: "https://publisher.walrus-testnet.walrus.space".into(),
                blob_aggregator: "https://aggregator.walrus-testnet.walrus.space".into(),
            },
            Self::Mainnet => Endpoints {
                ledger_rpc: "https://fullnode.mainnet.sui.io".into(),
                blob_publisher: "https://publisher.walrus.space".into(),
                blob_aggregator: "https://aggregator.walrus.space".into(),
            },
            Self::Localnet => Endpoints {
                ledger_rpc: "http://127.0.0.1:9000".into(),
                blob_publisher: "http://127.0.0.1:31415".into(),
                blob_aggregator: "http://127.0.0.1:31415".into(),
            },
        }
    }

    /// Key server object ids of the reference deployment.
    pub fn default_key_server_ids(&self) -> Vec<Address> {
        let ids: &[&str] = match self {
            Self::Testnet => &["0x73d05d62c18d9374e3ea529e8e0ed6161da1a141a94d3f76ae3fe4e99356db75"],
            Self::Mainnet => &["0x0e76e8feff7e0643c47bae6ab8fdc8058969d7531bc858fe64cbac7e692fcc95"],
            Self::Localnet => &[],
        };
        ids.iter().filter_map(|id| Address::from_hex(id).ok()).collect()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SealpostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "mainnet" => Ok(Self::Mainnet),
            "localnet" | "local" => Ok(Self::Localnet),
            other => Err(SealpostError::InvalidInput(format!(
                "unknown network {other:?} (expected testnet, mainnet or localnet)"
            ))),
        }
    }
}

/// Remote endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub ledger_rpc: String,
    pub blob_publisher: String,
    pub blob_aggregator: String,
}

/// Configuration for an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone)]
pub struct SealpostConfig {
    pub network: Network,
    pub endpoints: Endpoints,
    /// Package holding the `sealed_policy` module.
    pub package: Address,
    pub key_servers: KeyServerSet,
    pub session_ttl_min: u64,
    /// Storage duration for new blobs, in store epochs.
    pub storage_epochs: u32,
    pub expiry_days: u64,
    /// Public preview text stored on the policy object.
    pub preview: String,
    /// Record the blob id on the policy after upload.
    pub attach_blob: bool,
    /// Hand the policy to the first recipient after creation.
    pub auto_transfer: bool,
    pub retry: RetryPolicy,
    /// Deadline for each remote call.
    pub call_timeout: Duration,
}

pub const DEFAULT_SESSION_TTL_MIN: u64 = 10;
pub const DEFAULT_STORAGE_EPOCHS: u32 = 1;
pub const DEFAULT_EXPIRY_DAYS: u64 = 30;
pub const DEFAULT_PREVIEW: &str = "A sealed message";

impl SealpostConfig {
    /// Defaults for everything except the deployment itself.
    pub fn new(network: Network, package: Address, key_servers: KeyServerSet) -> Self {
        Self {
            network,
            endpoints: network.default_endpoints(),
            package,
            key_servers,
            session_ttl_min: DEFAULT_SESSION_TTL_MIN,
            storage_epochs: DEFAULT_STORAGE_EPOCHS,
            expiry_days: DEFAULT_EXPIRY_DAYS,
            preview: DEFAULT_PREVIEW.to_string(),
            attach_blob: false,
            auto_transfer: false,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`.
    ///
    /// Variables: `NETWORK`, `PACKAGE_ID`, `LEDGER_RPC_URL`,
    /// `BLOB_PUBLISHER_URL` (or `WALRUS_API_URL`), `BLOB_AGGREGATOR_URL`,
    /// `KEY_SERVERS` (`id@url,...`) or `KEY_SERVER_URL` for the network's
    /// default key server, `SEAL_THRESHOLD` (default: a majority of the
    /// servers), `SESSION_TTL_MINUTES`,
    /// `STORAGE_EPOCHS`, `EXPIRY_DAYS`, `MESSAGE_PREVIEW`, `ATTACH_BLOB`,
    /// `AUTO_TRANSFER`, `CALL_TIMEOUT_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut missing = Vec::new();

        let network = match get("NETWORK") {
            Some(s) => s.parse()?,
            None => Network::default(),
        };

        let package = match get("PACKAGE_ID") {
            Some(s) => Some(parse_address("PACKAGE_ID", &s)?),
            None => {
                missing.push("PACKAGE_ID".to_string());
                None
            }
        };

        let servers = match get("KEY_SERVERS") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| KeyServerConfig::parse(s).map_err(|e| invalid("KEY_SERVERS", e)))
                .collect::<Result<Vec<_>>>()?,
            None => {
                let defaults = network.default_key_server_ids();
                match get("KEY_SERVER_URL") {
                    Some(url) if !defaults.is_empty() => defaults
                        .into_iter()
                        .map(|id| KeyServerConfig::new(id, url.clone()))
                        .collect(),
                    _ => {
                        missing.push("KEY_SERVERS".to_string());
                        Vec::new()
                    }
                }
            }
        };

        if !missing.is_empty() {
            return Err(SealpostError::Configuration { missing });
        }
        let Some(package) = package else {
            return Err(SealpostError::Configuration {
                missing: vec!["PACKAGE_ID".into()],
            });
        };

        // Unset threshold means a strict majority of the listed servers.
        let threshold = parse_or("SEAL_THRESHOLD", get("SEAL_THRESHOLD"), servers.len() / 2 + 1)?;
        let key_servers =
            KeyServerSet::new(servers, threshold).map_err(|e| invalid("KEY_SERVERS", e))?;

        let mut config = Self::new(network, package, key_servers);
        if let Some(url) = get("LEDGER_RPC_URL") {
            config.endpoints.ledger_rpc = url;
        }
        if let Some(url) = get("BLOB_PUBLISHER_URL").or_else(|| get("WALRUS_API_URL")) {
            config.endpoints.blob_publisher = url;
        }
        if let Some(url) = get("BLOB_AGGREGATOR_URL") {
            config.endpoints.blob_aggregator = url;
        }
        config.session_ttl_min =
            parse_or("SESSION_TTL_MINUTES", get("SESSION_TTL_MINUTES"), DEFAULT_SESSION_TTL_MIN)?;
        config.storage_epochs =
            parse_or("STORAGE_EPOCHS", get("STORAGE_EPOCHS"), DEFAULT_STORAGE_EPOCHS)?;
        config.expiry_days = parse_or("EXPIRY_DAYS", get("EXPIRY_DAYS"), DEFAULT_EXPIRY_DAYS)?;
        if let Some(preview) = get("MESSAGE_PREVIEW") {
            config.preview = preview;
        }
        config.attach_blob = parse_flag(get("ATTACH_BLOB"));
        config.auto_transfer = parse_flag(get("AUTO_TRANSFER"));
        let timeout_secs = parse_or("CALL_TIMEOUT_SECS", get("CALL_TIMEOUT_SECS"), 30u64)?;
        config.call_timeout = Duration::from_secs(timeout_secs);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_min == 0 || self.session_ttl_min > sealpost_seal::MAX_SESSION_TTL_MIN {
            return Err(SealpostError::InvalidInput(format!(
                "session ttl must be 1..={} minutes",
                sealpost_seal::MAX_SESSION_TTL_MIN
            )));
        }
        if self.storage_epochs == 0 {
            return Err(SealpostError::InvalidInput("storage epochs must be at least 1".into()));
        }
        if self.expiry_days == 0 {
            return Err(SealpostError::InvalidInput("expiry days must be at least 1".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(SealpostError::InvalidInput("call timeout must be positive".into()));
        }
        Ok(())
    }
}

fn invalid(key: &str, e: impl fmt::Display) -> SealpostError {
    SealpostError::InvalidInput(format!("{key}: {e}"))
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    Address::from_hex(value).map_err(|e| invalid(key, e))
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(v) => v.parse().map_err(|e| invalid(key, e)),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "1" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PKG: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
    const KS: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const KS2: &str = "0x0000000000000000000000000000000000000000000000000000000000000002";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = SealpostConfig::from_lookup(lookup(&[])).unwrap_err();
        match err {
            SealpostError::Configuration { missing } => {
                assert_eq!(missing, vec!["PACKAGE_ID", "KEY_SERVERS"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = SealpostConfig::from_lookup(lookup(&[
            ("PACKAGE_ID", PKG),
            ("KEY_SERVERS", &format!("{KS}@http://ks1")),
        ]))
        .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.endpoints, Network::Testnet.default_endpoints());
        assert_eq!(config.key_servers.threshold(), 1);
        assert_eq!(config.session_ttl_min, 10);
        assert_eq!(config.storage_epochs, 1);
        assert_eq!(config.expiry_days, 30);
        assert!(!config.attach_blob);
        assert!(!config.auto_transfer);
    }

    #[test]
    fn test_overrides() {
        let servers = format!("{KS}@http://ks1, {KS2}@http://ks2");
        let config = SealpostConfig::from_lookup(lookup(&[
            ("NETWORK", "mainnet"),
            ("PACKAGE_ID", PKG),
            ("KEY_SERVERS", &servers),
            ("SEAL_THRESHOLD", "2"),
            ("WALRUS_API_URL", "http://walrus.local"),
            ("STORAGE_EPOCHS", "5"),
            ("AUTO_TRANSFER", "true"),
        ]))
        .unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.key_servers.len(), 2);
        assert_eq!(config.key_servers.threshold(), 2);
        assert_eq!(config.endpoints.blob_publisher, "http://walrus.local");
        assert_eq!(config.endpoints.ledger_rpc, "https://fullnode.mainnet.sui.io");
        assert_eq!(config.storage_epochs, 5);
        assert!(config.auto_transfer);
    }

    #[test]
    fn test_threshold_defaults_to_majority() {
        let three = format!(
            "{KS}@http://ks1,{KS2}@http://ks2,0x{}@http://ks3",
            "03".repeat(32)
        );
        let config = SealpostConfig::from_lookup(lookup(&[
            ("PACKAGE_ID", PKG),
            ("KEY_SERVERS", &three),
        ]))
        .unwrap();
        assert_eq!(config.key_servers.len(), 3);
        assert_eq!(config.key_servers.threshold(), 2);

        let two = format!("{KS}@http://ks1,{KS2}@http://ks2");
        let config = SealpostConfig::from_lookup(lookup(&[
            ("PACKAGE_ID", PKG),
            ("KEY_SERVERS", &two),
        ]))
        .unwrap();
        assert_eq!(config.key_servers.threshold(), 2);

        let explicit = SealpostConfig::from_lookup(lookup(&[
            ("PACKAGE_ID", PKG),
            ("KEY_SERVERS", &three),
            ("SEAL_THRESHOLD", "1"),
        ]))
        .unwrap();
        assert_eq!(explicit.key_servers.threshold(), 1);
    }

    #[test]
    fn test_default_key_server_with_url() {
        let config = SealpostConfig::from_lookup(lookup(&[
            ("PACKAGE_ID", PKG),
            ("KEY_SERVER_URL", "https://seal.local"),
        ]))
        .unwrap();
        let server = &config.key_servers.servers()[0];
        assert_eq!(server.object_id, Network::Testnet.default_key_server_ids()[0]);
        assert_eq!(server.url, "https://seal.local");
    }

    #[test]
    fn test_invalid_values() {
        let ks = format!("{KS}@http://ks1");
        assert!(matches!(
            SealpostConfig::from_lookup(lookup(&[("NETWORK", "devnet")])),
            Err(SealpostError::InvalidInput(_))
        ));
        assert!(matches!(
            SealpostConfig::from_lookup(lookup(&[
                ("PACKAGE_ID", PKG),
                ("KEY_SERVERS", &ks),
                ("SEAL_THRESHOLD", "2"),
            ])),
            Err(SealpostError::InvalidInput(_))
        ));
        assert!(matches!(
            SealpostConfig::from_lookup(lookup(&[
                ("PACKAGE_ID", PKG),
                ("KEY_SERVERS", &ks),
                ("SESSION_TTL_MINUTES", "0"),
            ])),
            Err(SealpostError::InvalidInput(_))
        ));
        assert!(matches!(
            SealpostConfig::from_lookup(lookup(&[("PACKAGE_ID", "0x12"), ("KEY_SERVERS", &ks)])),
            Err(SealpostError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reference_key_server_ids_parse() {
        assert_eq!(Network::Testnet.default_key_server_ids().len(), 1);
        assert_eq!(Network::Mainnet.default_key_server_ids().len(), 1);
        assert!(Network::Localnet.default_key_server_ids().is_empty());
    }
}
