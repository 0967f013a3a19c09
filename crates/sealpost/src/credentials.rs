//! The credentials record.
//!
//! It is the only durable state a send produces. The sender keeps the full
//! record; recipients get a [`CredentialsRecord::reader_copy`] without the
//! owner capability or the backup key. The JSON keys are fixed so records
//! written by older tooling keep loading, including re-upload records that
//! carry `recipientCount` and `note` but no recipient map.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::Path;

use sealpost_blob::BlobId;
use sealpost_core::{Address, MessageIdentifier};

use crate::config::Network;
use crate::error::{Result, SealpostError};

/// Named recipients, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<(String, Address)>);

impl Recipients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named recipient. Names and addresses must both be unique.
    pub fn insert(&mut self, name: impl Into<String>, address: Address) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SealpostError::InvalidInput("recipient name is empty".into()));
        }
        if self.get(&name).is_some() {
            return Err(SealpostError::InvalidInput(format!(
                "recipient {name:?} listed twice"
            )));
        }
        if self.contains_address(&address) {
            return Err(SealpostError::InvalidInput(format!(
                "recipient address {address} listed twice"
            )));
        }
        self.0.push((name, address));
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, address: Address) -> Result<Self> {
        self.insert(name, address)?;
        Ok(self)
    }

    /// Name anonymous addresses `recipient1`, `recipient2`, ...
    pub fn from_addresses(addresses: &[Address]) -> Result<Self> {
        let mut recipients = Self::new();
        for (i, address) in addresses.iter().enumerate() {
            recipients.insert(format!("recipient{}", i + 1), *address)?;
        }
        Ok(recipients)
    }

    /// Parse `name=address`.
    pub fn parse_entry(entry: &str) -> Result<(String, Address)> {
        let (name, address) = entry.split_once('=').ok_or_else(|| {
            SealpostError::InvalidInput(format!("expected name=address, got {entry:?}"))
        })?;
        let address = Address::from_hex(address.trim())
            .map_err(|e| SealpostError::InvalidInput(format!("recipient {name}: {e}")))?;
        Ok((name.trim().to_string(), address))
    }

    pub fn get(&self, name: &str) -> Option<&Address> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.0.iter().any(|(_, a)| a == address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.0.iter().map(|(_, a)| *a).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.0.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Recipients {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, address) in &self.0 {
            map.serialize_entry(name, address)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Recipients {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecipientsVisitor;

        impl<'de> Visitor<'de> for RecipientsVisitor {
            type Value = Recipients;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of recipient name to address")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Recipients, A::Error> {
                let mut recipients = Recipients::new();
                while let Some((name, address)) = access.next_entry::<String, Address>()? {
                    recipients
                        .insert(name, address)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(recipients)
            }
        }

        deserializer.deserialize_map(RecipientsVisitor)
    }
}

/// What a recipient needs to open a message, and what the sender needs to
/// re-upload it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRecord {
    pub network: Network,
    pub package_id: Address,
    /// The access policy object.
    #[serde(rename = "apologyId")]
    pub policy_id: Address,
    /// Owner capability. Absent from reader-only records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_id: Option<Address>,
    #[serde(rename = "documentId")]
    pub identifier: MessageIdentifier,
    #[serde(rename = "walrusBlobId")]
    pub blob_id: BlobId,
    /// Hex content key. Decrypts without key servers or the ledger, so only
    /// the sender's record carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_key: Option<String>,
    #[serde(default)]
    pub recipients: Recipients,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CredentialsRecord {
    /// `created_at + days`.
    pub fn expiry_from(created_at: DateTime<Utc>, days: u64) -> DateTime<Utc> {
        let days = i64::try_from(days).unwrap_or(i64::MAX);
        created_at
            .checked_add_signed(ChronoDuration::try_days(days).unwrap_or(ChronoDuration::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Copy for handing to recipients: no owner capability, no backup key.
    pub fn reader_copy(&self) -> Self {
        Self {
            cap_id: None,
            backup_key: None,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SealpostError::Credentials(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SealpostError::Credentials(e.to_string()))
    }

    /// Write pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SealpostError::Credentials(format!("{}: {e}", parent.display())))?;
        }
        let mut json = self.to_json()?;
        json.push('\n');
        fs::write(path, json)
            .map_err(|e| SealpostError::Credentials(format!("{}: {e}", path.display())))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SealpostError::Credentials(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn sample() -> CredentialsRecord {
        let policy = Address::from_bytes([0x22; 32]);
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        CredentialsRecord {
            network: Network::Testnet,
            package_id: Address::from_bytes([0x11; 32]),
            policy_id: policy,
            cap_id: Some(Address::from_bytes([0x33; 32])),
            identifier: MessageIdentifier::from_parts(&policy, &[7; 16]),
            blob_id: BlobId::new("M4hsZGQ1oCktdzegB6HnI6Mi28S2nqOPHxK-W7_4BUk").unwrap(),
            backup_key: Some("ab".repeat(32)),
            recipients: Recipients::new()
                .with("zed", Address::from_bytes([0x44; 32]))
                .unwrap()
                .with("amy", Address::from_bytes([0x55; 32]))
                .unwrap(),
            recipient_count: None,
            note: None,
            created_at,
            expires_at: CredentialsRecord::expiry_from(created_at, 30),
        }
    }

    #[test]
    fn test_json_keys() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "network",
            "packageId",
            "apologyId",
            "capId",
            "documentId",
            "walrusBlobId",
            "backupKey",
            "recipients",
            "createdAt",
            "expiresAt",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(!obj.contains_key("note"));
        assert_eq!(obj["network"], "testnet");
        assert_eq!(obj["expiresAt"], "2025-03-31T12:00:00Z");
        assert_eq!(
            obj["documentId"].as_str().unwrap(),
            sample().identifier.to_hex()
        );
    }

    #[test]
    fn test_recipient_order_survives_roundtrip() {
        let json = sample().to_json().unwrap();
        assert!(json.find("\"zed\"").unwrap() < json.find("\"amy\"").unwrap());

        let back = CredentialsRecord::from_json(&json).unwrap();
        let names: Vec<_> = back.recipients.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["zed", "amy"]);
        assert_eq!(back, sample());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("credentials.json");
        let record = sample();
        record.save(&path).unwrap();
        assert_eq!(CredentialsRecord::load(&path).unwrap(), record);

        let reader = record.reader_copy();
        assert!(reader.cap_id.is_none());
        assert!(reader.backup_key.is_none());
        reader.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("backupKey"));
        assert!(!raw.contains("capId"));
        let loaded = CredentialsRecord::load(&path).unwrap();
        assert!(loaded.cap_id.is_none());
        assert!(loaded.backup_key.is_none());
        assert_eq!(loaded.recipients, record.recipients);
    }

    #[test]
    fn test_reads_reupload_record_without_recipients() {
        let json = r#"{
  "network": "testnet",
  "packageId": "0x1111111111111111111111111111111111111111111111111111111111111111",
  "apologyId": "0x2222222222222222222222222222222222222222222222222222222222222222",
  "documentId": "222222222222222222222222222222222222222222222222222222222222222207070707070707070707070707070707",
  "walrusBlobId": "M4hsZGQ1oCktdzegB6HnI6Mi28S2nqOPHxK-W7_4BUk",
  "backupKey": "abababababababababababababababababababababababababababababababab",
  "recipientCount": 3,
  "note": "re-uploaded with 5 epochs",
  "createdAt": "2025-03-01T12:00:00Z",
  "expiresAt": "2025-03-31T12:00:00Z"
}"#;
        let record = CredentialsRecord::from_json(json).unwrap();
        assert!(record.recipients.is_empty());
        assert_eq!(record.recipient_count, Some(3));
        assert_eq!(record.note.as_deref(), Some("re-uploaded with 5 epochs"));
        assert_eq!(record.identifier, sample().identifier);
        assert_eq!(record.backup_key, sample().backup_key);
    }

    #[test]
    fn test_load_missing_or_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CredentialsRecord::load(dir.path().join("nope.json")),
            Err(SealpostError::Credentials(_))
        ));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"network\": \"testnet\"}").unwrap();
        assert!(matches!(
            CredentialsRecord::load(&bad),
            Err(SealpostError::Credentials(_))
        ));
    }

    #[test]
    fn test_reads_record_with_legacy_extras() {
        let mut json: serde_json::Value =
            serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        json["recipientCount"] = 2.into();
        json["note"] = "first batch".into();
        let record = CredentialsRecord::from_json(&json.to_string()).unwrap();
        assert_eq!(record.recipient_count, Some(2));
        assert_eq!(record.note.as_deref(), Some("first batch"));
    }

    proptest! {
        #[test]
        fn recipients_keep_insertion_order(
            seeds in prop::collection::hash_set(any::<[u8; 32]>(), 2..8)
        ) {
            let addresses: Vec<Address> = seeds.into_iter().map(Address::from_bytes).collect();
            let mut record = sample();
            record.recipients = Recipients::from_addresses(&addresses).unwrap();

            let back = CredentialsRecord::from_json(&record.to_json().unwrap()).unwrap();
            prop_assert_eq!(back.recipients.addresses(), addresses);
        }

        #[test]
        fn reader_copy_never_serializes_secrets(key in "[0-9a-f]{64}") {
            let mut record = sample();
            record.backup_key = Some(key.clone());
            let json = record.reader_copy().to_json().unwrap();
            prop_assert!(!json.contains(&key));
            prop_assert!(!json.contains("capId"));
        }
    }

    #[test]
    fn test_recipients_reject_duplicates() {
        let a = Address::from_bytes([1; 32]);
        let mut r = Recipients::new();
        r.insert("a", a).unwrap();
        assert!(r.insert("a", Address::from_bytes([2; 32])).is_err());
        assert!(r.insert("b", a).is_err());
        assert!(r.insert(" ", Address::from_bytes([3; 32])).is_err());
    }

    #[test]
    fn test_parse_entry() {
        let a = Address::from_bytes([1; 32]);
        let (name, address) = Recipients::parse_entry(&format!("bl={a}")).unwrap();
        assert_eq!(name, "bl");
        assert_eq!(address, a);
        assert!(Recipients::parse_entry("bl").is_err());
        assert!(Recipients::parse_entry("bl=0x12").is_err());
    }
}
