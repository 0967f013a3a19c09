//! Message identifiers.
//!
//! An identifier is the byte string an encrypted artifact is keyed to. Its
//! first [`ADDRESS_LENGTH`] bytes are the address of the access policy that
//! governs it; the ledger predicate refuses any identifier outside that
//! namespace. The remaining [`NONCE_LENGTH`] bytes are fresh randomness so
//! every message under one policy gets its own key.
//!
//! Identifiers are generated once, at first encryption. Re-encrypting the
//! same logical message must reuse the stored identifier.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{Address, ADDRESS_LENGTH};

/// Width of the random suffix.
pub const NONCE_LENGTH: usize = 16;

/// `policy_address ‖ nonce`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageIdentifier(Vec<u8>);

impl MessageIdentifier {
    /// Derive a fresh identifier in `policy`'s namespace.
    ///
    /// Draws [`NONCE_LENGTH`] bytes from the OS random source. Failure to
    /// obtain entropy is reported as [`CoreError::Entropy`] and must not be
    /// retried.
    pub fn derive(policy: &Address) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CoreError::Entropy(e.to_string()))?;
        Ok(Self::from_parts(policy, &nonce))
    }

    /// Assemble from a policy address and an explicit nonce.
    pub fn from_parts(policy: &Address, nonce: &[u8; NONCE_LENGTH]) -> Self {
        let mut bytes = Vec::with_capacity(ADDRESS_LENGTH + NONCE_LENGTH);
        bytes.extend_from_slice(policy.as_bytes());
        bytes.extend_from_slice(nonce);
        Self(bytes)
    }

    /// Wrap existing bytes (e.g. read back from a credentials file).
    ///
    /// Anything that cannot hold a full address prefix plus at least one
    /// byte of suffix is rejected.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() <= ADDRESS_LENGTH {
            return Err(CoreError::InvalidIdentifier(format!(
                "identifier must be longer than {} bytes, got {}",
                ADDRESS_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Parse from hex, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(digits).map_err(|e| CoreError::InvalidIdentifier(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The policy address embedded in the prefix.
    pub fn policy_prefix(&self) -> Address {
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&self.0[..ADDRESS_LENGTH]);
        Address::from_bytes(arr)
    }

    /// The random suffix.
    pub fn nonce(&self) -> &[u8] {
        &self.0[ADDRESS_LENGTH..]
    }

    /// Whether this identifier lives in `policy`'s namespace.
    pub fn belongs_to(&self, policy: &Address) -> bool {
        self.0.starts_with(policy.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MessageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "MessageIdentifier({}…{})", &hex[..8], &hex[hex.len() - 8..])
    }
}

impl fmt::Display for MessageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for MessageIdentifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for MessageIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MessageIdentifier::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
