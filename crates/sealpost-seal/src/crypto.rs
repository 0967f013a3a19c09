//! Primitives behind sealing.
//!
//! Payloads and wrapped shares are ChaCha20-Poly1305. A share is wrapped to a
//! key server (and later back to the client) with X25519; the agreed secret
//! goes through a blake3 KDF together with the share context, so a wrapped
//! share only opens for the identifier it was sealed to.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{Result, SealError};

const WRAP_KEY_CONTEXT: &str = "sealpost-seal v1 share wrap";

fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn derive_wrap_key(shared: &x25519_dalek::SharedSecret, context: &[u8]) -> ContentKey {
    let mut kdf = blake3::Hasher::new_derive_key(WRAP_KEY_CONTEXT);
    kdf.update(shared.as_bytes());
    kdf.update(context);
    ContentKey(*kdf.finalize().as_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// X25519
// ─────────────────────────────────────────────────────────────────────────────

/// Public half of a key server's (or a client's response) X25519 key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a key as published by `/v1/service`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| SealError::InvalidConfig(format!("x25519 key: {e}")))?;
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| SealError::InvalidConfig("x25519 key must be 32 bytes".into()))
    }
}

impl From<&StaticSecret> for X25519PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        Self(PublicKey::from(secret).to_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Pub({}..)", &self.to_hex()[..12])
    }
}

impl Serialize for X25519PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for X25519PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// A long-lived X25519 secret.
///
/// Key servers hold one for their lifetime. Clients mint one per decrypt to
/// receive re-wrapped shares.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn generate() -> Self {
        Self::from_bytes(random_array())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.0)
    }

    /// Wrap key shared with whoever holds the secret behind `peer`.
    pub fn wrap_key(&self, peer: &X25519PublicKey, context: &[u8]) -> ContentKey {
        derive_wrap_key(&self.0.diffie_hellman(&PublicKey::from(peer.0)), context)
    }
}

/// Fresh one-shot wrap key towards `recipient`.
///
/// Returns the ephemeral public key the recipient needs to derive the same
/// wrap key with [`X25519StaticSecret::wrap_key`].
pub fn ephemeral_wrap_key(recipient: &X25519PublicKey, context: &[u8]) -> (X25519PublicKey, ContentKey) {
    let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let public = X25519PublicKey(PublicKey::from(&secret).to_bytes());
    let shared = secret.diffie_hellman(&PublicKey::from(recipient.0));
    (public, derive_wrap_key(&shared, context))
}

// ─────────────────────────────────────────────────────────────────────────────
// ChaCha20-Poly1305
// ─────────────────────────────────────────────────────────────────────────────

/// 96-bit AEAD nonce. Always random; keys are never reused across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadNonce(pub [u8; 12]);

impl AeadNonce {
    pub fn generate() -> Self {
        Self(random_array())
    }
}

/// A 256-bit symmetric key.
///
/// The per-message content key doubles as the backup key (hex), and share
/// wrap keys come out of [`X25519StaticSecret::wrap_key`].
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a backup key.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| SealError::Decryption(format!("backup key: {e}")))?;
        let len = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| SealError::Decryption(format!("backup key must be 32 bytes, got {len}")))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt under a fresh nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(AeadNonce, Vec<u8>)> {
        let nonce = AeadNonce::generate();
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|_| SealError::Encryption("aead seal failed".into()))?;
        Ok((nonce, ciphertext))
    }

    pub fn open(&self, nonce: &AeadNonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| SealError::Decryption("authentication failed".into()))
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_and_static_sides_agree() {
        let server = X25519StaticSecret::from_bytes([8; 32]);
        let (ephemeral, sender_key) = ephemeral_wrap_key(&server.public_key(), b"ctx");
        assert_eq!(server.wrap_key(&ephemeral, b"ctx"), sender_key);
        assert_ne!(server.wrap_key(&ephemeral, b"other ctx"), sender_key);
    }

    #[test]
    fn test_seal_then_open() {
        let key = ContentKey::generate();
        let (nonce, ciphertext) = key.seal(b"hello").unwrap();
        assert_eq!(ciphertext.len(), b"hello".len() + 16);
        assert_eq!(key.open(&nonce, &ciphertext).unwrap(), b"hello");

        assert!(matches!(
            ContentKey::generate().open(&nonce, &ciphertext),
            Err(SealError::Decryption(_))
        ));
        assert!(key.open(&AeadNonce([0; 12]), &ciphertext).is_err());
    }

    #[test]
    fn test_backup_key_hex() {
        let key = ContentKey::from_bytes([0xab; 32]);
        assert_eq!(key.to_hex().len(), 64);
        assert_eq!(ContentKey::from_hex(&format!("0x{}", key.to_hex())).unwrap(), key);
        assert!(ContentKey::from_hex("abcd").is_err());
        assert_eq!(format!("{key:?}"), "ContentKey(..)");
    }

    #[test]
    fn test_public_key_json_is_hex() {
        let pk = X25519StaticSecret::from_bytes([3; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        assert_eq!(serde_json::from_str::<X25519PublicKey>(&json).unwrap(), pk);
        assert!(serde_json::from_str::<X25519PublicKey>("\"00ff\"").is_err());
    }
}
