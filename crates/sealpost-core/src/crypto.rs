//! ed25519 identities and the addresses they control.
//!
//! A ledger address is `blake3(SCHEME_FLAG_ED25519 ‖ public_key)`. Anything
//! that signs for an address ships its public key alongside the signature
//! ([`SignatureWithKey`]) so the verifier can recompute the address.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::CoreError;
use crate::types::Address;

/// Scheme flag prepended to an ed25519 public key before hashing it into an
/// address.
pub const SCHEME_FLAG_ED25519: u8 = 0x00;

/// Decode `N` bytes of hex, with or without a `0x` prefix.
fn decode_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
    bytes.try_into().ok()
}

/// Byte-array newtype accessors shared by keys and signatures.
macro_rules! key_bytes {
    ($name:ident, $len:literal, $label:literal, $err:expr) => {
        impl $name {
            pub const LENGTH: usize = $len;

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                decode_fixed::<$len>(s).map(Self).ok_or($err)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({}..)"), &self.to_hex()[..12])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

/// An ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

key_bytes!(Ed25519PublicKey, 32, "Ed25519Pub", CoreError::InvalidPublicKey);

impl Ed25519PublicKey {
    /// The address this key signs for.
    pub fn to_address(&self) -> Address {
        let digest = blake3::Hasher::new()
            .update(&[SCHEME_FLAG_ED25519])
            .update(&self.0)
            .finalize();
        Address::from_bytes(*digest.as_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidPublicKey)?
            .verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

key_bytes!(Ed25519Signature, 64, "Ed25519Sig", CoreError::InvalidSignature);

// 64-byte arrays have no serde impls; signatures go over the wire as hex.
impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// A signature together with the key that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureWithKey {
    pub signature: Ed25519Signature,
    pub public_key: Ed25519PublicKey,
}

impl SignatureWithKey {
    pub fn signer_address(&self) -> Address {
        self.public_key.to_address()
    }

    pub fn verify(&self, message: &[u8]) -> Result<(), CoreError> {
        self.public_key.verify(message, &self.signature)
    }

    /// Verify over `message` and require that the signer controls `expected`.
    pub fn verify_from(&self, expected: &Address, message: &[u8]) -> Result<(), CoreError> {
        if self.signer_address() != *expected {
            return Err(CoreError::InvalidSignature);
        }
        self.verify(message)
    }
}

/// An ed25519 identity: senders, readers, and ephemeral session keys.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse the hex seed a wallet exports, with or without `0x`.
    pub fn from_secret_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| CoreError::InvalidSecretKey(e.to_string()))?;
        let len = bytes.len();
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidSecretKey(format!("expected 32 bytes, got {len}")))?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }

    pub fn sign_with_key(&self, message: &[u8]) -> SignatureWithKey {
        SignatureWithKey {
            signature: self.sign(message),
            public_key: self.public_key(),
        }
    }

    /// Secret seed. Printed by `keygen`; otherwise never leaves the process.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.address()).finish()
    }
}
