//! The encrypted object envelope.
//!
//! An [`EncryptedObject`] is what gets uploaded to the blob store. It carries
//! the payload encrypted under a random content key, plus one
//! [`WrappedShare`] of that key per key server. Each share is wrapped to its
//! server's X25519 key under a KDF context binding the package and the
//! identifier, so a server can only unwrap a share for the identifier it was
//! sealed to.

use serde::{Deserialize, Serialize};

use sealpost_core::{from_canonical_bytes, to_canonical_bytes, Address, MessageIdentifier};

use crate::crypto::{ephemeral_wrap_key, AeadNonce, ContentKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, SealError};
use crate::shares::{Share, ShareId};

/// Current envelope format.
pub const ENVELOPE_VERSION: u8 = 1;

/// Context bytes for a share sealed to `server`.
pub fn share_context(package: &Address, identifier: &MessageIdentifier, server: &Address) -> Vec<u8> {
    let mut ctx = Vec::with_capacity(64 + identifier.len());
    ctx.extend_from_slice(package.as_bytes());
    ctx.extend_from_slice(server.as_bytes());
    ctx.extend_from_slice(identifier.as_bytes());
    ctx
}

/// Context bytes for a share a server returns to a client.
pub fn response_context(package: &Address, identifier: &MessageIdentifier, server: &Address) -> Vec<u8> {
    let mut ctx = b"response".to_vec();
    ctx.extend_from_slice(&share_context(package, identifier, server));
    ctx
}

/// A key share encrypted to one recipient key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedShare {
    /// Object id of the key server this share belongs to.
    pub server: Address,
    pub share_id: ShareId,
    pub ephemeral_public: X25519PublicKey,
    pub nonce: AeadNonce,
    pub ciphertext: Vec<u8>,
}

impl WrappedShare {
    /// Encrypt `share` to `recipient` under `context`.
    pub fn seal(
        server: Address,
        share: &Share,
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Self> {
        let (ephemeral_public, wrap_key) = ephemeral_wrap_key(recipient, context);
        let (nonce, ciphertext) = wrap_key.seal(&share.value)?;

        Ok(Self {
            server,
            share_id: share.id,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the recipient's secret. Fails if `context` differs from
    /// the one used to seal.
    pub fn open(&self, secret: &X25519StaticSecret, context: &[u8]) -> Result<Share> {
        let value = secret
            .wrap_key(&self.ephemeral_public, context)
            .open(&self.nonce, &self.ciphertext)?;
        Share::from_slice(self.share_id, &value)
    }
}

/// Envelope stored in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub version: u8,
    /// Policy package whose `seal_approve` gates decryption.
    pub package: Address,
    pub identifier: MessageIdentifier,
    pub threshold: u8,
    pub shares: Vec<WrappedShare>,
    pub payload_nonce: AeadNonce,
    pub payload: Vec<u8>,
}

impl EncryptedObject {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_bytes(self).map_err(|e| SealError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let object: Self =
            from_canonical_bytes(bytes).map_err(|e| SealError::Serialization(e.to_string()))?;
        if object.version != ENVELOPE_VERSION {
            return Err(SealError::Serialization(format!(
                "unsupported envelope version {}",
                object.version
            )));
        }
        if object.threshold == 0 || object.threshold as usize > object.shares.len() {
            return Err(SealError::InvalidThreshold {
                threshold: object.threshold as usize,
                total: object.shares.len(),
            });
        }
        Ok(object)
    }

    /// Decrypt the payload with the recovered content key.
    pub fn open_payload(&self, key: &ContentKey) -> Result<Vec<u8>> {
        key.open(&self.payload_nonce, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Address, MessageIdentifier, Address) {
        let package = Address::from_bytes([1; 32]);
        let policy = Address::from_bytes([2; 32]);
        let server = Address::from_bytes([3; 32]);
        (package, MessageIdentifier::derive(&policy).unwrap(), server)
    }

    #[test]
    fn test_wrapped_share_roundtrip() {
        let (package, id, server) = ids();
        let secret = X25519StaticSecret::generate();
        let share = Share::new(1, [0x77; 32]);

        let ctx = share_context(&package, &id, &server);
        let wrapped = WrappedShare::seal(server, &share, &secret.public_key(), &ctx).unwrap();
        assert_eq!(wrapped.open(&secret, &ctx).unwrap(), share);
    }

    #[test]
    fn test_wrapped_share_bound_to_identifier() {
        let (package, id, server) = ids();
        let other_id = MessageIdentifier::derive(&id.policy_prefix()).unwrap();
        let secret = X25519StaticSecret::generate();
        let share = Share::new(1, [0x77; 32]);

        let wrapped = WrappedShare::seal(
            server,
            &share,
            &secret.public_key(),
            &share_context(&package, &id, &server),
        )
        .unwrap();
        assert!(wrapped
            .open(&secret, &share_context(&package, &other_id, &server))
            .is_err());
        assert!(wrapped
            .open(&secret, &response_context(&package, &id, &server))
            .is_err());
    }

    #[test]
    fn test_envelope_rejects_bad_version() {
        let (package, id, server) = ids();
        let secret = X25519StaticSecret::generate();
        let share = Share::new(1, [0; 32]);
        let ctx = share_context(&package, &id, &server);
        let mut object = EncryptedObject {
            version: ENVELOPE_VERSION,
            package,
            identifier: id,
            threshold: 1,
            shares: vec![WrappedShare::seal(server, &share, &secret.public_key(), &ctx).unwrap()],
            payload_nonce: AeadNonce::generate(),
            payload: vec![1, 2, 3],
        };
        let bytes = object.to_bytes().unwrap();
        assert_eq!(EncryptedObject::from_bytes(&bytes).unwrap(), object);

        object.version = 9;
        let bytes = object.to_bytes().unwrap();
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::Serialization(_))
        ));
        assert!(EncryptedObject::from_bytes(b"not cbor").is_err());
    }
}
