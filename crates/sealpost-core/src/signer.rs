//! Challenge signing.
//!
//! Session authorization asks the user's identity to sign a personal
//! message. The signer may be a local key or an external wallet, so it sits
//! behind an async trait.

use async_trait::async_trait;

use crate::canonical::personal_message_bytes;
use crate::crypto::{Keypair, SignatureWithKey};
use crate::error::Result;
use crate::types::Address;

/// Something that can approve a personal message on behalf of an address.
#[async_trait]
pub trait ChallengeSigner: Send + Sync {
    /// The address this signer speaks for.
    fn address(&self) -> Address;

    /// Sign `challenge` as a personal message.
    ///
    /// Implementations sign over [`personal_message_bytes`], never the raw
    /// challenge.
    async fn sign_challenge(&self, challenge: &[u8]) -> Result<SignatureWithKey>;
}

#[async_trait]
impl ChallengeSigner for Keypair {
    fn address(&self) -> Address {
        Keypair::address(self)
    }

    async fn sign_challenge(&self, challenge: &[u8]) -> Result<SignatureWithKey> {
        Ok(self.sign_with_key(&personal_message_bytes(challenge)))
    }
}
