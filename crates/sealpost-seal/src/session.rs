//! Session authorization handshake.
//!
//! A reader proves their identity to key servers without handing over
//! their long-term key. The flow:
//!
//! 1. [`SessionKey::mint`] creates an ephemeral ed25519 session key and a
//!    human-readable challenge naming the package, the TTL, the creation
//!    time and the session public key.
//! 2. The identity's signer (possibly a wallet in another process) signs the
//!    challenge as a personal message.
//! 3. [`SessionKey::bind_signature`] checks and attaches that signature.
//!
//! The signed session then issues a [`SessionCertificate`] and signs each
//! key request with the session key.
//!
//! State machine: `Unsigned → Signed → Consumed`. A session is `Expired`
//! once its TTL has elapsed since minting, signed or not.

use serde::{Deserialize, Serialize};
use std::fmt;

use sealpost_core::{
    personal_message_bytes, request_signing_bytes, Address, ChallengeSigner, Ed25519PublicKey,
    Ed25519Signature, Keypair, SignatureWithKey,
};
use sealpost_ledger::now_millis;

use crate::error::{Result, SealError};

/// Longest session a key server will honor.
pub const MAX_SESSION_TTL_MIN: u64 = 30;

/// Tolerated clock skew for a certificate minted "in the future".
const CLOCK_SKEW_MS: u64 = 60_000;

const MS_PER_MIN: u64 = 60_000;

fn challenge_text(
    package: &Address,
    ttl_min: u64,
    created_at_ms: u64,
    session_key: &Ed25519PublicKey,
) -> Vec<u8> {
    format!(
        "Accessing keys of package {} for {} mins from {} ms, session key {}",
        package,
        ttl_min,
        created_at_ms,
        session_key.to_hex()
    )
    .into_bytes()
}

/// Lifecycle of a [`SessionKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unsigned,
    Signed,
    Expired,
    Consumed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unsigned => "unsigned",
            Self::Signed => "signed",
            Self::Expired => "expired",
            Self::Consumed => "consumed",
        };
        f.write_str(s)
    }
}

/// A short-lived credential bound to one (identity, package) pair.
pub struct SessionKey {
    identity: Address,
    package: Address,
    ttl_min: u64,
    created_at_ms: u64,
    session_keypair: Keypair,
    signature: Option<SignatureWithKey>,
    consumed: bool,
}

impl SessionKey {
    /// Mint a session for `identity` against `package`, valid `ttl_min` minutes.
    pub fn mint(identity: Address, package: Address, ttl_min: u64) -> Result<Self> {
        Self::mint_at(identity, package, ttl_min, now_millis())
    }

    /// Mint with an explicit creation time.
    pub fn mint_at(
        identity: Address,
        package: Address,
        ttl_min: u64,
        created_at_ms: u64,
    ) -> Result<Self> {
        if ttl_min == 0 || ttl_min > MAX_SESSION_TTL_MIN {
            return Err(SealError::InvalidConfig(format!(
                "session ttl must be 1..={MAX_SESSION_TTL_MIN} minutes, got {ttl_min}"
            )));
        }
        Ok(Self {
            identity,
            package,
            ttl_min,
            created_at_ms,
            session_keypair: Keypair::generate(),
            signature: None,
            consumed: false,
        })
    }

    pub fn identity(&self) -> &Address {
        &self.identity
    }

    pub fn package(&self) -> &Address {
        &self.package
    }

    pub fn ttl_min(&self) -> u64 {
        self.ttl_min
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms
            .saturating_add(self.ttl_min.saturating_mul(MS_PER_MIN))
    }

    /// The challenge the identity must sign.
    pub fn personal_message(&self) -> Vec<u8> {
        challenge_text(
            &self.package,
            self.ttl_min,
            self.created_at_ms,
            &self.session_keypair.public_key(),
        )
    }

    pub fn state(&self) -> SessionState {
        self.state_at(now_millis())
    }

    pub fn state_at(&self, now_ms: u64) -> SessionState {
        if self.consumed {
            SessionState::Consumed
        } else if now_ms >= self.expires_at_ms() {
            SessionState::Expired
        } else if self.signature.is_some() {
            SessionState::Signed
        } else {
            SessionState::Unsigned
        }
    }

    /// Attach the identity's signature over the challenge.
    ///
    /// Exactly one signature binds per session.
    pub fn bind_signature(&mut self, signature: SignatureWithKey) -> Result<()> {
        if self.signature.is_some() {
            return Err(SealError::AlreadySigned);
        }
        match self.state() {
            SessionState::Unsigned => {}
            state => return Err(SealError::SessionInvalid(format!("session is {state}"))),
        }
        signature
            .verify_from(&self.identity, &personal_message_bytes(&self.personal_message()))
            .map_err(|_| SealError::SignatureMismatch)?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Have `signer` sign the challenge and bind the result.
    pub async fn sign_with<S: ChallengeSigner + ?Sized>(&mut self, signer: &S) -> Result<()> {
        if signer.address() != self.identity {
            return Err(SealError::SignatureMismatch);
        }
        let signature = signer.sign_challenge(&self.personal_message()).await?;
        self.bind_signature(signature)
    }

    /// The certificate presented to key servers.
    pub fn certificate(&self) -> Result<SessionCertificate> {
        self.certificate_at(now_millis())
    }

    pub fn certificate_at(&self, now_ms: u64) -> Result<SessionCertificate> {
        match (self.state_at(now_ms), &self.signature) {
            (SessionState::Signed, Some(signature)) => Ok(SessionCertificate {
                identity: self.identity,
                package: self.package,
                ttl_min: self.ttl_min,
                created_at_ms: self.created_at_ms,
                session_public_key: self.session_keypair.public_key(),
                signature: *signature,
            }),
            (state, _) => Err(SealError::SessionInvalid(format!("session is {state}"))),
        }
    }

    /// Sign a key-server request body with the session key.
    pub fn sign_request(&self, body: &[u8]) -> Result<Ed25519Signature> {
        match self.state() {
            SessionState::Signed => Ok(self.session_keypair.sign(&request_signing_bytes(body))),
            state => Err(SealError::SessionInvalid(format!("session is {state}"))),
        }
    }

    /// Mark the session as used. Later certificate requests fail.
    pub fn consume(&mut self) {
        self.consumed = true;
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("identity", &self.identity)
            .field("package", &self.package)
            .field("ttl_min", &self.ttl_min)
            .field("state", &self.state())
            .finish()
    }
}

/// Proof that `identity` delegated to `session_public_key` for `package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCertificate {
    pub identity: Address,
    pub package: Address,
    pub ttl_min: u64,
    pub created_at_ms: u64,
    pub session_public_key: Ed25519PublicKey,
    pub signature: SignatureWithKey,
}

impl SessionCertificate {
    pub fn personal_message(&self) -> Vec<u8> {
        challenge_text(
            &self.package,
            self.ttl_min,
            self.created_at_ms,
            &self.session_public_key,
        )
    }

    /// Check the identity's signature and the validity window at `now_ms`.
    pub fn verify_at(&self, now_ms: u64) -> Result<()> {
        if self.ttl_min == 0 || self.ttl_min > MAX_SESSION_TTL_MIN {
            return Err(SealError::SessionInvalid("ttl out of range".into()));
        }
        if self.created_at_ms > now_ms.saturating_add(CLOCK_SKEW_MS) {
            return Err(SealError::SessionInvalid("created in the future".into()));
        }
        let expires = self
            .created_at_ms
            .saturating_add(self.ttl_min.saturating_mul(MS_PER_MIN));
        if now_ms >= expires {
            return Err(SealError::SessionInvalid("session expired".into()));
        }
        self.signature
            .verify_from(&self.identity, &personal_message_bytes(&self.personal_message()))
            .map_err(|_| SealError::SessionInvalid("bad certificate signature".into()))
    }

    /// Check a request body was signed by this certificate's session key.
    pub fn verify_request(&self, body: &[u8], signature: &Ed25519Signature) -> Result<()> {
        self.session_public_key
            .verify(&request_signing_bytes(body), signature)
            .map_err(|_| SealError::SessionInvalid("bad request signature".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn package() -> Address {
        Address::from_bytes([0x0e; 32])
    }

    #[tokio::test]
    async fn test_handshake() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mut session = SessionKey::mint(reader.address(), package(), 10).unwrap();
        assert_eq!(session.state(), SessionState::Unsigned);
        assert!(session.certificate().is_err());

        session.sign_with(&reader).await.unwrap();
        assert_eq!(session.state(), SessionState::Signed);

        let cert = session.certificate().unwrap();
        cert.verify_at(now_millis()).unwrap();

        let sig = session.sign_request(b"body").unwrap();
        cert.verify_request(b"body", &sig).unwrap();
        assert!(cert.verify_request(b"other", &sig).is_err());
    }

    #[tokio::test]
    async fn test_second_signature_rejected() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mut session = SessionKey::mint(reader.address(), package(), 10).unwrap();
        session.sign_with(&reader).await.unwrap();
        assert!(matches!(
            session.sign_with(&reader).await,
            Err(SealError::AlreadySigned)
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mallory = Keypair::from_seed(&[2; 32]);
        let mut session = SessionKey::mint(reader.address(), package(), 10).unwrap();

        let forged = mallory.sign_with_key(&personal_message_bytes(&session.personal_message()));
        assert!(matches!(
            session.bind_signature(forged),
            Err(SealError::SignatureMismatch)
        ));
        // Raw challenge without the personal-message domain does not bind either.
        let raw = reader.sign_with_key(&session.personal_message());
        assert!(matches!(
            session.bind_signature(raw),
            Err(SealError::SignatureMismatch)
        ));
        assert_eq!(session.state(), SessionState::Unsigned);
    }

    #[test]
    fn test_expiry_applies_to_unsigned_and_signed() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mut session = SessionKey::mint_at(reader.address(), package(), 10, T0).unwrap();
        let later = T0 + 10 * 60_000;
        assert_eq!(session.state_at(later - 1), SessionState::Unsigned);
        assert_eq!(session.state_at(later), SessionState::Expired);

        // Minted long ago: binding fails because it is already expired.
        let sig = reader.sign_with_key(&personal_message_bytes(&session.personal_message()));
        assert!(matches!(
            session.bind_signature(sig),
            Err(SealError::SessionInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_certificate_expires() {
        let reader = Keypair::from_seed(&[1; 32]);
        let now = now_millis();
        let mut session = SessionKey::mint_at(reader.address(), package(), 1, now).unwrap();
        session.sign_with(&reader).await.unwrap();

        let cert = session.certificate_at(now).unwrap();
        assert!(cert.verify_at(now + 59_999).is_ok());
        assert!(matches!(
            cert.verify_at(now + 60_000),
            Err(SealError::SessionInvalid(_))
        ));
        assert!(session.certificate_at(now + 60_000).is_err());
    }

    #[tokio::test]
    async fn test_consumed_session_is_unusable() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mut session = SessionKey::mint(reader.address(), package(), 10).unwrap();
        session.sign_with(&reader).await.unwrap();
        session.consume();
        assert_eq!(session.state(), SessionState::Consumed);
        assert!(session.certificate().is_err());
        assert!(session.sign_request(b"x").is_err());
    }

    #[tokio::test]
    async fn test_tampered_certificate_fails() {
        let reader = Keypair::from_seed(&[1; 32]);
        let mut session = SessionKey::mint(reader.address(), package(), 10).unwrap();
        session.sign_with(&reader).await.unwrap();

        let mut cert = session.certificate().unwrap();
        cert.package = Address::from_bytes([0xff; 32]);
        assert!(cert.verify_at(now_millis()).is_err());
    }

    #[test]
    fn test_ttl_bounds() {
        let id = Address::from_bytes([1; 32]);
        assert!(SessionKey::mint(id, package(), 0).is_err());
        assert!(SessionKey::mint(id, package(), MAX_SESSION_TTL_MIN + 1).is_err());
        assert!(SessionKey::mint(id, package(), MAX_SESSION_TTL_MIN).is_ok());
    }
}
