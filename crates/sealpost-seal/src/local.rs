//! In-process key server.
//!
//! Holds an X25519 secret and a ledger handle. It is what `HttpKeyServer`
//! talks to on the other side of the wire, and what tests run directly.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

use sealpost_core::Address;
use sealpost_ledger::policy::FN_SEAL_APPROVE;
use sealpost_ledger::{
    now_millis, LedgerError, LedgerRpc, PolicyVerdict, TransactionKind, POLICY_MODULE,
};

use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::envelope::{response_context, share_context, WrappedShare};
use crate::error::{Result, SealError};
use crate::keyserver::{
    FetchShareBody, FetchShareRequest, FetchShareResponse, KeyServer, KeyServerInfo,
};
use crate::session::SessionCertificate;

/// A key server backed by a ledger connection.
pub struct LocalKeyServer<L> {
    object_id: Address,
    name: String,
    secret: X25519StaticSecret,
    ledger: L,
    online: AtomicBool,
    released: AtomicUsize,
}

impl<L: LedgerRpc> LocalKeyServer<L> {
    pub fn new(
        object_id: Address,
        name: impl Into<String>,
        secret: X25519StaticSecret,
        ledger: L,
    ) -> Self {
        Self {
            object_id,
            name: name.into(),
            secret,
            ledger,
            online: AtomicBool::new(true),
            released: AtomicUsize::new(0),
        }
    }

    pub fn object_id(&self) -> &Address {
        &self.object_id
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// Take the server offline (every call fails with `Unavailable`) or back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of shares released so far.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SealError::Unavailable(format!("{} is offline", self.name)))
        }
    }

    /// The approval may only call `seal_approve` in the certificate's
    /// package, and only for the requested identifier.
    fn check_approval_shape(&self, cert: &SessionCertificate, body: &FetchShareBody) -> Result<()> {
        let kind = TransactionKind::from_bytes(&body.approval_kind_bytes)
            .map_err(|e| SealError::InvalidRequest(e.to_string()))?;
        if kind.calls.is_empty() {
            return Err(SealError::InvalidRequest("approval has no calls".into()));
        }
        for call in &kind.calls {
            let is_approve = call.package == cert.package
                && call.module == POLICY_MODULE
                && call.function == FN_SEAL_APPROVE;
            if !is_approve {
                return Err(SealError::AccessDenied(format!(
                    "approval calls {} instead of {FN_SEAL_APPROVE}",
                    call.target()
                )));
            }
            let id = call.arguments.first().and_then(|a| a.as_bytes());
            if id != Some(body.identifier.as_bytes()) {
                return Err(SealError::AccessDenied(
                    "approval does not cover the requested identifier".into(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<L: LedgerRpc> KeyServer for LocalKeyServer<L> {
    async fn info(&self) -> Result<KeyServerInfo> {
        self.ensure_online()?;
        Ok(KeyServerInfo {
            object_id: self.object_id,
            name: self.name.clone(),
            public_key: self.public_key(),
        })
    }

    async fn fetch_share(&self, request: &FetchShareRequest) -> Result<FetchShareResponse> {
        self.ensure_online()?;
        let cert = &request.certificate;
        let body = &request.body;

        cert.verify_at(now_millis())?;
        cert.verify_request(&body.signing_bytes()?, &request.request_signature)?;
        if body.package != cert.package {
            return Err(SealError::SessionInvalid(format!(
                "certificate is for package {}, request is for {}",
                cert.package, body.package
            )));
        }
        if body.wrapped_share.server != self.object_id {
            return Err(SealError::InvalidRequest(format!(
                "share belongs to key server {}",
                body.wrapped_share.server
            )));
        }

        self.check_approval_shape(cert, body)?;

        let verdict = match self
            .ledger
            .evaluate_policy(&body.approval_kind_bytes, &cert.identity)
            .await
        {
            Ok(verdict) => verdict,
            Err(LedgerError::InvalidTransaction(msg)) => {
                return Err(SealError::InvalidRequest(msg))
            }
            Err(e) => return Err(SealError::Unavailable(format!("ledger: {e}"))),
        };
        if let PolicyVerdict::Denied(reason) = verdict {
            debug!(server = %self.name, identity = %cert.identity, %reason, "share withheld");
            return Err(SealError::AccessDenied(reason.to_string()));
        }

        let share = body
            .wrapped_share
            .open(
                &self.secret,
                &share_context(&body.package, &body.identifier, &self.object_id),
            )
            .map_err(|_| {
                SealError::InvalidRequest("share was not sealed for this identifier".into())
            })?;
        let share = WrappedShare::seal(
            self.object_id,
            &share,
            &body.response_key,
            &response_context(&body.package, &body.identifier, &self.object_id),
        )?;

        self.released.fetch_add(1, Ordering::SeqCst);
        info!(server = %self.name, identity = %cert.identity, identifier = %body.identifier, "share released");
        Ok(FetchShareResponse { share })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;
    use crate::shares::Share;
    use sealpost_core::{Keypair, MessageIdentifier};
    use sealpost_ledger::{MemoryLedger, PolicyClient, PolicyHandle, PolicyModule};
    use std::sync::Arc;

    const PACKAGE: Address = Address::from_bytes([0xaa; 32]);

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        server: LocalKeyServer<Arc<MemoryLedger>>,
        policy: PolicyHandle,
        alice: Keypair,
        carol: Keypair,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::new(PACKAGE));
        let client = PolicyClient::new(ledger.clone(), PolicyModule::new(PACKAGE));
        let owner = Keypair::from_seed(&[9; 32]);
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        let carol = Keypair::from_seed(&[3; 32]);
        let policy = client
            .create_policy(&owner, alice.address(), bob.address(), "preview", 30)
            .await
            .unwrap();
        let server = LocalKeyServer::new(
            Address::from_bytes([0x73; 32]),
            "ks-1",
            X25519StaticSecret::from_bytes([5; 32]),
            ledger.clone(),
        );
        Fixture {
            ledger,
            server,
            policy,
            alice,
            carol,
        }
    }

    async fn request_for(
        f: &Fixture,
        reader: &Keypair,
        identifier: &MessageIdentifier,
        response_key: X25519PublicKey,
    ) -> FetchShareRequest {
        let client = PolicyClient::new(f.ledger.clone(), PolicyModule::new(PACKAGE));
        let approval = client
            .build_approval_request(identifier, f.policy.policy)
            .unwrap();
        let wrapped = WrappedShare::seal(
            f.server.object_id,
            &Share::new(1, [0x5a; 32]),
            &f.server.public_key(),
            &share_context(&PACKAGE, identifier, &f.server.object_id),
        )
        .unwrap();
        let mut session = SessionKey::mint(reader.address(), PACKAGE, 10).unwrap();
        session.sign_with(reader).await.unwrap();
        FetchShareRequest::signed(
            &session,
            FetchShareBody {
                package: PACKAGE,
                identifier: identifier.clone(),
                approval_kind_bytes: approval.kind_bytes,
                wrapped_share: wrapped,
                response_key,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_recipient_receives_share() {
        let f = fixture().await;
        let id = MessageIdentifier::derive(&f.policy.policy).unwrap();
        let response = X25519StaticSecret::generate();
        let request = request_for(&f, &f.alice, &id, response.public_key()).await;

        let reply = f.server.fetch_share(&request).await.unwrap();
        let share = reply
            .share
            .open(&response, &response_context(&PACKAGE, &id, &f.server.object_id))
            .unwrap();
        assert_eq!(share, Share::new(1, [0x5a; 32]));
        assert_eq!(f.server.released_count(), 1);
    }

    #[tokio::test]
    async fn test_stranger_is_denied() {
        let f = fixture().await;
        let id = MessageIdentifier::derive(&f.policy.policy).unwrap();
        let request = request_for(&f, &f.carol, &id, X25519StaticSecret::generate().public_key()).await;
        assert!(matches!(
            f.server.fetch_share(&request).await,
            Err(SealError::AccessDenied(_))
        ));
        assert_eq!(f.server.released_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_policy_is_denied() {
        let f = fixture().await;
        let id = MessageIdentifier::derive(&f.policy.policy).unwrap();
        f.ledger
            .advance_clock(std::time::Duration::from_secs(31 * 24 * 3600))
            .await;
        let request = request_for(&f, &f.alice, &id, X25519StaticSecret::generate().public_key()).await;
        assert!(matches!(
            f.server.fetch_share(&request).await,
            Err(SealError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let f = fixture().await;
        let id = MessageIdentifier::derive(&f.policy.policy).unwrap();
        let mut request =
            request_for(&f, &f.alice, &id, X25519StaticSecret::generate().public_key()).await;
        request.body.response_key = X25519StaticSecret::generate().public_key();
        assert!(matches!(
            f.server.fetch_share(&request).await,
            Err(SealError::SessionInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_approval_for_other_identifier_is_denied() {
        let f = fixture().await;
        let id = MessageIdentifier::derive(&f.policy.policy).unwrap();
        let other = MessageIdentifier::derive(&f.policy.policy).unwrap();

        let client = PolicyClient::new(f.ledger.clone(), PolicyModule::new(PACKAGE));
        let approval = client.build_approval_request(&other, f.policy.policy).unwrap();
        let mut session = SessionKey::mint(f.alice.address(), PACKAGE, 10).unwrap();
        session.sign_with(&f.alice).await.unwrap();
        let request = FetchShareRequest::signed(
            &session,
            FetchShareBody {
                package: PACKAGE,
                identifier: id.clone(),
                approval_kind_bytes: approval.kind_bytes,
                wrapped_share: WrappedShare::seal(
                    f.server.object_id,
                    &Share::new(1, [1; 32]),
                    &f.server.public_key(),
                    &share_context(&PACKAGE, &id, &f.server.object_id),
                )
                .unwrap(),
                response_key: X25519StaticSecret::generate().public_key(),
            },
        )
        .unwrap();
        assert!(matches!(
            f.server.fetch_share(&request).await,
            Err(SealError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_server_is_unavailable() {
        let f = fixture().await;
        f.server.set_online(false);
        assert!(matches!(f.server.info().await, Err(SealError::Unavailable(_))));
        f.server.set_online(true);
        let info = f.server.info().await.unwrap();
        assert_eq!(info.public_key, f.server.public_key());
        assert_eq!(info.name, "ks-1");
    }
}
