//! Client side of threshold encryption.

use std::fmt;
use tracing::{debug, info, warn};

use sealpost_core::{Address, MessageIdentifier};

use crate::crypto::{ContentKey, X25519StaticSecret};
use crate::envelope::{response_context, share_context, EncryptedObject, WrappedShare, ENVELOPE_VERSION};
use crate::error::{Result, SealError};
use crate::keyserver::{FetchShareBody, FetchShareRequest, KeyServer, KeyServerSet};
use crate::session::SessionKey;
use crate::shares::{combine_shares, split_secret, Share};

/// Result of [`ThresholdClient::encrypt`].
pub struct EncryptOutput {
    /// Serialized [`EncryptedObject`], ready for upload.
    pub ciphertext: Vec<u8>,
    /// Hex content key. Decrypts without key servers; keep it secret.
    pub backup_key: String,
}

impl fmt::Debug for EncryptOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptOutput")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("backup_key", &"..")
            .finish()
    }
}

/// Encrypts to a [`KeyServerSet`] and collects shares back from it.
///
/// `servers[i]` must be the client for `set.servers()[i]`.
pub struct ThresholdClient<K> {
    set: KeyServerSet,
    servers: Vec<K>,
}

impl<K: KeyServer> ThresholdClient<K> {
    pub fn new(set: KeyServerSet, servers: Vec<K>) -> Result<Self> {
        if servers.len() != set.len() {
            return Err(SealError::InvalidConfig(format!(
                "{} key server clients for {} configured servers",
                servers.len(),
                set.len()
            )));
        }
        Ok(Self { set, servers })
    }

    pub fn key_servers(&self) -> &KeyServerSet {
        &self.set
    }

    /// Encrypt `plaintext` so that only approved readers of `identifier`
    /// can recover it.
    pub async fn encrypt(
        &self,
        package: Address,
        identifier: &MessageIdentifier,
        plaintext: &[u8],
    ) -> Result<EncryptOutput> {
        let key = ContentKey::generate();
        let (payload_nonce, payload) = key.seal(plaintext)?;

        let shares = split_secret(key.as_bytes(), self.set.threshold(), self.set.len())?;
        let mut wrapped = Vec::with_capacity(shares.len());
        for ((config, server), share) in self.set.servers().iter().zip(&self.servers).zip(&shares) {
            let info = server.info().await?;
            if info.object_id != config.object_id {
                return Err(SealError::KeyServerMismatch {
                    expected: config.object_id.to_string(),
                    found: info.object_id.to_string(),
                });
            }
            let ctx = share_context(&package, identifier, &config.object_id);
            wrapped.push(WrappedShare::seal(config.object_id, share, &info.public_key, &ctx)?);
        }

        let object = EncryptedObject {
            version: ENVELOPE_VERSION,
            package,
            identifier: identifier.clone(),
            threshold: self.set.threshold() as u8,
            shares: wrapped,
            payload_nonce,
            payload,
        };
        let ciphertext = object.to_bytes()?;
        info!(
            %identifier,
            threshold = self.set.threshold(),
            servers = self.set.len(),
            bytes = ciphertext.len(),
            "payload sealed"
        );
        Ok(EncryptOutput {
            ciphertext,
            backup_key: key.to_hex(),
        })
    }

    /// Recover the plaintext, asking key servers one at a time until the
    /// threshold is reached.
    ///
    /// The session is consumed on success. A rejected session aborts at once
    /// with `SessionInvalid` so the caller can mint a fresh one.
    pub async fn decrypt(
        &self,
        ciphertext: &[u8],
        session: &mut SessionKey,
        approval_kind_bytes: &[u8],
    ) -> Result<Vec<u8>> {
        let object = EncryptedObject::from_bytes(ciphertext)?;
        if object.package != *session.package() {
            return Err(SealError::PackageMismatch {
                expected: object.package.to_string(),
                found: session.package().to_string(),
            });
        }
        // Fail fast before any network call.
        session.certificate()?;

        let need = object.threshold as usize;
        let response_secret = X25519StaticSecret::generate();
        let mut collected: Vec<Share> = Vec::with_capacity(need);
        let mut denials: Vec<String> = Vec::new();
        let mut failures = 0usize;

        for wrapped in &object.shares {
            if collected.len() >= need {
                break;
            }
            let Some(index) = self.set.position(&wrapped.server) else {
                debug!(server = %wrapped.server, "share for unconfigured key server skipped");
                failures += 1;
                continue;
            };
            let request = FetchShareRequest::signed(
                session,
                FetchShareBody {
                    package: object.package,
                    identifier: object.identifier.clone(),
                    approval_kind_bytes: approval_kind_bytes.to_vec(),
                    wrapped_share: wrapped.clone(),
                    response_key: response_secret.public_key(),
                },
            )?;

            match self.servers[index].fetch_share(&request).await {
                Ok(reply) => {
                    let ctx = response_context(&object.package, &object.identifier, &wrapped.server);
                    match reply.share.open(&response_secret, &ctx) {
                        Ok(share) if share.id == wrapped.share_id => collected.push(share),
                        Ok(_) | Err(_) => {
                            warn!(server = %wrapped.server, "key server returned an unusable share");
                            failures += 1;
                        }
                    }
                }
                Err(e @ SealError::SessionInvalid(_)) => return Err(e),
                Err(SealError::AccessDenied(reason)) => {
                    debug!(server = %wrapped.server, %reason, "key server denied access");
                    denials.push(reason);
                }
                Err(e) => {
                    warn!(server = %wrapped.server, error = %e, "key server failed");
                    failures += 1;
                }
            }
        }

        if collected.len() < need {
            if let Some(reason) = denials.into_iter().next() {
                return Err(SealError::AuthorizationDenied { reason });
            }
            debug!(failures, "too few key servers answered");
            return Err(SealError::ServiceUnavailable {
                got: collected.len(),
                need,
            });
        }

        let key = ContentKey::from_bytes(combine_shares(&collected, need)?);
        let plaintext = object.open_payload(&key)?;
        session.consume();
        info!(identifier = %object.identifier, shares = collected.len(), "payload opened");
        Ok(plaintext)
    }
}

/// Decrypt with the escrowed content key, bypassing key servers and ledger.
pub fn decrypt_with_backup_key(ciphertext: &[u8], backup_key: &str) -> Result<Vec<u8>> {
    let object = EncryptedObject::from_bytes(ciphertext)?;
    let key = ContentKey::from_hex(backup_key)?;
    object.open_payload(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyserver::KeyServerConfig;
    use crate::local::LocalKeyServer;
    use sealpost_core::Keypair;
    use sealpost_ledger::{MemoryLedger, PolicyClient, PolicyHandle, PolicyModule};
    use std::sync::Arc;
    use std::time::Duration;

    const PACKAGE: Address = Address::from_bytes([0x5e; 32]);

    type Server = Arc<LocalKeyServer<Arc<MemoryLedger>>>;

    struct Net {
        ledger: Arc<MemoryLedger>,
        policies: PolicyClient<Arc<MemoryLedger>>,
        servers: Vec<Server>,
        client: ThresholdClient<Server>,
        handle: PolicyHandle,
        alice: Keypair,
        carol: Keypair,
    }

    async fn net(total: u8, threshold: usize) -> Net {
        let ledger = Arc::new(MemoryLedger::new(PACKAGE));
        let policies = PolicyClient::new(ledger.clone(), PolicyModule::new(PACKAGE));
        let servers: Vec<Server> = (1..=total)
            .map(|i| {
                Arc::new(LocalKeyServer::new(
                    Address::from_bytes([i; 32]),
                    format!("ks-{i}"),
                    X25519StaticSecret::from_bytes([i + 100; 32]),
                    ledger.clone(),
                ))
            })
            .collect();
        let set = KeyServerSet::new(
            servers
                .iter()
                .map(|s| KeyServerConfig::new(*s.object_id(), "local"))
                .collect(),
            threshold,
        )
        .unwrap();
        let client = ThresholdClient::new(set, servers.clone()).unwrap();

        let owner = Keypair::from_seed(&[50; 32]);
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        let carol = Keypair::from_seed(&[3; 32]);
        let handle = policies
            .create_policy(&owner, alice.address(), bob.address(), "", 30)
            .await
            .unwrap();
        Net {
            ledger,
            policies,
            servers,
            client,
            handle,
            alice,
            carol,
        }
    }

    async fn signed_session(reader: &Keypair) -> SessionKey {
        let mut session = SessionKey::mint(reader.address(), PACKAGE, 10).unwrap();
        session.sign_with(reader).await.unwrap();
        session
    }

    async fn seal(n: &Net, message: &[u8]) -> (MessageIdentifier, EncryptOutput, Vec<u8>) {
        let id = MessageIdentifier::derive(&n.handle.policy).unwrap();
        let out = n.client.encrypt(PACKAGE, &id, message).await.unwrap();
        let approval = n
            .policies
            .build_approval_request(&id, n.handle.policy)
            .unwrap()
            .kind_bytes;
        (id, out, approval)
    }

    #[tokio::test]
    async fn test_roundtrip_two_of_three() {
        let n = net(3, 2).await;
        let (_, out, approval) = seal(&n, b"hello").await;

        let mut session = signed_session(&n.alice).await;
        let plaintext = n.client.decrypt(&out.ciphertext, &mut session, &approval).await.unwrap();
        assert_eq!(plaintext, b"hello");
        assert_eq!(session.state(), crate::session::SessionState::Consumed);

        // Stops once the threshold is reached.
        let released: usize = n.servers.iter().map(|s| s.released_count()).sum();
        assert_eq!(released, 2);
    }

    #[tokio::test]
    async fn test_one_server_down_is_tolerated() {
        let n = net(3, 2).await;
        let (_, out, approval) = seal(&n, b"resilient").await;
        n.servers[0].set_online(false);

        let mut session = signed_session(&n.alice).await;
        let plaintext = n.client.decrypt(&out.ciphertext, &mut session, &approval).await.unwrap();
        assert_eq!(plaintext, b"resilient");
    }

    #[tokio::test]
    async fn test_too_few_servers_is_service_unavailable() {
        let n = net(3, 2).await;
        let (_, out, approval) = seal(&n, b"x").await;
        n.servers[0].set_online(false);
        n.servers[2].set_online(false);

        let mut session = signed_session(&n.alice).await;
        assert!(matches!(
            n.client.decrypt(&out.ciphertext, &mut session, &approval).await,
            Err(SealError::ServiceUnavailable { got: 1, need: 2 })
        ));
        assert_eq!(session.state(), crate::session::SessionState::Signed);
    }

    #[tokio::test]
    async fn test_stranger_is_authorization_denied() {
        let n = net(1, 1).await;
        let (_, out, approval) = seal(&n, b"secret").await;

        let mut session = signed_session(&n.carol).await;
        assert!(matches!(
            n.client.decrypt(&out.ciphertext, &mut session, &approval).await,
            Err(SealError::AuthorizationDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_policy_is_authorization_denied() {
        let n = net(1, 1).await;
        let (_, out, approval) = seal(&n, b"secret").await;
        n.ledger.advance_clock(Duration::from_secs(31 * 24 * 3600)).await;

        let mut session = signed_session(&n.alice).await;
        assert!(matches!(
            n.client.decrypt(&out.ciphertext, &mut session, &approval).await,
            Err(SealError::AuthorizationDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsigned_session_is_invalid() {
        let n = net(1, 1).await;
        let (_, out, approval) = seal(&n, b"secret").await;

        let mut session = SessionKey::mint(n.alice.address(), PACKAGE, 10).unwrap();
        assert!(matches!(
            n.client.decrypt(&out.ciphertext, &mut session, &approval).await,
            Err(SealError::SessionInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_session_for_other_package() {
        let n = net(1, 1).await;
        let (_, out, approval) = seal(&n, b"secret").await;

        let other = Address::from_bytes([0x01; 32]);
        let mut session = SessionKey::mint(n.alice.address(), other, 10).unwrap();
        session.sign_with(&n.alice).await.unwrap();
        assert!(matches!(
            n.client.decrypt(&out.ciphertext, &mut session, &approval).await,
            Err(SealError::PackageMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_backup_key_opens_without_servers() {
        let n = net(2, 2).await;
        let (_, out, _) = seal(&n, b"escrow").await;
        for server in &n.servers {
            server.set_online(false);
        }
        assert_eq!(
            decrypt_with_backup_key(&out.ciphertext, &out.backup_key).unwrap(),
            b"escrow"
        );
        let wrong = ContentKey::generate().to_hex();
        assert!(decrypt_with_backup_key(&out.ciphertext, &wrong).is_err());
    }

    #[tokio::test]
    async fn test_mismatched_server_identity_rejected() {
        let ledger = Arc::new(MemoryLedger::new(PACKAGE));
        let server: Server = Arc::new(LocalKeyServer::new(
            Address::from_bytes([7; 32]),
            "ks",
            X25519StaticSecret::generate(),
            ledger,
        ));
        let set = KeyServerSet::new(
            vec![KeyServerConfig::new(Address::from_bytes([8; 32]), "local")],
            1,
        )
        .unwrap();
        let client = ThresholdClient::new(set, vec![server]).unwrap();
        let id = MessageIdentifier::derive(&Address::from_bytes([2; 32])).unwrap();
        assert!(matches!(
            client.encrypt(PACKAGE, &id, b"x").await,
            Err(SealError::KeyServerMismatch { .. })
        ));
    }

    #[test]
    fn test_debug_hides_backup_key() {
        let out = EncryptOutput {
            ciphertext: vec![1, 2, 3],
            backup_key: "deadbeef".into(),
        };
        assert!(!format!("{out:?}").contains("deadbeef"));
    }
}
