//! The Orchestrator: sequences ledger, key servers and blob store.
//!
//! Creation runs `create policy → add recipients → derive identifier →
//! encrypt → upload (→ attach blob)`. Opening runs `download → bind session
//! → build approval → decrypt`. Every step is a separate remote call with
//! its own deadline; any failure aborts the sequence and is reported with
//! the step that failed.

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use sealpost_blob::{BlobId, BlobStore, UploadReceipt};
use sealpost_core::{Address, ChallengeSigner, Keypair, MessageIdentifier};
use sealpost_ledger::{LedgerRpc, PolicyClient, PolicyModule};
use sealpost_seal::{decrypt_with_backup_key, KeyServer, SessionKey, SessionState, ThresholdClient};

use crate::config::SealpostConfig;
use crate::credentials::{CredentialsRecord, Recipients};
use crate::error::{CreateStage, DecryptStage, ErrorKind, Result, SealpostError};
use crate::retry::with_deadline;

/// Where [`Orchestrator::seal_for_policy`] encrypts to.
pub struct SealTarget<'a> {
    /// Holder of the policy's owner capability.
    pub owner: &'a Keypair,
    /// Owner capability, if known. Looked up from `owner` otherwise.
    pub cap: Option<Address>,
    /// Recipients as recorded in the credentials record.
    pub recipients: Recipients,
    pub expiry_days: u64,
}

/// Everything a reader needs to locate and open a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub policy: Address,
    pub identifier: MessageIdentifier,
    pub blob_id: BlobId,
}

impl From<&CredentialsRecord> for OpenRequest {
    fn from(record: &CredentialsRecord) -> Self {
        Self {
            policy: record.policy_id,
            identifier: record.identifier.clone(),
            blob_id: record.blob_id.clone(),
        }
    }
}

/// Sealed ciphertext after it reached the blob store.
struct Stored {
    identifier: MessageIdentifier,
    backup_key: String,
    receipt: UploadReceipt,
}

/// Sends and opens sealed messages.
pub struct Orchestrator<L, K, B> {
    config: SealpostConfig,
    policies: PolicyClient<L>,
    threshold: ThresholdClient<K>,
    blobs: B,
}

impl<L, K, B> Orchestrator<L, K, B>
where
    L: LedgerRpc,
    K: KeyServer,
    B: BlobStore,
{
    /// `key_servers[i]` must be the client for `config.key_servers.servers()[i]`.
    pub fn new(config: SealpostConfig, ledger: L, key_servers: Vec<K>, blobs: B) -> Result<Self> {
        config.validate()?;
        let threshold = ThresholdClient::new(config.key_servers.clone(), key_servers)
            .map_err(|e| SealpostError::InvalidInput(e.to_string()))?;
        let policies = PolicyClient::new(ledger, PolicyModule::new(config.package));
        Ok(Self {
            config,
            policies,
            threshold,
            blobs,
        })
    }

    pub fn config(&self) -> &SealpostConfig {
        &self.config
    }

    pub fn policies(&self) -> &PolicyClient<L> {
        &self.policies
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a policy for `recipients`, then seal `message` to it.
    ///
    /// The first two recipients go into the creating transaction, the rest
    /// are added one by one. If a step after policy creation fails, the
    /// error carries the new policy's address so encryption can be re-run
    /// against it with [`seal_for_policy`](Self::seal_for_policy).
    pub async fn create_and_seal(
        &self,
        sender: &Keypair,
        message: &[u8],
        recipients: &Recipients,
        expiry_days: u64,
    ) -> Result<CredentialsRecord> {
        let addresses = recipients.addresses();
        let [first, second, rest @ ..] = addresses.as_slice() else {
            return Err(SealpostError::InvalidInput(format!(
                "at least two recipients are required, got {}",
                addresses.len()
            )));
        };
        if expiry_days == 0 {
            return Err(SealpostError::InvalidInput("expiry days must be at least 1".into()));
        }
        let deadline = self.config.call_timeout;
        info!(state = "init", sender = %sender.address(), recipients = addresses.len(), "creating sealed message");

        // Not retried: a lost response may still have created a policy.
        let handle = with_deadline(
            deadline,
            self.policies
                .create_policy(sender, *first, *second, &self.config.preview, expiry_days),
        )
        .await
        .map_err(SealpostError::create(CreateStage::CreatePolicy, None))?;
        let policy = handle.policy;
        info!(state = "policy_created", %policy, owner_cap = %handle.owner_cap, "policy created");

        for recipient in rest {
            with_deadline(
                deadline,
                self.policies
                    .add_recipient(sender, policy, handle.owner_cap, *recipient),
            )
            .await
            .map_err(SealpostError::create(CreateStage::AddRecipients, Some(policy)))?;
        }
        info!(state = "recipients_added", %policy, count = addresses.len(), "recipient set complete");

        let identifier = MessageIdentifier::derive(&policy)
            .map_err(|e| SealpostError::create(CreateStage::DeriveIdentifier, Some(policy))(e.into()))?;
        info!(state = "identifier_derived", %identifier, "identifier derived");

        let stored = self
            .encrypt_and_upload(policy, identifier, message, self.config.storage_epochs)
            .await?;
        self.finish_create(sender, policy, Some(handle.owner_cap), &stored, first)
            .await?;

        let record = self.record(policy, Some(handle.owner_cap), stored, recipients.clone(), expiry_days);
        info!(state = "done", %policy, blob_id = %record.blob_id, "sealed message created");
        Ok(record)
    }

    /// Seal `message` to a policy that already exists.
    ///
    /// This is the recovery path for a creation that failed after the
    /// policy was written.
    pub async fn seal_for_policy(
        &self,
        policy: Address,
        message: &[u8],
        target: SealTarget<'_>,
    ) -> Result<CredentialsRecord> {
        let deadline = self.config.call_timeout;
        let owner = target.owner.address();
        info!(state = "init", %policy, "sealing to existing policy");

        let cap = match target.cap {
            Some(cap) => Some(cap),
            None => {
                let found = self
                    .config
                    .retry
                    .run("find owner cap", deadline, || {
                        self.policies.find_owner_cap(&owner, &policy)
                    })
                    .await
                    .map_err(SealpostError::create(CreateStage::LookupOwnerCap, Some(policy)))?;
                if found.is_none() {
                    warn!(%policy, %owner, "no owner capability found for policy");
                }
                found
            }
        };

        let identifier = MessageIdentifier::derive(&policy)
            .map_err(|e| SealpostError::create(CreateStage::DeriveIdentifier, Some(policy))(e.into()))?;
        info!(state = "identifier_derived", %identifier, "identifier derived");

        let stored = self
            .encrypt_and_upload(policy, identifier, message, self.config.storage_epochs)
            .await?;
        let first = target.recipients.addresses().first().copied();
        if let Some(first) = first {
            self.finish_create(target.owner, policy, cap, &stored, &first)
                .await?;
        }

        let record = self.record(policy, cap, stored, target.recipients, target.expiry_days);
        info!(state = "done", %policy, blob_id = %record.blob_id, "sealed message created");
        Ok(record)
    }

    /// Re-encrypt `message` under the record's identifier and upload it for
    /// `epochs` store epochs.
    ///
    /// The identifier is reused so readers keep access through the same
    /// approval path. Returns the record with the new blob and backup key.
    pub async fn reupload(
        &self,
        record: &CredentialsRecord,
        message: &[u8],
        epochs: u32,
    ) -> Result<CredentialsRecord> {
        if record.package_id != self.config.package {
            return Err(SealpostError::InvalidInput(format!(
                "record was created under package {}, configured package is {}",
                record.package_id, self.config.package
            )));
        }
        if !record.identifier.belongs_to(&record.policy_id) {
            return Err(SealpostError::InvalidInput(
                "record identifier does not start with its policy address (prefix mismatch)".into(),
            ));
        }
        if epochs == 0 {
            return Err(SealpostError::InvalidInput("storage epochs must be at least 1".into()));
        }
        info!(
            state = "init",
            policy = %record.policy_id,
            identifier = %record.identifier,
            epochs,
            "re-uploading sealed message"
        );

        let stored = self
            .encrypt_and_upload(record.policy_id, record.identifier.clone(), message, epochs)
            .await?;
        let updated = CredentialsRecord {
            blob_id: stored.receipt.blob_id,
            backup_key: Some(stored.backup_key),
            ..record.clone()
        };
        info!(state = "done", blob_id = %updated.blob_id, "sealed message re-uploaded");
        Ok(updated)
    }

    async fn encrypt_and_upload(
        &self,
        policy: Address,
        identifier: MessageIdentifier,
        message: &[u8],
        epochs: u32,
    ) -> Result<Stored> {
        let deadline = self.config.call_timeout;
        let package = self.config.package;
        let id = &identifier;

        let sealed = self
            .config
            .retry
            .run("encrypt", deadline, || self.threshold.encrypt(package, id, message))
            .await
            .map_err(SealpostError::create(CreateStage::Encrypt, Some(policy)))?;
        info!(state = "encrypted", bytes = sealed.ciphertext.len(), "message encrypted");

        let body = Bytes::from(sealed.ciphertext);
        let receipt = self
            .config
            .retry
            .run("upload", deadline, || self.blobs.upload(body.clone(), epochs))
            .await
            .map_err(SealpostError::create(CreateStage::Upload, Some(policy)))?;
        info!(
            state = "uploaded",
            blob_id = %receipt.blob_id,
            outcome = ?receipt.outcome,
            end_epoch = ?receipt.end_epoch,
            "ciphertext stored"
        );

        Ok(Stored {
            identifier,
            backup_key: sealed.backup_key,
            receipt,
        })
    }

    /// Optional ledger writes after upload.
    async fn finish_create(
        &self,
        owner: &Keypair,
        policy: Address,
        cap: Option<Address>,
        stored: &Stored,
        first_recipient: &Address,
    ) -> Result<()> {
        let deadline = self.config.call_timeout;
        let wants_cap = self.config.attach_blob || self.config.auto_transfer;
        let Some(cap) = cap else {
            if wants_cap {
                warn!(%policy, "owner capability unknown; skipping blob attachment and transfer");
            }
            return Ok(());
        };

        if self.config.attach_blob {
            with_deadline(
                deadline,
                self.policies
                    .attach_blob(owner, policy, cap, stored.receipt.blob_id.as_str()),
            )
            .await
            .map_err(SealpostError::create(CreateStage::AttachBlob, Some(policy)))?;
            info!(state = "blob_attached", %policy, "blob recorded on policy");
        }

        if self.config.auto_transfer {
            with_deadline(
                deadline,
                self.policies
                    .transfer_policy(owner, policy, cap, *first_recipient),
            )
            .await
            .map_err(SealpostError::create(CreateStage::TransferPolicy, Some(policy)))?;
        }
        Ok(())
    }

    fn record(
        &self,
        policy: Address,
        cap: Option<Address>,
        stored: Stored,
        recipients: Recipients,
        expiry_days: u64,
    ) -> CredentialsRecord {
        let created_at = Utc::now();
        let count = recipients.len();
        CredentialsRecord {
            network: self.config.network,
            package_id: self.config.package,
            policy_id: policy,
            cap_id: cap,
            identifier: stored.identifier,
            blob_id: stored.receipt.blob_id,
            backup_key: Some(stored.backup_key),
            recipients,
            recipient_count: (count > 2).then_some(count),
            note: None,
            created_at,
            expires_at: CredentialsRecord::expiry_from(created_at, expiry_days),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Opening
    // ─────────────────────────────────────────────────────────────────────────

    /// Download and decrypt a message as `reader`.
    ///
    /// A session the key servers reject is replaced once with a freshly
    /// minted one. Denials are never retried.
    pub async fn open<R>(&self, reader: &R, request: &OpenRequest) -> Result<Vec<u8>>
    where
        R: ChallengeSigner + ?Sized,
    {
        if !request.identifier.belongs_to(&request.policy) {
            return Err(SealpostError::InvalidInput(format!(
                "identifier {} does not start with policy {} (prefix mismatch)",
                request.identifier, request.policy
            )));
        }
        let reader_address = reader.address();
        info!(state = "init", reader = %reader_address, policy = %request.policy, "opening sealed message");

        let ciphertext = self.download(&request.blob_id).await?;

        let mut session = self.bind_session(reader).await?;
        info!(state = "session_bound", expires_at_ms = session.expires_at_ms(), "session bound");

        let approval = self
            .policies
            .build_approval_request(&request.identifier, request.policy)
            .map_err(|e| SealpostError::decrypt(DecryptStage::BuildApproval)(e.into()))?;
        info!(state = "approval_built", bytes = approval.kind_bytes.len(), "approval request built");

        let deadline = self.config.call_timeout;
        let mut refreshed = false;
        let mut attempt = 1;
        loop {
            let outcome = with_deadline(
                deadline,
                self.threshold
                    .decrypt(&ciphertext, &mut session, &approval.kind_bytes),
            )
            .await;
            match outcome {
                Ok(plaintext) => {
                    info!(state = "decrypted", bytes = plaintext.len(), "message opened");
                    return Ok(plaintext);
                }
                Err(e) if e.kind() == ErrorKind::SessionInvalid && !refreshed => {
                    warn!(error = %e, "session rejected; minting a fresh one");
                    refreshed = true;
                    session = self.bind_session(reader).await?;
                }
                Err(e) if e.is_transient() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.backoff_for(attempt);
                    warn!(attempt, ?delay, error = %e, "decrypt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    if session.state() != SessionState::Signed {
                        session = self.bind_session(reader).await?;
                    }
                }
                Err(e) => return Err(SealpostError::decrypt(DecryptStage::Decrypt)(e)),
            }
        }
    }

    /// Decrypt with the escrowed content key. No ledger or key server is
    /// consulted.
    pub async fn open_with_backup_key(&self, blob_id: &BlobId, backup_key: &str) -> Result<Vec<u8>> {
        info!(state = "init", %blob_id, "opening with backup key");
        let ciphertext = self.download(blob_id).await?;
        let plaintext = decrypt_with_backup_key(&ciphertext, backup_key)
            .map_err(|e| SealpostError::decrypt(DecryptStage::Decrypt)(e.into()))?;
        info!(state = "decrypted", bytes = plaintext.len(), "message opened with backup key");
        Ok(plaintext)
    }

    async fn download(&self, blob_id: &BlobId) -> Result<Bytes> {
        let bytes = self
            .config
            .retry
            .run("download", self.config.call_timeout, || self.blobs.download(blob_id))
            .await
            .map_err(SealpostError::decrypt(DecryptStage::Download))?;
        info!(state = "downloaded", %blob_id, bytes = bytes.len(), "ciphertext downloaded");
        Ok(bytes)
    }

    /// Mint a session for `reader` and have it sign the challenge.
    async fn bind_session<R>(&self, reader: &R) -> Result<SessionKey>
    where
        R: ChallengeSigner + ?Sized,
    {
        let mut session =
            SessionKey::mint(reader.address(), self.config.package, self.config.session_ttl_min)
                .map_err(|e| SealpostError::decrypt(DecryptStage::BindSession)(e.into()))?;
        debug!(identity = %session.identity(), ttl_min = session.ttl_min(), "session minted");
        with_deadline(self.config.call_timeout, session.sign_with(reader))
            .await
            .map_err(SealpostError::decrypt(DecryptStage::BindSession))?;
        Ok(session)
    }
}
