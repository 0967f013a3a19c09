//! Sealpost command-line interface.
//!
//! Reads settings from the environment (a `.env` file is loaded first) and
//! flags.
//!
//! ## Usage
//!
//! ```bash
//! # Seal a message to two recipients
//! sealpost send --recipient alice=0x.. --recipient bob=0x.. --message "hello"
//!
//! # Seal to any number of recipients
//! sealpost send-multiple --recipient a=0x.. --recipient b=0x.. --recipient c=0x.. --message-file note.txt
//!
//! # Seal again to a policy that already exists
//! sealpost encrypt-existing --policy 0x.. --recipient a=0x.. --recipient b=0x.. --message "hello"
//!
//! # Open as a recipient (falls back to the credentials file)
//! sealpost decrypt
//!
//! # Store the ciphertext again for longer
//! sealpost reupload --epochs 5 --message "hello"
//!
//! # Make a new key
//! sealpost keygen
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use sealpost::blob::{BlobId, WalrusClient, WalrusConfig};
use sealpost::ledger::{JsonRpcConfig, JsonRpcLedger};
use sealpost::seal::HttpKeyServer;
use sealpost::{
    Address, CredentialsRecord, Keypair, MessageIdentifier, OpenRequest, Orchestrator,
    Recipients, SealTarget, SealpostConfig, SealpostError,
};

const DEFAULT_CREDENTIALS_FILE: &str = "output/apology-credentials.json";

type LiveOrchestrator = Orchestrator<JsonRpcLedger, HttpKeyServer, WalrusClient>;

/// Ledger-gated sealed messages
#[derive(Parser, Debug)]
#[command(name = "sealpost")]
#[command(about = "Seal messages that only listed recipients can open")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a policy for two recipients and seal a message to it
    Send(SendArgs),
    /// Create a policy for two or more recipients and seal a message to it
    SendMultiple(SendArgs),
    /// Seal a message to a policy that already exists
    EncryptExisting(EncryptExistingArgs),
    /// Open a sealed message as a recipient
    Decrypt(DecryptArgs),
    /// Re-encrypt under the stored identifier and upload again
    Reupload(ReuploadArgs),
    /// Generate a new signing key
    Keygen,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct MessageArgs {
    /// Message text
    #[arg(long)]
    message: Option<String>,

    /// Read the message from a file
    #[arg(long, value_name = "PATH")]
    message_file: Option<PathBuf>,
}

impl MessageArgs {
    fn read(&self) -> anyhow::Result<Vec<u8>> {
        match (&self.message, &self.message_file) {
            (Some(text), _) => Ok(text.as_bytes().to_vec()),
            (None, Some(path)) => {
                fs::read(path).with_context(|| format!("reading message from {}", path.display()))
            }
            (None, None) => Err(SealpostError::InvalidInput("no message given".into()).into()),
        }
    }
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Sender secret key (hex seed)
    #[arg(long, env = "SENDER_PRIVATE_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Recipient as `name=address` or a bare address; repeat for each
    #[arg(long = "recipient", env = "RECIPIENTS", value_delimiter = ',')]
    recipients: Vec<String>,

    #[command(flatten)]
    message: MessageArgs,

    /// Days until the access window closes
    #[arg(long)]
    expiry_days: Option<u64>,

    /// Store epochs to pay for
    #[arg(long)]
    epochs: Option<u32>,

    /// Where to write the credentials record
    #[arg(long, env = "CREDENTIALS_FILE", default_value = DEFAULT_CREDENTIALS_FILE)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct EncryptExistingArgs {
    #[command(flatten)]
    send: SendArgs,

    /// Existing policy object
    #[arg(long, env = "APOLOGY_ID")]
    policy: String,

    /// Owner capability; looked up from the sender when absent
    #[arg(long, env = "CAP_ID")]
    cap: Option<String>,
}

#[derive(Args, Debug)]
struct DecryptArgs {
    /// Reader secret key (hex seed)
    #[arg(long, env = "RECIPIENT_PRIVATE_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Policy object
    #[arg(long, env = "APOLOGY_ID")]
    policy: Option<String>,

    /// Message identifier (hex)
    #[arg(long, env = "DOCUMENT_ID")]
    identifier: Option<String>,

    /// Blob holding the ciphertext
    #[arg(long, env = "WALRUS_BLOB_ID")]
    blob_id: Option<String>,

    /// Credentials record used for anything not given above
    #[arg(long, env = "CREDENTIALS_FILE", default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Decrypt with this backup key instead of asking key servers
    #[arg(long)]
    backup_key: Option<String>,

    /// Write the plaintext here instead of printing it
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReuploadArgs {
    /// Credentials record of the original send
    #[arg(long, env = "CREDENTIALS_FILE", default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    #[command(flatten)]
    message: MessageArgs,

    /// Store epochs to pay for
    #[arg(long, default_value_t = 5)]
    epochs: u32,

    /// Where to write the updated record; defaults to overwriting the input
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SealpostError>() {
                Some(err) => eprintln!("error: {}", err.user_message()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Send(args) => cmd_send(args, Some(2)).await,
        Commands::SendMultiple(args) => cmd_send(args, None).await,
        Commands::EncryptExisting(args) => cmd_encrypt_existing(args).await,
        Commands::Decrypt(args) => cmd_decrypt(args).await,
        Commands::Reupload(args) => cmd_reupload(args).await,
        Commands::Keygen => {
            cmd_keygen();
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_send(args: SendArgs, exact: Option<usize>) -> anyhow::Result<()> {
    let (mut config, sender) = config_with_key(env_var, args.key.as_deref(), "SENDER_PRIVATE_KEY")?;
    let recipients = parse_recipients(&args.recipients)?;
    if let Some(n) = exact {
        if recipients.len() != n {
            return Err(SealpostError::InvalidInput(format!(
                "send takes exactly {n} recipients, got {}; use send-multiple",
                recipients.len()
            ))
            .into());
        }
    }
    let message = args.message.read()?;
    if let Some(epochs) = args.epochs {
        config.storage_epochs = epochs;
    }
    let expiry_days = args.expiry_days.unwrap_or(config.expiry_days);

    let orchestrator = connect(config)?;
    let record = orchestrator
        .create_and_seal(&sender, &message, &recipients, expiry_days)
        .await?;
    record.save(&args.output)?;
    print_record(&record, &args.output);
    Ok(())
}

async fn cmd_encrypt_existing(args: EncryptExistingArgs) -> anyhow::Result<()> {
    let (mut config, sender) =
        config_with_key(env_var, args.send.key.as_deref(), "SENDER_PRIVATE_KEY")?;
    let policy = parse_address("APOLOGY_ID", &args.policy)?;
    let cap = args
        .cap
        .as_deref()
        .map(|c| parse_address("CAP_ID", c))
        .transpose()?;
    let recipients = parse_recipients(&args.send.recipients)?;
    let message = args.send.message.read()?;
    if let Some(epochs) = args.send.epochs {
        config.storage_epochs = epochs;
    }
    let expiry_days = args.send.expiry_days.unwrap_or(config.expiry_days);

    let orchestrator = connect(config)?;
    let record = orchestrator
        .seal_for_policy(
            policy,
            &message,
            SealTarget {
                owner: &sender,
                cap,
                recipients,
                expiry_days,
            },
        )
        .await?;
    record.save(&args.send.output)?;
    print_record(&record, &args.send.output);
    Ok(())
}

async fn cmd_decrypt(args: DecryptArgs) -> anyhow::Result<()> {
    let config = SealpostConfig::from_env()?;

    let plaintext = match &args.backup_key {
        Some(key) => {
            let blob_id = resolve_blob_id(&args)?;
            connect(config)?.open_with_backup_key(&blob_id, key).await?
        }
        None => {
            let reader = required_key(args.key.as_deref(), "RECIPIENT_PRIVATE_KEY")?;
            let (request, record) = resolve_open_request(&args)?;
            let orchestrator = connect(config)?;
            if let Some(record) = record.as_ref().filter(|r| !r.recipients.is_empty()) {
                if !record.recipients.contains_address(&reader.address()) {
                    warn!(reader = %reader.address(), "reader is not listed in the credentials record");
                }
            }
            orchestrator.open(&reader, &request).await?
        }
    };

    match &args.out {
        Some(path) => {
            fs::write(path, &plaintext)
                .with_context(|| format!("writing plaintext to {}", path.display()))?;
            println!("Decrypted {} bytes to {}", plaintext.len(), path.display());
        }
        None => {
            println!("{}", String::from_utf8_lossy(&plaintext));
        }
    }
    Ok(())
}

async fn cmd_reupload(args: ReuploadArgs) -> anyhow::Result<()> {
    let config = SealpostConfig::from_env()?;
    let record = CredentialsRecord::load(&args.credentials)?;
    let message = args.message.read()?;

    let orchestrator = connect(config)?;
    let updated = orchestrator.reupload(&record, &message, args.epochs).await?;
    let output = args.output.unwrap_or(args.credentials);
    updated.save(&output)?;
    print_record(&updated, &output);
    Ok(())
}

fn cmd_keygen() {
    let keypair = Keypair::generate();
    println!("Address:     {}", keypair.address());
    println!("Private key: {}", hex::encode(keypair.seed()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn connect(config: SealpostConfig) -> anyhow::Result<LiveOrchestrator> {
    let mut rpc = JsonRpcConfig::new(config.endpoints.ledger_rpc.clone());
    rpc.request_timeout = config.call_timeout;
    let ledger = JsonRpcLedger::new(rpc).context("building ledger client")?;

    let key_servers = config
        .key_servers
        .servers()
        .iter()
        .map(|server| HttpKeyServer::new(server.clone(), config.call_timeout))
        .collect::<Result<Vec<_>, _>>()
        .context("building key server clients")?;

    let blobs = WalrusClient::new(WalrusConfig::new(
        config.endpoints.blob_publisher.clone(),
        config.endpoints.blob_aggregator.clone(),
    ))
    .context("building blob store client")?;

    Ok(Orchestrator::new(config, ledger, key_servers, blobs)?)
}

fn required_key(value: Option<&str>, var: &str) -> Result<Keypair, SealpostError> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        SealpostError::Configuration {
            missing: vec![var.to_string()],
        }
    })?;
    Keypair::from_secret_hex(value)
        .map_err(|e| SealpostError::InvalidInput(format!("{var}: {e}")))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Load configuration and a signing key together, so one error lists every
/// unset variable.
fn config_with_key<F>(
    lookup: F,
    key: Option<&str>,
    var: &str,
) -> Result<(SealpostConfig, Keypair), SealpostError>
where
    F: Fn(&str) -> Option<String>,
{
    match (SealpostConfig::from_lookup(lookup), required_key(key, var)) {
        (Ok(config), Ok(keypair)) => Ok((config, keypair)),
        (
            Err(SealpostError::Configuration { mut missing }),
            Err(SealpostError::Configuration { missing: more }),
        ) => {
            missing.extend(more);
            Err(SealpostError::Configuration { missing })
        }
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn parse_address(var: &str, value: &str) -> Result<Address, SealpostError> {
    Address::from_hex(value.trim()).map_err(|e| SealpostError::InvalidInput(format!("{var}: {e}")))
}

/// Accept `name=address` entries and bare addresses, which are named
/// `recipientN` by position.
fn parse_recipients(entries: &[String]) -> Result<Recipients, SealpostError> {
    let mut recipients = Recipients::new();
    for (i, entry) in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()).enumerate() {
        let (name, address) = if entry.contains('=') {
            Recipients::parse_entry(entry)?
        } else {
            (format!("recipient{}", i + 1), parse_address("recipient", entry)?)
        };
        recipients.insert(name, address)?;
    }
    if recipients.len() < 2 {
        return Err(SealpostError::InvalidInput(format!(
            "at least two recipients are required, got {}",
            recipients.len()
        )));
    }
    Ok(recipients)
}

/// Load the credentials record. It is required only when `missing` names
/// settings the flags did not supply.
fn fallback_record(
    args: &DecryptArgs,
    missing: Vec<String>,
) -> Result<Option<CredentialsRecord>, SealpostError> {
    match CredentialsRecord::load(&args.credentials) {
        Ok(record) => Ok(Some(record)),
        Err(_) if missing.is_empty() => Ok(None),
        Err(e) => {
            warn!(path = %args.credentials.display(), error = %e, "credentials file unusable");
            Err(SealpostError::Configuration { missing })
        }
    }
}

fn parse_blob_id(value: &str) -> Result<BlobId, SealpostError> {
    BlobId::new(value).map_err(|e| SealpostError::InvalidInput(format!("WALRUS_BLOB_ID: {e}")))
}

/// Fill in whatever the flags leave out from the credentials record.
fn resolve_open_request(
    args: &DecryptArgs,
) -> Result<(OpenRequest, Option<CredentialsRecord>), SealpostError> {
    let missing = [
        ("APOLOGY_ID", args.policy.is_none()),
        ("DOCUMENT_ID", args.identifier.is_none()),
        ("WALRUS_BLOB_ID", args.blob_id.is_none()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(var, _)| var.to_string())
    .collect();
    let record = fallback_record(args, missing)?;

    let from_record = |what: &str| SealpostError::Configuration {
        missing: vec![what.to_string()],
    };
    let policy = match (&args.policy, &record) {
        (Some(p), _) => parse_address("APOLOGY_ID", p)?,
        (None, Some(r)) => r.policy_id,
        (None, None) => return Err(from_record("APOLOGY_ID")),
    };
    let identifier = match (&args.identifier, &record) {
        (Some(id), _) => MessageIdentifier::from_hex(id.trim())
            .map_err(|e| SealpostError::InvalidInput(format!("DOCUMENT_ID: {e}")))?,
        (None, Some(r)) => r.identifier.clone(),
        (None, None) => return Err(from_record("DOCUMENT_ID")),
    };
    let blob_id = match (&args.blob_id, &record) {
        (Some(b), _) => parse_blob_id(b)?,
        (None, Some(r)) => r.blob_id.clone(),
        (None, None) => return Err(from_record("WALRUS_BLOB_ID")),
    };

    Ok((
        OpenRequest {
            policy,
            identifier,
            blob_id,
        },
        record,
    ))
}

fn resolve_blob_id(args: &DecryptArgs) -> Result<BlobId, SealpostError> {
    if let Some(b) = &args.blob_id {
        return parse_blob_id(b);
    }
    match fallback_record(args, vec!["WALRUS_BLOB_ID".to_string()])? {
        Some(record) => Ok(record.blob_id),
        None => Err(SealpostError::Configuration {
            missing: vec!["WALRUS_BLOB_ID".into()],
        }),
    }
}

fn print_record(record: &CredentialsRecord, path: &Path) {
    println!();
    println!("Sealed message stored");
    println!("  Policy:      {}", record.policy_id);
    if let Some(cap) = &record.cap_id {
        println!("  Owner cap:   {cap}");
    }
    println!("  Identifier:  {}", record.identifier);
    println!("  Blob:        {}", record.blob_id);
    println!("  Expires:     {}", record.expires_at.to_rfc3339());
    println!("  Recipients:");
    for (name, address) in record.recipients.iter() {
        println!("    {name}: {address}");
    }
    println!("  Credentials: {}", path.display());
    if record.backup_key.is_some() {
        println!("This file holds the backup key. Keep it private and share only a reader copy.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const A: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const B: &str = "0x0000000000000000000000000000000000000000000000000000000000000002";

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_parses_recipients_and_message() {
        let cli = Cli::try_parse_from([
            "sealpost",
            "send",
            "--recipient",
            &format!("alice={A}"),
            "--recipient",
            &format!("bob={B}"),
            "--message",
            "hello",
        ])
        .unwrap();
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        let recipients = parse_recipients(&args.recipients).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients.get("bob").unwrap().to_string(), B);
        assert_eq!(args.message.read().unwrap(), b"hello");
    }

    #[test]
    fn test_message_is_required_once() {
        assert!(Cli::try_parse_from(["sealpost", "send-multiple", "--recipient", A]).is_err());
        assert!(Cli::try_parse_from([
            "sealpost",
            "send",
            "--message",
            "a",
            "--message-file",
            "b.txt",
        ])
        .is_err());
    }

    #[test]
    fn test_message_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "from a file").unwrap();
        let args = MessageArgs {
            message: None,
            message_file: Some(path),
        };
        assert_eq!(args.read().unwrap(), b"from a file");
    }

    #[test]
    fn test_bare_addresses_are_named_by_position() {
        let recipients = parse_recipients(&[A.to_string(), B.to_string()]).unwrap();
        let names: Vec<_> = recipients.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["recipient1", "recipient2"]);
        assert!(parse_recipients(&[A.to_string()]).is_err());
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = required_key(None, "SENDER_PRIVATE_KEY").unwrap_err();
        assert!(matches!(err, SealpostError::Configuration { .. }));
        assert!(required_key(Some("zz"), "SENDER_PRIVATE_KEY").is_err());
        assert!(required_key(Some(&"11".repeat(32)), "SENDER_PRIVATE_KEY").is_ok());
    }

    #[test]
    fn test_send_lists_missing_key_with_config() {
        let err = config_with_key(|_| None, None, "SENDER_PRIVATE_KEY").unwrap_err();
        match err {
            SealpostError::Configuration { missing } => {
                assert_eq!(missing, vec!["PACKAGE_ID", "KEY_SERVERS", "SENDER_PRIVATE_KEY"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let env = |key: &str| match key {
            "PACKAGE_ID" => Some(A.to_string()),
            "KEY_SERVERS" => Some(format!("{B}@http://ks1")),
            _ => None,
        };
        let err = config_with_key(env, None, "SENDER_PRIVATE_KEY").unwrap_err();
        assert!(matches!(
            err,
            SealpostError::Configuration { missing } if missing == vec!["SENDER_PRIVATE_KEY"]
        ));

        let key = "11".repeat(32);
        let (config, sender) = config_with_key(env, Some(&key), "SENDER_PRIVATE_KEY").unwrap();
        assert_eq!(config.key_servers.threshold(), 1);
        assert_eq!(sender.address(), Keypair::from_secret_hex(&key).unwrap().address());
    }

    #[test]
    fn test_decrypt_without_flags_or_file_lists_missing() {
        let dir = tempfile::tempdir().unwrap();
        let args = DecryptArgs {
            key: None,
            policy: None,
            identifier: None,
            blob_id: None,
            credentials: dir.path().join("absent.json"),
            backup_key: None,
            out: None,
        };
        match resolve_open_request(&args).unwrap_err() {
            SealpostError::Configuration { missing } => {
                assert_eq!(missing, vec!["APOLOGY_ID", "DOCUMENT_ID", "WALRUS_BLOB_ID"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_backup_path_reads_blob_from_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = DecryptArgs {
            key: None,
            policy: None,
            identifier: None,
            blob_id: None,
            credentials: dir.path().join("absent.json"),
            backup_key: Some("00".repeat(32)),
            out: None,
        };
        assert!(matches!(
            resolve_blob_id(&args),
            Err(SealpostError::Configuration { .. })
        ));
        args.blob_id = Some("blob-9".into());
        assert_eq!(resolve_blob_id(&args).unwrap().as_str(), "blob-9");
    }

    #[test]
    fn test_decrypt_flags_need_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Address::from_hex(A).unwrap();
        let id = MessageIdentifier::from_parts(&policy, &[3; 16]);
        let args = DecryptArgs {
            key: None,
            policy: Some(A.into()),
            identifier: Some(id.to_hex()),
            blob_id: Some("blob-1".into()),
            credentials: dir.path().join("absent.json"),
            backup_key: None,
            out: None,
        };
        let (request, record) = resolve_open_request(&args).unwrap();
        assert!(record.is_none());
        assert_eq!(request.policy, policy);
        assert_eq!(request.identifier, id);
        assert_eq!(request.blob_id.as_str(), "blob-1");
    }
}
