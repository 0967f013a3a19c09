//! Canonical CBOR encoding and signing domains.
//!
//! Everything that is signed or hashed (transactions, session requests,
//! encrypted objects) is encoded with ciborium. Struct fields are emitted in
//! declaration order with definite lengths, so the encoding of a given value
//! is stable across runs.
//!
//! Every signature is taken over `DOMAIN ‖ bytes` so a signature for one
//! purpose can never be replayed as another.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Domain prefix for human-readable personal messages (session challenges).
pub const PERSONAL_MESSAGE_DOMAIN: &[u8] = b"sealpost/personal-message/v1";

/// Domain prefix for ledger transactions.
pub const TRANSACTION_DOMAIN: &[u8] = b"sealpost/transaction/v1";

/// Domain prefix for key-server requests signed by a session key.
pub const REQUEST_DOMAIN: &[u8] = b"sealpost/key-request/v1";

/// Encode a value to CBOR bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

fn with_domain(domain: &[u8], body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(domain.len() + body.len());
    msg.extend_from_slice(domain);
    msg.extend_from_slice(body);
    msg
}

/// Bytes an identity signs to approve a personal message.
pub fn personal_message_bytes(message: &[u8]) -> Vec<u8> {
    with_domain(PERSONAL_MESSAGE_DOMAIN, message)
}

/// Bytes a sender signs to authorize a transaction.
pub fn transaction_signing_bytes(tx_bytes: &[u8]) -> Vec<u8> {
    with_domain(TRANSACTION_DOMAIN, tx_bytes)
}

/// Bytes a session key signs to authenticate a key-server request.
pub fn request_signing_bytes(request_body: &[u8]) -> Vec<u8> {
    with_domain(REQUEST_DOMAIN, request_body)
}
