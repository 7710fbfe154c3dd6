//! Symmetric heartbeat envelope: wrap, unwrap, fail closed.
//!
//! Layout: `[4-byte magic "FP01"][16-byte salt][zlib(JSON payload)][32-byte
//! HMAC-SHA256 tag]`. The tag key is derived per envelope from the shared
//! secret and the salt; the tag covers everything before it. Verification
//! happens before any decompression or parsing, so a tampered packet is
//! never interpreted.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::ProtocolError;
use crate::message::HeartbeatMessage;

type HmacSha256 = Hmac<Sha256>;

pub const ENVELOPE_MAGIC: [u8; 4] = *b"FP01";
pub const SALT_LEN: usize = 16;
pub const TAG_LEN: usize = 32;

/// Smallest structurally valid envelope: header plus empty body plus tag.
const MIN_ENVELOPE_LEN: usize = ENVELOPE_MAGIC.len() + SALT_LEN + TAG_LEN;

/// Serialize, compress and authenticate a heartbeat payload.
///
/// The key must be looked up fresh by the caller for every wrap; it may
/// rotate at runtime.
pub fn wrap(payload: &HeartbeatMessage, key: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| ProtocolError::Payload(format!("encode heartbeat: {e}")))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| ProtocolError::Payload(format!("compress heartbeat: {e}")))?;
    let body = encoder
        .finish()
        .map_err(|e| ProtocolError::Payload(format!("compress heartbeat: {e}")))?;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut envelope = Vec::with_capacity(MIN_ENVELOPE_LEN + body.len());
    envelope.extend_from_slice(&ENVELOPE_MAGIC);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&body);

    let mut mac = tag_mac(key, &salt)
        .map_err(|e| ProtocolError::Payload(format!("tag key setup: {e}")))?;
    mac.update(&envelope);
    envelope.extend_from_slice(&mac.finalize().into_bytes());
    Ok(envelope)
}

/// Validate and decode a received envelope.
///
/// Any failure (truncation, bad magic, tag mismatch, decompression or
/// parse error) is a [`ProtocolError::Integrity`] and the packet must be
/// dropped without further processing.
pub fn unwrap(envelope: &[u8], key: &[u8]) -> Result<HeartbeatMessage, ProtocolError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(ProtocolError::Integrity(format!(
            "short envelope: {} bytes",
            envelope.len()
        )));
    }
    let (signed, tag) = envelope.split_at(envelope.len() - TAG_LEN);
    if signed[..ENVELOPE_MAGIC.len()] != ENVELOPE_MAGIC {
        return Err(ProtocolError::Integrity("bad envelope magic".into()));
    }
    let salt = &signed[ENVELOPE_MAGIC.len()..ENVELOPE_MAGIC.len() + SALT_LEN];

    let mut mac = tag_mac(key, salt)
        .map_err(|e| ProtocolError::Integrity(format!("tag key setup: {e}")))?;
    mac.update(signed);
    mac.verify_slice(tag)
        .map_err(|_| ProtocolError::Integrity("envelope tag mismatch".into()))?;

    let body = &signed[ENVELOPE_MAGIC.len() + SALT_LEN..];
    let mut json = Vec::new();
    ZlibDecoder::new(body)
        .read_to_end(&mut json)
        .map_err(|e| ProtocolError::Integrity(format!("decompress heartbeat: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| ProtocolError::Integrity(format!("decode heartbeat: {e}")))
}

/// Per-envelope tag key: HMAC-SHA256(shared_secret, salt). Salting keeps
/// equal payloads from producing equal tags across packets.
fn tag_mac(key: &[u8], salt: &[u8]) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    let mut kdf = HmacSha256::new_from_slice(key)?;
    kdf.update(salt);
    let derived = kdf.finalize().into_bytes();
    HmacSha256::new_from_slice(&derived)
}
