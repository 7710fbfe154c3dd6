use thiserror::Error;

/// Errors produced by the heartbeat protocol layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope failed validation: truncation, bad magic, tag mismatch,
    /// decompression or payload parse failure. The packet must be dropped
    /// without acting on any of its content.
    #[error("envelope integrity failure: {0}")]
    Integrity(String),

    /// An outbound payload could not be serialized.
    #[error("payload encoding failure: {0}")]
    Payload(String),
}
