use thiserror::Error;

/// Errors from the UDP transport layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Bind or resolution failure at startup. Fatal: the collector cannot
    /// serve without its socket.
    #[error("network configuration error: {0}")]
    Config(String),
}
