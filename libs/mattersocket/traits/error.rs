use std::time::Duration;
use thiserror::Error;

/// Main error type for mattersocket
#[derive(Error, Debug)]
pub enum MatterSocketError {
    /// Opening the websocket failed (DNS, TLS, proxy or HTTP upgrade)
    #[error("Failed to open websocket: {0}")]
    Connect(String),

    /// No handshake reply arrived in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The server answered the challenge with something other than an acknowledgement
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// An inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// WebSocket I/O error on an established session
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed by the peer
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl MatterSocketError {
    /// True for both handshake timeouts and explicit rejections
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            MatterSocketError::HandshakeTimeout(_) | MatterSocketError::HandshakeRejected(_)
        )
    }

    /// Whether the supervisor may fold this error into its retry decision.
    ///
    /// Only configuration and internal channel errors are permanent.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            MatterSocketError::Configuration(_) | MatterSocketError::ChannelSend(_)
        )
    }
}

impl From<serde_json::Error> for MatterSocketError {
    fn from(err: serde_json::Error) -> Self {
        MatterSocketError::Decode(err.to_string())
    }
}

/// Result type for mattersocket operations
pub type Result<T> = std::result::Result<T, MatterSocketError>;
