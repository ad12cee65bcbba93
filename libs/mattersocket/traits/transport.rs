use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A single websocket frame
///
/// Data frames carry events; control frames only count as liveness evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Check if message is a ping or pong
    pub fn is_control(&self) -> bool {
        matches!(self, WsMessage::Ping(_) | WsMessage::Pong(_))
    }
}

/// Opens sessions to the configured websocket endpoint
///
/// The default implementation is [`crate::core::tungstenite::TungsteniteTransport`];
/// tests substitute scripted in-memory transports.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new session
    ///
    /// Failures here (DNS, TLS, upgrade rejection) must be reported as
    /// `MatterSocketError::Connect`.
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>>;
}

/// One open duplex websocket connection
///
/// `recv` is called from the receive loop while `send`/`ping` may be called
/// concurrently from the heartbeat task, so implementations must not hold a
/// single lock across both directions.
#[async_trait]
pub trait Session: Send + Sync {
    /// Send a frame
    async fn send(&self, message: WsMessage) -> Result<()>;

    /// Receive the next frame
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - A frame arrived
    /// * `Ok(None)` - The peer closed the connection
    /// * `Err(_)` - Transport error
    async fn recv(&self) -> Result<Option<WsMessage>>;

    /// Send a keepalive probe
    async fn ping(&self) -> Result<()> {
        self.send(WsMessage::Ping(Vec::new())).await
    }

    /// Close the session. Calling this more than once is a no-op.
    async fn close(&self);
}
