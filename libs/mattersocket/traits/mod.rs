//! # MatterSocket Traits
//!
//! Error type and the pluggable seams of the event client:
//!
//! - **Transport / Session**: open and drive a websocket connection
//! - **AuthProvider**: the challenge/response handshake
//! - **EventHandler**: the caller's consumer of decoded events
//! - **ReconnectionStrategy**: retry-or-terminate policy

pub mod auth;
pub mod error;
pub mod handler;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use auth::{AuthProvider, AuthVerdict, TokenChallenge};
pub use error::{MatterSocketError, Result};
pub use handler::EventHandler;
pub use reconnect::{FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Session, Transport, WsMessage};
