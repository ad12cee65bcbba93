//! Event client core
//!
//! ```text
//! EventClient::connect
//!   └─ loop while alive
//!        ├─ Transport::open ─────────────▶ Session
//!        ├─ handshake::authenticate ─────▶ every reply forwarded to the handler
//!        ├─ EventDispatcher::run  ┐
//!        │                        ├─ concurrently, until the session ends
//!        ├─ heartbeat_task        ┘
//!        ├─ Session::close
//!        └─ retry after keepalive delay, or stop
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod event;
pub mod handshake;
pub mod heartbeat;
pub mod tungstenite;

// Re-export main types
pub use builder::{states, EventClientBuilder};
pub use client::{ClientEvent, EventClient, ExitReason};
pub use config::{ConnectionConfig, DataFormat, ServerOptions, WebSocketOptions};
pub use connection_state::{AtomicMetrics, ConnectionState, ConnectionStatus, Metrics};
pub use event::{EventEnvelope, Hello, Payload};
pub use tungstenite::{TungsteniteSession, TungsteniteTransport};
