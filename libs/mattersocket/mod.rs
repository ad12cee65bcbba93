//! # MatterSocket
//!
//! Real-time event client for Mattermost servers.
//!
//! Opens the server's websocket, authenticates it with a bearer token,
//! hands every event to a caller-supplied handler without blocking the
//! receive loop, keeps idle connections alive with pings and reconnects
//! after failures when configured to stay connected.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mattersocket::{EventClient, EventEnvelope, ServerOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mattersocket::Result<()> {
//!     let options = ServerOptions::load("config/listener.yaml")?;
//!     let client = Arc::new(EventClient::builder().options(&options)?.build()?);
//!
//!     let listener = Arc::clone(&client);
//!     let task = tokio::spawn(async move {
//!         listener
//!             .connect(|event: EventEnvelope| async move {
//!                 println!("{:?}: {:?}", event.event(), event.data());
//!             })
//!             .await
//!     });
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     client.disconnect();
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use crate::core::{
    builder, client, config, connection_state, dispatcher, event, handshake, heartbeat,
    tungstenite,
    builder::{states, EventClientBuilder},
    client::{ClientEvent, EventClient, ExitReason},
    config::{ConnectionConfig, DataFormat, ServerOptions, WebSocketOptions},
    connection_state::{AtomicMetrics, ConnectionState, ConnectionStatus, Metrics},
    event::{EventEnvelope, Hello, Payload},
    tungstenite::{TungsteniteSession, TungsteniteTransport},
};

/// Create a new event client builder
pub fn builder() -> EventClientBuilder<states::NoConfig> {
    EventClientBuilder::new()
}
