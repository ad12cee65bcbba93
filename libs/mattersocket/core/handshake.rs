//! Challenge/response authentication over a freshly opened session
//!
//! ```text
//! client                          server
//!   │ {"seq":1,"action":"authentication_challenge",...}
//!   │ ──────────────────────────────▶ │
//!   │ ◀────────────────────────────── │ {"event":"hello","seq":0,...}   (accepted)
//!   │ ◀────────────────────────────── │ {"status":"OK","seq_reply":1}   (accepted)
//! ```
//!
//! Every decoded reply is forwarded to the caller before it is evaluated,
//! because servers may greet with `hello` ahead of the explicit acknowledgement.

use crate::auth::{AuthProvider, AuthVerdict};
use crate::config::{ConnectionConfig, DataFormat};
use crate::error::{MatterSocketError, Result};
use crate::event::EventEnvelope;
use crate::transport::Session;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounds applied while waiting for the handshake reply
#[derive(Debug, Clone, Copy)]
pub struct HandshakePolicy {
    /// Maximum wait for each reply frame
    pub timeout: Duration,
    /// Maximum frames inspected, control frames included
    pub max_frames: usize,
    pub format: DataFormat,
}

impl HandshakePolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            timeout: config.handshake_timeout(),
            max_frames: config.max_handshake_frames(),
            format: config.data_format(),
        }
    }
}

/// Authenticate `session`, forwarding every decoded reply through `forward`
///
/// # Errors
/// * `HandshakeTimeout` - No frame arrived within the policy timeout
/// * `HandshakeRejected` - A reply was not an acknowledgement, could not be
///   decoded, or the frame budget ran out
/// * `ConnectionClosed` / `WebSocket` - The transport failed mid-handshake
pub async fn authenticate<F>(
    session: &dyn Session,
    auth: &dyn AuthProvider,
    policy: &HandshakePolicy,
    mut forward: F,
) -> Result<()>
where
    F: FnMut(EventEnvelope) -> Result<()>,
{
    debug!("Authenticating websocket");
    let challenge = auth.challenge().await?;
    session.send(challenge).await?;

    for _ in 0..policy.max_frames {
        let frame = match tokio::time::timeout(policy.timeout, session.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                return Err(MatterSocketError::ConnectionClosed(
                    "closed during handshake".into(),
                ))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(MatterSocketError::HandshakeTimeout(policy.timeout)),
        };

        let envelope = match EventEnvelope::decode(frame, policy.format) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(e) => {
                return Err(MatterSocketError::HandshakeRejected(format!(
                    "undecodable reply: {e}"
                )))
            }
        };

        forward(envelope.clone())?;

        let verdict = match envelope.structured() {
            Ok(value) => auth.evaluate(&value),
            Err(e) => AuthVerdict::Rejected(format!("reply is not JSON: {e}")),
        };

        return match verdict {
            AuthVerdict::Accepted => {
                info!("Websocket authentication OK");
                Ok(())
            }
            AuthVerdict::Rejected(reason) => {
                warn!(%reason, "Websocket authentication failed");
                Err(MatterSocketError::HandshakeRejected(reason))
            }
        };
    }

    Err(MatterSocketError::HandshakeRejected(format!(
        "no acknowledgement within {} frames",
        policy.max_frames
    )))
}
