//! Heartbeat mechanism for websocket sessions
//!
//! # Architecture
//!
//! The heartbeat runs as its own Tokio task next to the receive loop and
//! shares the session and the [`ConnectionState`] with it:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Heartbeat Task              │
//! │                              │
//! │  idle = now - last_message   │
//! │  idle < timeout?             │
//! │    yes: sleep(timeout-idle)  │
//! │    no:  ping, touch ─────────┼──> Session ──> server
//! └──────────────────────────────┘
//! ```
//!
//! Every received frame touches the state, so pings only go out when the
//! connection has actually been silent for a full idle timeout.

use crate::connection_state::{AtomicMetrics, ConnectionState};
use crate::transport::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// Idle-driven heartbeat loop
///
/// Never returns on its own; the owner aborts it when the session ends.
/// A failed ping is logged and swallowed: a dead peer surfaces as a receive
/// error in the receive loop.
pub async fn heartbeat_task(
    session: Arc<dyn Session>,
    state: Arc<ConnectionState>,
    idle_timeout: Duration,
    metrics: Arc<AtomicMetrics>,
) {
    debug!("Heartbeat task started with idle timeout: {:?}", idle_timeout);

    loop {
        let idle = state.since_last_message();
        if idle < idle_timeout {
            tokio::time::sleep(idle_timeout - idle).await;
            continue;
        }

        debug!("Sending heartbeat");
        match session.ping().await {
            Ok(()) => metrics.increment_heartbeats(),
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
        // Reset even on failure so a broken socket is not pinged in a tight loop
        state.touch();
    }
}

/// Aborts the heartbeat task when dropped
pub struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a heartbeat task for one session
pub fn spawn_heartbeat(
    session: Arc<dyn Session>,
    state: Arc<ConnectionState>,
    idle_timeout: Duration,
    metrics: Arc<AtomicMetrics>,
) -> HeartbeatGuard {
    let handle = tokio::spawn(
        heartbeat_task(session, state, idle_timeout, metrics).in_current_span(),
    );
    HeartbeatGuard { handle }
}
