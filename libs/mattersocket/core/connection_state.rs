//! Shared connection state
//!
//! [`ConnectionState`] is the only record mutated by more than one task: the
//! receive loop and the heartbeat monitor both update the last-message time,
//! and any caller may clear `alive` through `disconnect`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Lifecycle phase of the event client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    Idle = 0,
    Connecting = 1,
    Authenticating = 2,
    Connected = 3,
    Reconnecting = 4,
    Stopped = 5,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Authenticating,
            3 => ConnectionStatus::Connected,
            4 => ConnectionStatus::Reconnecting,
            5 => ConnectionStatus::Stopped,
            _ => ConnectionStatus::Idle,
        }
    }
}

/// Alive flag, liveness clock and status of one client
pub struct ConnectionState {
    alive: AtomicBool,
    last_message: Mutex<Instant>,
    status: AtomicU8,
    disconnect_notify: Notify,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            last_message: Mutex::new(Instant::now()),
            status: AtomicU8::new(ConnectionStatus::Idle as u8),
            disconnect_notify: Notify::new(),
        }
    }

    /// Mark the client alive at the start of a connect call
    pub fn start(&self) {
        self.touch();
        self.alive.store(true, Ordering::Release);
    }

    /// Clear the alive flag and wake every waiter
    ///
    /// Returns `true` only for the call that actually flipped the flag, so
    /// repeated calls are harmless.
    pub fn disconnect(&self) -> bool {
        let flipped = self.alive.swap(false, Ordering::AcqRel);
        self.disconnect_notify.notify_waiters();
        flipped
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record liveness evidence
    #[inline]
    pub fn touch(&self) {
        *self.last_message.lock() = Instant::now();
    }

    pub fn last_message(&self) -> Instant {
        *self.last_message.lock()
    }

    pub fn since_last_message(&self) -> Duration {
        self.last_message().elapsed()
    }

    /// Resolve once `alive` is false
    ///
    /// The waiter is registered before the flag is checked, so a disconnect
    /// racing with this call is never missed.
    pub async fn wait_for_disconnect(&self) {
        loop {
            let notified = self.disconnect_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_alive() {
                return;
            }
            notified.await;
        }
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub frames_received: u64,
    pub events_dispatched: u64,
    pub decode_errors: u64,
    pub heartbeats_sent: u64,
    pub handshake_failures: u64,
    pub reconnect_count: u64,
}

/// Lock-free counters behind [`Metrics`]
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_received: AtomicU64,
    events_dispatched: AtomicU64,
    decode_errors: AtomicU64,
    heartbeats_sent: AtomicU64,
    handshake_failures: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_heartbeats(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_handshake_failures(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_disconnect_is_idempotent() {
        let state = ConnectionState::new();
        state.start();
        assert!(state.is_alive());

        assert!(state.disconnect());
        assert!(!state.disconnect());
        assert!(!state.disconnect());
        assert!(!state.is_alive());
    }

    #[test]
    fn test_status_round_trip() {
        let state = ConnectionState::new();
        assert_eq!(state.status(), ConnectionStatus::Idle);

        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Stopped,
        ] {
            state.set_status(status);
            assert_eq!(state.status(), status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_clock() {
        let state = ConnectionState::new();
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(state.since_last_message(), Duration::from_secs(7));

        state.touch();
        assert_eq!(state.since_last_message(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_for_disconnect_wakes_up() {
        let state = Arc::new(ConnectionState::new());
        state.start();

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_for_disconnect().await })
        };

        tokio::task::yield_now().await;
        state.disconnect();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_disconnect_returns_when_not_alive() {
        let state = ConnectionState::new();
        tokio::time::timeout(Duration::from_millis(100), state.wait_for_disconnect())
            .await
            .expect("already disconnected");
    }

    #[test]
    fn test_concurrent_metrics() {
        let metrics = Arc::new(AtomicMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.increment_received();
                        metrics.increment_dispatched();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 8000);
        assert_eq!(snapshot.events_dispatched, 8000);
        assert_eq!(snapshot.reconnect_count, 0);
    }
}
