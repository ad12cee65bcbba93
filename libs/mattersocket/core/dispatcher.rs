//! Event dispatch
//!
//! # Architecture
//!
//! ```text
//! Session::recv ──▶ decode ──▶ Unbounded Queue ──▶ Pump Task ──▶ tokio::spawn(handler)
//!   (receive loop)                                (in order)     (one task per event)
//! ```
//!
//! The receive loop never waits on a handler. The pump takes events off the
//! queue in arrival order and spawns one task per event; handler tasks may
//! finish in any order. With `handler_concurrency` set, the pump first waits
//! for a semaphore permit, which bounds the tasks in flight without changing
//! the dispatch order.

use crate::config::DataFormat;
use crate::connection_state::{AtomicMetrics, ConnectionState};
use crate::error::{MatterSocketError, Result};
use crate::event::EventEnvelope;
use crate::handler::EventHandler;
use crate::transport::Session;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// Queue and pump task delivering events to one handler
pub struct EventDispatcher {
    queue_tx: mpsc::UnboundedSender<EventEnvelope>,
    pump: JoinHandle<()>,
    metrics: Arc<AtomicMetrics>,
}

impl EventDispatcher {
    /// Spawn the pump task for `handler`
    ///
    /// # Arguments
    /// * `handler` - Receives every dispatched event
    /// * `concurrency` - Maximum handler tasks in flight (None = unbounded)
    /// * `metrics` - Counters updated per dispatched event
    pub fn spawn(
        handler: Arc<dyn EventHandler>,
        concurrency: Option<usize>,
        metrics: Arc<AtomicMetrics>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let limit = concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let pump = tokio::spawn(pump_events(queue_rx, handler, limit).in_current_span());

        Self {
            queue_tx,
            pump,
            metrics,
        }
    }

    /// Queue one event for its handler task
    pub fn dispatch(&self, event: EventEnvelope) -> Result<()> {
        self.queue_tx
            .send(event)
            .map_err(|e| MatterSocketError::ChannelSend(e.to_string()))?;
        self.metrics.increment_dispatched();
        Ok(())
    }

    /// Receive loop for one authenticated session
    ///
    /// Returns `Ok(())` once `state` is no longer alive, or the error that
    /// ended the session. A frame that fails to decode is logged and dropped.
    pub async fn run(
        &self,
        session: &dyn Session,
        state: &ConnectionState,
        format: DataFormat,
    ) -> Result<()> {
        debug!("Waiting for messages on websocket");

        while state.is_alive() {
            let frame = match session.recv().await? {
                Some(frame) => frame,
                None => {
                    warn!("WebSocket stream closed");
                    return Err(MatterSocketError::ConnectionClosed("stream ended".into()));
                }
            };

            state.touch();
            self.metrics.increment_received();

            match EventEnvelope::decode(frame, format) {
                Ok(Some(event)) => self.dispatch(event)?,
                Ok(None) => {}
                Err(e) => {
                    self.metrics.increment_decode_errors();
                    warn!(error = %e, "Dropping undecodable frame");
                }
            }
        }

        debug!("Client no longer alive, leaving receive loop");
        Ok(())
    }

    /// Stop accepting events and wait until every queued event has been
    /// handed to a handler task
    pub async fn shutdown(self) {
        drop(self.queue_tx);
        if let Err(e) = self.pump.await {
            warn!("Dispatcher pump ended abnormally: {}", e);
        }
    }
}

async fn pump_events(
    mut queue_rx: mpsc::UnboundedReceiver<EventEnvelope>,
    handler: Arc<dyn EventHandler>,
    limit: Option<Arc<Semaphore>>,
) {
    while let Some(event) = queue_rx.recv().await {
        let permit = match &limit {
            Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => break,
            },
            None => None,
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(
            async move {
                handler.handle(event).await;
                drop(permit);
            }
            .in_current_span(),
        );
    }

    debug!("Dispatcher queue closed");
}
