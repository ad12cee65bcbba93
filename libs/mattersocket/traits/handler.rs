//! Event handler seam
//!
//! Every decoded inbound frame, including the handshake replies, is handed
//! to the caller's handler in its own task.

use crate::event::EventEnvelope;
use async_trait::async_trait;
use std::future::Future;

/// Caller-supplied consumer of websocket events
///
/// Handlers run concurrently: a slow handler never stalls the receive loop,
/// and completion order across events is not guaranteed.
///
/// # Example
///
/// ```ignore
/// client
///     .connect(|event: EventEnvelope| async move {
///         if event.is_event("posted") {
///             info!("New post: {:?}", event.data());
///         }
///     })
///     .await;
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event
    async fn handle(&self, event: EventEnvelope);
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, event: EventEnvelope) {
        (self)(event).await
    }
}
