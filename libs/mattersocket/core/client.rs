use crate::auth::{AuthProvider, TokenChallenge};
use crate::builder::{states::NoConfig, EventClientBuilder};
use crate::config::ConnectionConfig;
use crate::connection_state::{AtomicMetrics, ConnectionState, ConnectionStatus, Metrics};
use crate::dispatcher::EventDispatcher;
use crate::error::{MatterSocketError, Result};
use crate::handler::EventHandler;
use crate::handshake::{self, HandshakePolicy};
use crate::heartbeat::spawn_heartbeat;
use crate::reconnect::ReconnectionStrategy;
use crate::transport::{Session, Transport};
use crate::tungstenite::TungsteniteTransport;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Lifecycle notifications from the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A session was opened and authenticated
    Connected,
    /// An authenticated session ended
    Disconnected,
    /// Reconnecting (attempt number)
    Reconnecting(usize),
    /// A session failed
    Error(String),
}

/// Why [`EventClient::connect`] returned
#[derive(Debug)]
pub enum ExitReason {
    /// `disconnect()` was called
    Disconnected,
    /// The server closed the last session and no retry was configured
    SessionEnded,
    /// The last attempt failed and no retry was configured
    Failed(MatterSocketError),
}

/// Result of one open/authenticate/receive cycle
struct SessionReport {
    authenticated: bool,
    result: Result<()>,
}

/// Real-time event client for one Mattermost server
///
/// Owns the connection lifecycle: open a session, authenticate it, dispatch
/// events and send heartbeats until the session fails, then retry or stop
/// according to the stay-connected setting.
///
/// `connect` takes `&self`, so the client is usually shared through an `Arc`
/// with whoever calls `disconnect`. Only one `connect` call should run at a time.
pub struct EventClient {
    config: RwLock<Arc<ConnectionConfig>>,
    transport: Arc<dyn Transport>,
    /// Custom handshake; the token challenge from the config when unset
    auth: Option<Arc<dyn AuthProvider>>,
    /// Custom retry policy; derived from stay-connected when unset
    reconnect: Option<Arc<dyn ReconnectionStrategy>>,
    state: Arc<ConnectionState>,
    metrics: Arc<AtomicMetrics>,
    event_tx: Sender<ClientEvent>,
    event_rx: Receiver<ClientEvent>,
    span: Span,
}

impl EventClient {
    /// Start building a client
    pub fn builder() -> EventClientBuilder<NoConfig> {
        EventClientBuilder::new()
    }

    /// Client over the default tungstenite transport
    pub fn new(config: ConnectionConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(TungsteniteTransport::new()),
            None,
            None,
            None,
        )
    }

    pub(crate) fn from_parts(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        auth: Option<Arc<dyn AuthProvider>>,
        reconnect: Option<Arc<dyn ReconnectionStrategy>>,
        parent_span: Option<Span>,
    ) -> Self {
        let span = match parent_span {
            Some(parent) => {
                tracing::info_span!(parent: &parent, "event_client", url = %config.url())
            }
            None => tracing::info_span!("event_client", url = %config.url()),
        };
        let (event_tx, event_rx) = unbounded();

        Self {
            config: RwLock::new(Arc::new(config)),
            transport,
            auth,
            reconnect,
            state: Arc::new(ConnectionState::new()),
            metrics: Arc::new(AtomicMetrics::new()),
            event_tx,
            event_rx,
            span,
        }
    }

    /// Listen for events until disconnected or until a failure ends the
    /// client for good
    ///
    /// Every decoded frame, handshake replies included, reaches `handler` in
    /// its own task. Failures never escape: with stay-connected enabled they
    /// only delay the event stream, otherwise the first one ends the call and
    /// is reported in the returned [`ExitReason`].
    pub async fn connect<H>(&self, handler: H) -> ExitReason
    where
        H: EventHandler,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        self.supervise(handler).instrument(self.span.clone()).await
    }

    /// Ask the running `connect` call to stop
    ///
    /// Idempotent and callable from any task or thread. The session is closed
    /// at the supervisor's next checkpoint, not before this returns.
    pub fn disconnect(&self) {
        if self.state.disconnect() {
            info!(parent: &self.span, "Disconnect requested");
        }
    }

    /// Use `token` for the next session
    ///
    /// The running session keeps its credentials. Has no effect on a custom
    /// [`AuthProvider`].
    pub fn update_token(&self, token: impl Into<String>) {
        let mut config = self.config.write();
        *config = Arc::new(config.with_token(token));
    }

    /// Configuration the next session will use
    pub fn config(&self) -> Arc<ConnectionConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ClientEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    async fn supervise(&self, handler: Arc<dyn EventHandler>) -> ExitReason {
        let initial = self.config();
        self.state.start();

        let dispatcher = EventDispatcher::spawn(
            handler,
            initial.handler_concurrency(),
            Arc::clone(&self.metrics),
        );
        let strategy: Arc<dyn ReconnectionStrategy> = match &self.reconnect {
            Some(strategy) => Arc::clone(strategy),
            None => Arc::from(initial.reconnect_strategy()),
        };
        let mut attempt = 0;

        let reason = loop {
            if !self.state.is_alive() {
                break ExitReason::Disconnected;
            }

            self.state.set_status(if attempt == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            });
            if attempt > 0 {
                let _ = self.event_tx.send(ClientEvent::Reconnecting(attempt));
            }

            let config = self.config();
            let report = self.run_session(&config, &dispatcher).await;

            if report.authenticated {
                attempt = 0;
                let _ = self.event_tx.send(ClientEvent::Disconnected);
            }
            if let Err(e) = &report.result {
                self.log_failure(e);
                let _ = self.event_tx.send(ClientEvent::Error(e.to_string()));
            }

            if !self.state.is_alive() {
                break ExitReason::Disconnected;
            }

            let result = match report.result {
                Err(e) if !e.is_recoverable() => break ExitReason::Failed(e),
                result => result,
            };

            let Some(delay) = strategy.next_delay(attempt) else {
                break match result {
                    Ok(()) | Err(MatterSocketError::ConnectionClosed(_)) => ExitReason::SessionEnded,
                    Err(e) => ExitReason::Failed(e),
                };
            };

            info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
            self.state.set_status(ConnectionStatus::Reconnecting);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.state.wait_for_disconnect() => {
                    debug!("Disconnect requested during reconnection delay");
                    break ExitReason::Disconnected;
                }
            }

            attempt += 1;
            self.metrics.increment_reconnects();
        };

        self.state.set_status(ConnectionStatus::Stopped);
        dispatcher.shutdown().await;
        info!(?reason, "Event client stopped");
        reason
    }

    /// One full session: open, authenticate, receive until it ends
    ///
    /// The session is closed on every path once opened.
    async fn run_session(
        &self,
        config: &ConnectionConfig,
        dispatcher: &EventDispatcher,
    ) -> SessionReport {
        let session = tokio::select! {
            opened = self.transport.open(config) => match opened {
                Ok(session) => session,
                Err(e) => {
                    return SessionReport {
                        authenticated: false,
                        result: Err(e),
                    }
                }
            },
            _ = self.state.wait_for_disconnect() => {
                debug!("Disconnect requested while opening session");
                return SessionReport {
                    authenticated: false,
                    result: Ok(()),
                };
            }
        };

        let mut authenticated = false;
        let result = tokio::select! {
            result = self.drive_session(&session, config, dispatcher, &mut authenticated) => result,
            _ = self.state.wait_for_disconnect() => {
                debug!("Disconnect requested, closing session");
                Ok(())
            }
        };

        session.close().await;
        SessionReport {
            authenticated,
            result,
        }
    }

    async fn drive_session(
        &self,
        session: &Arc<dyn Session>,
        config: &ConnectionConfig,
        dispatcher: &EventDispatcher,
        authenticated: &mut bool,
    ) -> Result<()> {
        self.state.set_status(ConnectionStatus::Authenticating);

        let auth: Arc<dyn AuthProvider> = match &self.auth {
            Some(auth) => Arc::clone(auth),
            None => Arc::new(TokenChallenge::new(config.token())),
        };
        let policy = HandshakePolicy::from_config(config);
        handshake::authenticate(session.as_ref(), auth.as_ref(), &policy, |event| {
            dispatcher.dispatch(event)
        })
        .await?;

        *authenticated = true;
        self.state.touch();
        self.state.set_status(ConnectionStatus::Connected);
        let _ = self.event_tx.send(ClientEvent::Connected);

        let _heartbeat = spawn_heartbeat(
            Arc::clone(session),
            Arc::clone(&self.state),
            config.idle_timeout(),
            Arc::clone(&self.metrics),
        );

        dispatcher
            .run(session.as_ref(), &self.state, config.data_format())
            .await
    }

    fn log_failure(&self, e: &MatterSocketError) {
        if e.is_handshake_failure() {
            self.metrics.increment_handshake_failures();
        }

        match e {
            MatterSocketError::HandshakeTimeout(after) => {
                warn!("Handshake timed out after {:?}", after)
            }
            MatterSocketError::HandshakeRejected(reason) => {
                error!("Handshake rejected: {}", reason)
            }
            MatterSocketError::Connect(reason) => error!("Failed to connect: {}", reason),
            MatterSocketError::ConnectionClosed(reason) => {
                warn!("Connection closed: {}", reason)
            }
            other => error!("Connection error: {}", other),
        }
    }
}
