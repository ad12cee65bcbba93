//! Common test utilities for MatterSocket integration tests
//!
//! Two kinds of peers are provided:
//!
//! - [`MockMattermostServer`]: a real websocket server on `127.0.0.1:0` that
//!   answers the authentication challenge with a scripted [`Reaction`]
//! - [`ScriptedTransport`]: an in-memory transport driven through tokio
//!   channels, for deterministic tests under paused time

#![allow(dead_code)]

use async_trait::async_trait;
use mattersocket::{ConnectionConfig, EventEnvelope, MatterSocketError, Session, Transport, WsMessage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub fn hello_frame() -> Value {
    json!({
        "event": "hello",
        "seq": 0,
        "data": {"connection_id": "abc", "server_version": "9.0"},
        "broadcast": {"user_id": "u1"}
    })
}

pub fn posted_frame(seq: i64) -> Value {
    json!({
        "event": "posted",
        "seq": seq,
        "data": {"channel_id": "c1", "post": "{\"message\":\"hi\"}"}
    })
}

/// Handler that forwards every event into a channel, plus the receiving end
pub fn channel_handler() -> (
    impl Fn(EventEnvelope) -> futures::future::Ready<()> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<EventEnvelope>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |event: EventEnvelope| {
        let _ = tx.send(event);
        futures::future::ready(())
    };
    (handler, rx)
}

/// How the mock server answers the authentication challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Greet with `hello` (implicit acknowledgement)
    Hello,
    /// Explicit `{"status":"OK","seq_reply":1}`
    AckOk,
    /// `{"status":"FAIL"}`
    Reject,
}

/// A mock Mattermost websocket endpoint
pub struct MockMattermostServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    connections: Arc<AtomicUsize>,
    challenges: Arc<Mutex<Vec<Value>>>,
}

impl MockMattermostServer {
    /// Start a server that reacts to every challenge with `reaction`, then
    /// pushes `follow_up` frames in order
    pub async fn start(reaction: Reaction, follow_up: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let connections = Arc::new(AtomicUsize::new(0));
        let challenges = Arc::new(Mutex::new(Vec::new()));

        {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            let challenges = Arc::clone(&challenges);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    connections.fetch_add(1, Ordering::SeqCst);
                                    let shutdown = Arc::clone(&shutdown);
                                    let challenges = Arc::clone(&challenges);
                                    let follow_up = follow_up.clone();
                                    tokio::spawn(async move {
                                        Self::handle_connection(stream, reaction, follow_up, challenges, shutdown).await;
                                    });
                                }
                                Err(e) => {
                                    eprintln!("Accept error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            connections,
            challenges,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        reaction: Reaction,
        follow_up: Vec<Value>,
        challenges: Arc<Mutex<Vec<Value>>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        // First data frame is the challenge
        let challenge = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                _ => return,
            }
        };
        challenges
            .lock()
            .push(serde_json::from_str(&challenge).unwrap_or(Value::Null));

        let reply = match reaction {
            Reaction::Hello => hello_frame(),
            Reaction::AckOk => json!({"status": "OK", "seq_reply": 1}),
            Reaction::Reject => json!({
                "status": "FAIL",
                "seq_reply": 1,
                "error": {"id": "api.web_socket_router.not_authenticated.app_error"}
            }),
        };

        for frame in std::iter::once(reply).chain(follow_up) {
            if write.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) if msg.is_close() => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Websocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v4/websocket", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn challenges(&self) -> Vec<Value> {
        self.challenges.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockMattermostServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type Inbound = std::result::Result<WsMessage, String>;

/// Test side of one scripted session
pub struct ScriptedPeer {
    to_client: Option<mpsc::UnboundedSender<Inbound>>,
    from_client: mpsc::UnboundedReceiver<WsMessage>,
    closed: Arc<AtomicBool>,
}

impl ScriptedPeer {
    pub fn send_json(&self, value: Value) {
        self.send(WsMessage::Text(value.to_string()));
    }

    pub fn send(&self, message: WsMessage) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(message));
        }
    }

    /// Make the client's next receive fail with an I/O error
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    /// Close the server side; the client sees end of stream
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next frame the client sent
    pub async fn next_sent(&mut self) -> Option<WsMessage> {
        self.from_client.recv().await
    }

    /// Every frame the client has sent so far, without waiting
    pub fn drain_sent(&mut self) -> Vec<WsMessage> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Client side of one scripted session
pub struct ScriptedSession {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn send(&self, message: WsMessage) -> mattersocket::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MatterSocketError::WebSocket("session closed".into()));
        }
        self.outbound
            .send(message)
            .map_err(|_| MatterSocketError::WebSocket("peer gone".into()))
    }

    async fn recv(&self) -> mattersocket::Result<Option<WsMessage>> {
        match self.inbound.lock().await.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(reason)) => Err(MatterSocketError::WebSocket(reason)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Create a connected session/peer pair
pub fn session_pair() -> (ScriptedSession, ScriptedPeer) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let session = ScriptedSession {
        inbound: tokio::sync::Mutex::new(inbound),
        outbound,
        closed: Arc::clone(&closed),
    };
    let peer = ScriptedPeer {
        to_client: Some(to_client),
        from_client,
        closed,
    };
    (session, peer)
}

enum Scripted {
    Fail(String),
    Session(ScriptedSession),
}

#[derive(Default)]
struct TransportInner {
    script: Mutex<VecDeque<Scripted>>,
    opened_at: Mutex<Vec<Instant>>,
}

/// In-memory transport: each `open` consumes the next scripted outcome,
/// and fails once the script is exhausted
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<TransportInner>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session; returns its peer
    pub fn push_session(&self) -> ScriptedPeer {
        let (session, peer) = session_pair();
        self.inner.script.lock().push_back(Scripted::Session(session));
        peer
    }

    /// Queue an open failure
    pub fn push_failure(&self, reason: &str) {
        self.inner
            .script
            .lock()
            .push_back(Scripted::Fail(reason.to_string()));
    }

    pub fn open_count(&self) -> usize {
        self.inner.opened_at.lock().len()
    }

    /// When each open was attempted
    pub fn opened_at(&self) -> Vec<Instant> {
        self.inner.opened_at.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _config: &ConnectionConfig) -> mattersocket::Result<Arc<dyn Session>> {
        self.inner.opened_at.lock().push(Instant::now());
        let next = self.inner.script.lock().pop_front();

        match next {
            Some(Scripted::Session(session)) => Ok(Arc::new(session)),
            Some(Scripted::Fail(reason)) => Err(MatterSocketError::Connect(reason)),
            None => Err(MatterSocketError::Connect("connection refused".into())),
        }
    }
}

/// Let spawned tasks run without advancing paused time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
