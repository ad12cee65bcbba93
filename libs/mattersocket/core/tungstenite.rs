//! Default transport built on tokio-tungstenite
//!
//! Handles what the connection config asks of the socket: native-tls with an
//! optional verification bypass, passthrough upgrade headers and frame limits,
//! HTTP `CONNECT` proxies and a connect timeout.

use crate::config::{ConnectionConfig, WebSocketOptions};
use crate::error::{MatterSocketError, Result};
use crate::transport::{Session, Transport, WsMessage};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, http, Message};
use tokio_tungstenite::{
    client_async_tls_with_config, connect_async_tls_with_config, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the proxy's reply to `CONNECT`
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// Opens [`TungsteniteSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>> {
        let connect_timeout = config
            .websocket_options()
            .connect_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        let stream = match connect_timeout {
            Some(limit) => tokio::time::timeout(limit, open_stream(config))
                .await
                .map_err(|_| MatterSocketError::Connect(format!("timed out after {limit:?}")))??,
            None => open_stream(config).await?,
        };

        info!("Connected to {}", config.url());
        Ok(Arc::new(TungsteniteSession::new(stream)))
    }
}

async fn open_stream(config: &ConnectionConfig) -> Result<WsStream> {
    let options = config.websocket_options();
    let request = build_request(config.url(), options)?;
    let ws_config = websocket_config(options);
    let connector = tls_connector(config)?;

    let connected = match config.proxy() {
        Some(proxy) => {
            let target = Url::parse(config.url())
                .map_err(|e| MatterSocketError::Configuration(format!("invalid url: {e}")))?;
            let tunnel = open_tunnel(proxy, &target).await?;
            if options.disable_nagle {
                let _ = tunnel.set_nodelay(true);
            }
            debug!(proxy, "Proxy tunnel established");
            client_async_tls_with_config(request, tunnel, ws_config, connector).await
        }
        None => {
            connect_async_tls_with_config(request, ws_config, options.disable_nagle, connector)
                .await
        }
    };

    let (stream, response) = connected.map_err(|e| MatterSocketError::Connect(e.to_string()))?;
    debug!(status = %response.status(), "WebSocket upgrade accepted");
    Ok(stream)
}

/// Upgrade request carrying the passthrough headers
fn build_request(url: &str, options: &WebSocketOptions) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| MatterSocketError::Configuration(format!("invalid websocket url: {e}")))?;

    for (key, value) in &options.headers {
        match (
            key.parse::<http::header::HeaderName>(),
            value.parse::<http::header::HeaderValue>(),
        ) {
            (Ok(name), Ok(value)) => {
                request.headers_mut().insert(name, value);
            }
            (Err(_), _) => warn!("Invalid header name: {}", key),
            (_, Err(_)) => warn!("Invalid header value for key '{}'", key),
        }
    }

    Ok(request)
}

fn websocket_config(options: &WebSocketOptions) -> Option<WebSocketConfig> {
    if options.max_message_size.is_none() && options.max_frame_size.is_none() {
        return None;
    }

    let mut ws_config = WebSocketConfig::default();
    if let Some(size) = options.max_message_size {
        ws_config.max_message_size = Some(size);
    }
    if let Some(size) = options.max_frame_size {
        ws_config.max_frame_size = Some(size);
    }
    Some(ws_config)
}

fn tls_connector(config: &ConnectionConfig) -> Result<Option<Connector>> {
    if !config.is_tls() {
        return Ok(None);
    }

    let mut builder = native_tls::TlsConnector::builder();
    if !config.verify_tls() {
        warn!("TLS certificate verification is disabled");
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let connector = builder
        .build()
        .map_err(|e| MatterSocketError::Connect(format!("TLS setup failed: {e}")))?;
    Ok(Some(Connector::NativeTls(connector)))
}

/// Open a TCP tunnel to the websocket host through an HTTP proxy
async fn open_tunnel(proxy: &str, target: &Url) -> Result<TcpStream> {
    let connect_err = |msg: String| MatterSocketError::Connect(format!("proxy {proxy}: {msg}"));

    let proxy_url = if proxy.contains("://") {
        Url::parse(proxy)
    } else {
        Url::parse(&format!("http://{proxy}"))
    }
    .map_err(|e| MatterSocketError::Configuration(format!("invalid proxy address: {e}")))?;

    let proxy_host = proxy_url
        .host_str()
        .ok_or_else(|| MatterSocketError::Configuration("proxy address has no host".into()))?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(80);

    let target_host = target
        .host_str()
        .ok_or_else(|| MatterSocketError::Configuration("websocket url has no host".into()))?;
    let target_port = target.port_or_known_default().unwrap_or(80);
    let authority = format!("{target_host}:{target_port}");

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if !proxy_url.username().is_empty() {
        let credentials = format!(
            "{}:{}",
            proxy_url.username(),
            proxy_url.password().unwrap_or_default()
        );
        request.push_str(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            STANDARD.encode(credentials)
        ));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    let mut response = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        if n == 0 {
            return Err(connect_err("closed before answering CONNECT".into()));
        }
        response.extend_from_slice(&chunk[..n]);
        if response.len() > MAX_PROXY_RESPONSE {
            return Err(connect_err("oversized CONNECT response".into()));
        }
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    match status_line.split_whitespace().nth(1) {
        Some("200") => Ok(stream),
        _ => Err(connect_err(format!("CONNECT refused: {status_line}"))),
    }
}

/// One tokio-tungstenite connection, split so that sending and receiving
/// never wait on each other
pub struct TungsteniteSession {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
}

impl TungsteniteSession {
    fn new(ws_stream: WsStream) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Session for TungsteniteSession {
    async fn send(&self, message: WsMessage) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(ws_message_to_tungstenite(message))
            .await
            .map_err(|e| MatterSocketError::WebSocket(e.to_string()))
    }

    async fn recv(&self) -> Result<Option<WsMessage>> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed))
                | None => return Ok(None),
                Some(Err(e)) => return Err(MatterSocketError::WebSocket(e.to_string())),
            };

            let frame = match message {
                Message::Text(text) => WsMessage::Text(text),
                Message::Binary(data) => WsMessage::Binary(data),
                Message::Ping(data) => WsMessage::Ping(data),
                Message::Pong(data) => WsMessage::Pong(data),
                Message::Close(frame) => {
                    debug!(?frame, "Close frame received");
                    return Ok(None);
                }
                Message::Frame(_) => continue,
            };
            return Ok(Some(frame));
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Error while closing websocket");
        }
    }
}

fn ws_message_to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
        WsMessage::Ping(data) => Message::Ping(data),
        WsMessage::Pong(data) => Message::Pong(data),
    }
}
