//! Connection configuration
//!
//! [`ServerOptions`] is the loose, serde-loaded shape shared with the REST layer.
//! [`ConnectionConfig`] is the validated, immutable value the event client runs with.

use crate::error::{MatterSocketError, Result};
use crate::reconnect::{FixedDelay, NeverReconnect, ReconnectionStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable overriding the configured token
pub const TOKEN_ENV_VAR: &str = "MATTERMOST_TOKEN";

/// Environment variable overriding the configured hostname
pub const HOST_ENV_VAR: &str = "MATTERMOST_HOST";

/// Shortest idle timeout accepted by [`ConnectionConfig::with_idle_timeout`]
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// How inbound frames are decoded before reaching the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Parse every frame as JSON
    #[default]
    Json,
    /// Hand the raw text to the handler
    Text,
}

/// Transport settings forwarded untouched to the websocket session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSocketOptions {
    /// Extra headers sent with the HTTP upgrade request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub max_message_size: Option<usize>,
    #[serde(default)]
    pub max_frame_size: Option<usize>,
    /// Upper bound on opening the session, TLS and upgrade included
    #[serde(default)]
    pub connect_timeout_secs: Option<f64>,
    #[serde(default)]
    pub disable_nagle: bool,
}

/// Server options as supplied by the embedding application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_basepath")]
    pub basepath: String,
    /// Verify the server certificate on `https`
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    /// Session token, usually supplied through the environment
    #[serde(default)]
    pub token: Option<String>,
    /// Idle timeout in seconds before a heartbeat is sent
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Stay connected: reconnect after failures instead of returning
    #[serde(default)]
    pub keepalive: bool,
    /// Seconds to wait between a failed session and the next attempt
    #[serde(default = "default_keepalive_delay")]
    pub keepalive_delay: f64,
    #[serde(default)]
    pub websocket_options: WebSocketOptions,
    #[serde(default)]
    pub data_format: DataFormat,
    /// Forces the `debug` log level
    #[serde(default)]
    pub debug: bool,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: f64,
    #[serde(default = "default_max_handshake_frames")]
    pub max_handshake_frames: usize,
    /// Maximum handlers in flight (unset = unbounded)
    #[serde(default)]
    pub handler_concurrency: Option<usize>,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8065
}

fn default_basepath() -> String {
    "/api/v4".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> f64 {
    30.0
}

fn default_keepalive_delay() -> f64 {
    5.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_handshake_timeout() -> f64 {
    10.0
}

fn default_max_handshake_frames() -> usize {
    16
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            hostname: default_hostname(),
            port: default_port(),
            basepath: default_basepath(),
            verify: true,
            proxy: None,
            token: None,
            timeout: default_timeout(),
            keepalive: false,
            keepalive_delay: default_keepalive_delay(),
            websocket_options: WebSocketOptions::default(),
            data_format: DataFormat::default(),
            debug: false,
            log_level: default_log_level(),
            handshake_timeout: default_handshake_timeout(),
            max_handshake_frames: default_max_handshake_frames(),
            handler_concurrency: None,
        }
    }
}

impl ServerOptions {
    /// Load options from a YAML file, then apply environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let yaml_content = std::fs::read_to_string(path).map_err(|e| {
            MatterSocketError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut options = Self::from_yaml(&yaml_content)?;
        options.apply_env_overrides();

        info!(
            host = %options.hostname,
            port = options.port,
            keepalive = options.keepalive,
            "Loaded server options from {}",
            path.display()
        );
        Ok(options)
    }

    /// Parse options from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| MatterSocketError::Configuration(format!("invalid YAML: {e}")))
    }

    /// Override token and hostname from the environment when present
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        if let Ok(host) = std::env::var(HOST_ENV_VAR) {
            if !host.is_empty() {
                self.hostname = host;
            }
        }
    }

    /// Effective log level, honouring the `debug` switch
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MatterSocketError::Configuration(msg));

        if self.token.as_deref().map_or(true, str::is_empty) {
            return invalid("required option 'token' is missing".to_string());
        }
        if self.scheme != "http" && self.scheme != "https" {
            return invalid(format!("unsupported scheme '{}'", self.scheme));
        }
        if self.hostname.is_empty() {
            return invalid("hostname must not be empty".to_string());
        }
        if self.port == 0 {
            return invalid("port must be non-zero".to_string());
        }
        for (name, secs) in [
            ("timeout", self.timeout),
            ("keepalive_delay", self.keepalive_delay),
            ("handshake_timeout", self.handshake_timeout),
        ] {
            seconds(name, secs)?;
        }
        if let Some(secs) = self.websocket_options.connect_timeout_secs {
            seconds("connect_timeout_secs", secs)?;
        }
        if self.max_handshake_frames == 0 {
            return invalid("max_handshake_frames must be at least 1".to_string());
        }
        if self.handler_concurrency == Some(0) {
            return invalid("handler_concurrency must be at least 1 when set".to_string());
        }
        Ok(())
    }

    /// Websocket endpoint derived from the REST options
    pub fn websocket_url(&self) -> String {
        let scheme = if self.scheme == "https" { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}/websocket",
            scheme,
            self.hostname,
            self.port,
            self.basepath.trim_end_matches('/')
        )
    }
}

/// Convert a configured number of seconds, rejecting values a `Duration` cannot hold
fn seconds(name: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(MatterSocketError::Configuration(format!(
            "{name} must be a positive number of seconds, got {secs}"
        ))),
    }
}

/// Immutable configuration of one event client
///
/// Created once before connecting. A later connect cycle may run with an
/// updated token through [`ConnectionConfig::with_token`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub(crate) url: String,
    pub(crate) verify_tls: bool,
    pub(crate) proxy: Option<String>,
    pub(crate) token: String,
    pub(crate) idle_timeout: Duration,
    pub(crate) keepalive_delay: Duration,
    pub(crate) stay_connected: bool,
    pub(crate) websocket_options: WebSocketOptions,
    pub(crate) data_format: DataFormat,
    pub(crate) log_level: String,
    pub(crate) handshake_timeout: Duration,
    pub(crate) max_handshake_frames: usize,
    pub(crate) handler_concurrency: Option<usize>,
}

impl ConnectionConfig {
    /// Config for an explicit websocket URL with default settings
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let defaults = ServerOptions::default();
        Self {
            url: url.into(),
            verify_tls: true,
            proxy: None,
            token: token.into(),
            idle_timeout: Duration::from_secs_f64(defaults.timeout),
            keepalive_delay: Duration::from_secs_f64(defaults.keepalive_delay),
            stay_connected: false,
            websocket_options: WebSocketOptions::default(),
            data_format: DataFormat::Json,
            log_level: defaults.log_level,
            handshake_timeout: Duration::from_secs_f64(defaults.handshake_timeout),
            max_handshake_frames: defaults.max_handshake_frames,
            handler_concurrency: None,
        }
    }

    /// Validate server options and derive the connection config
    pub fn from_options(options: &ServerOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            url: options.websocket_url(),
            verify_tls: options.verify,
            proxy: options.proxy.clone().filter(|p| !p.is_empty()),
            token: options.token.clone().unwrap_or_default(),
            idle_timeout: seconds("timeout", options.timeout)?,
            keepalive_delay: seconds("keepalive_delay", options.keepalive_delay)?,
            stay_connected: options.keepalive,
            websocket_options: options.websocket_options.clone(),
            data_format: options.data_format,
            log_level: options.effective_log_level().to_string(),
            handshake_timeout: seconds("handshake_timeout", options.handshake_timeout)?,
            max_handshake_frames: options.max_handshake_frames,
            handler_concurrency: options.handler_concurrency,
        })
    }

    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..self.clone()
        }
    }

    /// Idle time before a heartbeat is sent, never shorter than [`MIN_IDLE_TIMEOUT`]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout.max(MIN_IDLE_TIMEOUT);
        self
    }

    /// Enable or disable stay-connected with the given retry delay
    pub fn with_keepalive(mut self, stay_connected: bool, delay: Duration) -> Self {
        self.stay_connected = stay_connected;
        self.keepalive_delay = delay;
        self
    }

    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_handshake_frames(mut self, frames: usize) -> Self {
        self.max_handshake_frames = frames.max(1);
        self
    }

    pub fn with_handler_concurrency(mut self, limit: Option<usize>) -> Self {
        self.handler_concurrency = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_tls_verification(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_websocket_options(mut self, options: WebSocketOptions) -> Self {
        self.websocket_options = options;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the endpoint uses `wss`
    pub fn is_tls(&self) -> bool {
        self.url.starts_with("wss://")
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn keepalive_delay(&self) -> Duration {
        self.keepalive_delay
    }

    pub fn stay_connected(&self) -> bool {
        self.stay_connected
    }

    pub fn websocket_options(&self) -> &WebSocketOptions {
        &self.websocket_options
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn max_handshake_frames(&self) -> usize {
        self.max_handshake_frames
    }

    pub fn handler_concurrency(&self) -> Option<usize> {
        self.handler_concurrency
    }

    /// Retry policy implied by the stay-connected flag
    pub fn reconnect_strategy(&self) -> Box<dyn ReconnectionStrategy> {
        if self.stay_connected {
            Box::new(FixedDelay::new(self.keepalive_delay, None))
        } else {
            Box::new(NeverReconnect)
        }
    }
}
