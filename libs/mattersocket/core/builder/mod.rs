pub mod states;

use crate::auth::AuthProvider;
use crate::client::EventClient;
use crate::config::{ConnectionConfig, ServerOptions};
use crate::error::{MatterSocketError, Result};
use crate::reconnect::ReconnectionStrategy;
use crate::transport::Transport;
use crate::tungstenite::TungsteniteTransport;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Span;

/// Type-state builder for [`EventClient`]
///
/// The connection config is the only required piece; `build()` does not
/// exist until it has been supplied through [`config`](Self::config) or
/// [`options`](Self::options).
pub struct EventClientBuilder<C>
where
    C: ConfigState,
{
    _state: PhantomData<C>,
    config: Option<ConnectionConfig>,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    reconnect_strategy: Option<Arc<dyn ReconnectionStrategy>>,
    span: Option<Span>,
}

impl EventClientBuilder<NoConfig> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            config: None,
            transport: None,
            auth: None,
            reconnect_strategy: None,
            span: None,
        }
    }

    pub fn config(self, config: ConnectionConfig) -> EventClientBuilder<HasConfig> {
        EventClientBuilder {
            _state: PhantomData,
            config: Some(config),
            transport: self.transport,
            auth: self.auth,
            reconnect_strategy: self.reconnect_strategy,
            span: self.span,
        }
    }

    /// Validate server options and use the config derived from them
    pub fn options(self, options: &ServerOptions) -> Result<EventClientBuilder<HasConfig>> {
        let config = ConnectionConfig::from_options(options)?;
        Ok(self.config(config))
    }
}

impl Default for EventClientBuilder<NoConfig> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventClientBuilder<C>
where
    C: ConfigState,
{
    /// Replace the default tungstenite transport
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the token challenge built from the config
    pub fn auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Override the retry policy derived from the stay-connected flag
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    /// Parent span for everything the client logs
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl EventClientBuilder<HasConfig> {
    pub fn build(self) -> Result<EventClient> {
        let config = self
            .config
            .ok_or_else(|| MatterSocketError::Configuration("connection config not set".into()))?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TungsteniteTransport::new()));

        Ok(EventClient::from_parts(
            config,
            transport,
            self.auth,
            self.reconnect_strategy,
            self.span,
        ))
    }
}
