//! `HearthServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hearth_protocol::{Codec, Identity, JsonCodec};
use hearth_session::{
    Authenticator, InboundHandler, LogHandler, PresenceHook, Registry, RegistryConfig, Silent,
};
use hearth_transport::{Incoming, OriginPolicy, Transport, WebSocketTransport};

use crate::HearthError;
use crate::handler::handle_connection;

/// State shared by every connection task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) registry: Arc<Registry>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
}

/// Builder for configuring and starting a Hearth server.
///
/// # Example
///
/// ```rust,ignore
/// let server = HearthServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .identities(["a@x.com", "b@x.com"])
///     .build(gatekeeper)
///     .await?;
/// server.run().await
/// ```
pub struct HearthServerBuilder {
    bind_addr: String,
    origins: OriginPolicy,
    registry_config: RegistryConfig,
    identities: Vec<Identity>,
    presence: Arc<dyn PresenceHook>,
    handler: Arc<dyn InboundHandler>,
    handshake_timeout: Duration,
}

impl HearthServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            origins: OriginPolicy::default(),
            registry_config: RegistryConfig::default(),
            identities: Vec::new(),
            presence: Arc::new(Silent),
            handler: Arc::new(LogHandler),
            handshake_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Restricts which browser origins may connect. An empty list (the
    /// default) allows any.
    pub fn allowed_origins(mut self, origins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.origins = OriginPolicy::new(origins);
        self
    }

    /// Sets the registry configuration.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Sets the identities the registry admits. These should be the same
    /// identities the authenticator knows.
    pub fn identities<I>(mut self, identities: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        self.identities = identities.into_iter().map(Into::into).collect();
        self
    }

    /// Sets what gets broadcast when someone comes online or goes offline.
    pub fn presence(mut self, presence: impl PresenceHook) -> Self {
        self.presence = Arc::new(presence);
        self
    }

    /// Sets where inbound client messages go.
    pub fn inbound_handler(mut self, handler: impl InboundHandler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Sets how long a new socket has to send its login frame.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<HearthServer<A, JsonCodec>, HearthError> {
        let transport = WebSocketTransport::bind(&self.bind_addr, self.origins).await?;

        let registry = Registry::new(self.registry_config, self.identities)
            .with_presence(self.presence)
            .with_inbound_handler(self.handler);

        let state = Arc::new(ServerState {
            registry: Arc::new(registry),
            auth,
            codec: JsonCodec,
            handshake_timeout: self.handshake_timeout,
        });

        Ok(HearthServer { transport, state })
    }
}

impl Default for HearthServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Hearth server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HearthServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> HearthServer<A, C>
where
    A: Authenticator,
    C: Codec + Send + Sync + 'static,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry, for sending messages from outside a connection.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.state.registry
    }

    /// Runs the accept loop.
    ///
    /// Spawns one task per accepted socket; the websocket upgrade runs on
    /// that task, not in the loop. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), HearthError> {
        tracing::info!("hearth server running");

        loop {
            match self.transport.accept().await {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = incoming.peer_addr();
                        let conn = match incoming.upgrade().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
