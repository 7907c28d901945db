//! Error types for the transport layer.

use std::io;

/// Errors that can occur while listening on or talking over a socket.
///
/// Websocket library errors are flattened to text so this type does not
/// depend on which transport feature is enabled.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed to hand out the next TCP connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The HTTP upgrade was refused or never finished (bad request,
    /// disallowed origin, timeout).
    #[error("upgrade rejected: {0}")]
    UpgradeRejected(String),

    /// Writing a frame failed; the peer is most likely gone.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed; the peer is most likely gone.
    #[error("receive failed: {0}")]
    Receive(String),
}
