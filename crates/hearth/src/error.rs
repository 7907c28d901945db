//! Unified error type for the Hearth server.

use hearth_protocol::ProtocolError;
use hearth_session::SessionError;
use hearth_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` lift a sub-crate error into this one.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    /// A transport-level error (bind, upgrade, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unexpected frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, admission, delivery).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server configuration could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for HearthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}
