//! Error types for the protocol layer.
//!
//! Each crate in Hearth defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning frames into text (or back),
//! not in networking or session bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into text).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning text into a frame).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, or missing
    /// fields such as a `Login` without a password.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but is not valid at this point of the exchange,
    /// e.g. a raw text message arriving before the handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
