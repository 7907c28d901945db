//! Error types for the session layer.

use hearth_protocol::{ConnectionId, Identity};

/// Errors that can occur during authentication, admission, and delivery.
///
/// All of these are recoverable at the call site: the server turns them
/// into a `Rejected` frame or a closed socket, never a crash. Broken
/// registry invariants are not represented here; those are bugs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Unknown identity, wrong password, or an invalid token.
    ///
    /// Never says which of the three it was.
    #[error("invalid identity or password")]
    AuthFailed,

    /// `connect` or `to_player` named an identity that isn't registered
    /// (or, for `to_player`, has no live connections).
    #[error("unknown identity {0}")]
    UnknownIdentity(Identity),

    /// `disconnect` named a connection that was never issued or has
    /// already been retired.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Creating a password hash failed. Only happens while seeding
    /// accounts at startup, where it is fatal.
    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    /// An account with this identity was already seeded.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(Identity),

    /// Signing a bearer token failed.
    #[error("token could not be issued: {0}")]
    TokenFailed(String),

    /// The identity's last connection was retired, so its inbound queue
    /// no longer accepts messages.
    #[error("inbound queue for {0} is closed")]
    InboundClosed(Identity),

    /// The registry lock could not be acquired within the configured
    /// `lock_timeout`.
    #[error("registry is busy")]
    Busy,
}
