//! Core protocol types: identities, connection ids, handshake frames.
//!
//! Hearth's wire format is deliberately small. A client opens a websocket,
//! sends exactly one [`ClientFrame`] to prove who it is, and receives one
//! [`ServerFrame`] back. After a `Welcome`, every frame in either direction
//! is plain text that the protocol layer does not interpret.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The name of a registered account (an email address or a username).
///
/// This is a newtype wrapper over `String`: it can't be mixed up with a
/// password or a raw chat message in a function signature, even though
/// all three are strings underneath.
///
/// `Borrow<str>` lets a `HashMap<Identity, _>` be queried with a plain
/// `&str`, so callers don't allocate an `Identity` just to look one up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A handle to one live connection.
///
/// Issued by the connection registry, strictly increasing, never reused
/// for the lifetime of the process. A player with two browser tabs open
/// has two `ConnectionId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Handshake frames
// ---------------------------------------------------------------------------

/// The first (and only structured) frame a client sends.
///
/// `#[serde(tag = "type")]` makes this internally tagged:
/// `{ "type": "Login", "identity": "a@x.com", "password": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Authenticate with an account name and password.
    Login { identity: Identity, password: String },

    /// Authenticate with a bearer token from an earlier `Welcome`.
    Token { token: String },
}

/// The server's answer to a [`ClientFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// The connection was admitted.
    ///
    /// `token` can be presented on a later connection instead of the
    /// password until it expires.
    Welcome {
        identity: Identity,
        connection_id: ConnectionId,
        token: String,
    },

    /// The handshake failed. The server closes the socket right after.
    ///
    /// `reason` never says whether the account exists.
    Rejected { reason: String },
}

// =========================================================================
// Tests
// =========================================================================
