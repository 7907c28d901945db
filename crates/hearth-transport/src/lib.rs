//! Transport abstraction layer for Hearth.
//!
//! Provides the [`Transport`], [`Incoming`] and [`Connection`] traits so the server can
//! drive any text-frame protocol. The only implementation today is a
//! websocket listener with an `Origin` allow list.
//!
//! # Feature Flags
//!
//! - `websocket` (default): websocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{IncomingWebSocket, OriginPolicy, WebSocketConnection, WebSocketTransport};

use std::net::SocketAddr;

/// A listener that hands out incoming clients.
pub trait Transport: Send + Sync + 'static {
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client.
    ///
    /// Returns as soon as the socket is accepted. The protocol upgrade is
    /// left to [`Incoming::upgrade`], which callers run on the client's
    /// own task.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted client whose upgrade hasn't run yet.
pub trait Incoming: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Completes the upgrade. A failure is an error for this client only.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}

/// A single connection that carries text frames.
///
/// Sending and receiving are independent: one task may sit in
/// [`recv`](Connection::recv) while another calls
/// [`send`](Connection::send) on the same connection.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one text frame.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Reads the next text frame, skipping anything that isn't text.
    ///
    /// `Ok(None)` means the peer closed the connection.
    async fn recv(&self) -> Result<Option<String>, Self::Error>;

    /// Starts a clean close from our side.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}
