//! Wire protocol for Hearth.
//!
//! This crate defines the small vocabulary shared by every other layer:
//!
//! - **Identity types** ([`Identity`], [`ConnectionId`]): who a player
//!   is, and which of their live connections we're talking about.
//! - **Handshake frames** ([`ClientFrame`], [`ServerFrame`]): the only
//!   structured messages on the wire. Once a connection is admitted,
//!   everything else is raw text.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are turned
//!   into text and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (text frames) → Protocol (ClientFrame/ServerFrame) → Session (Identity)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ClientFrame, ConnectionId, Identity, ServerFrame};
