//! Connection and session core for Hearth.
//!
//! This crate handles everything between "a socket proved who it is" and
//! "a message reaches the right sockets":
//!
//! 1. **Credentials**: who may log in ([`CredentialStore`], [`TokenIssuer`],
//!    and the [`Authenticator`] seam that combines them)
//! 2. **Connection registry**: which identities are online and through
//!    which connections ([`Registry`], [`ConnectionHandle`])
//! 3. **Inbound routing**: one consumer task per online identity that
//!    drains what all of its connections send ([`InboundHandler`])
//! 4. **Messaging**: broadcast and direct delivery into bounded
//!    per-connection mailboxes ([`Registry::notify_everyone`],
//!    [`Registry::to_player`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← calls connect/disconnect, pumps sockets
//!     ↕
//! Session Layer (this crate)  ← identities, mailboxes, inbound queues
//!     ↕
//! Protocol Layer (below)  ← provides Identity, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod config;
mod credentials;
mod delivery;
mod error;
mod handle;
mod presence;
mod registry;
mod router;
mod token;

pub use auth::{Authenticator, Gatekeeper, Proof};
pub use config::{HashCost, RegistryConfig};
pub use credentials::{Account, CredentialStore};
pub use delivery::DeliveryReport;
pub use error::SessionError;
pub use handle::{ConnectionHandle, InboundSender};
pub use presence::{Announce, PresenceHook, Silent};
pub use registry::Registry;
pub use router::{InboundHandler, LogHandler};
pub use token::TokenIssuer;
