//! # Hearth
//!
//! Websocket server for shared real-time sessions: many people, each
//! possibly on several devices at once, logged in to one process that can
//! broadcast to everybody or message one person on all of their devices.
//!
//! The layers underneath do the work; this crate wires them together:
//! transport → protocol → session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hearth::prelude::*;
//!
//! # async fn start() -> Result<(), HearthError> {
//! let accounts = CredentialStore::seed(HashCost::default(), [("a@x.com", "secret")])?;
//! let identities: Vec<Identity> = accounts.identities().cloned().collect();
//! let tokens = TokenIssuer::new(b"change-me", Duration::from_secs(86_400));
//! let gatekeeper = Gatekeeper::new(Arc::new(accounts), Arc::new(tokens));
//!
//! let server = HearthServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .identities(identities)
//!     .presence(Announce)
//!     .build(gatekeeper)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{AccountConfig, ServerConfig};
pub use error::HearthError;
pub use server::{HearthServer, HearthServerBuilder};

/// Everything needed to stand up a server.
pub mod prelude {
    pub use crate::{AccountConfig, HearthError, HearthServer, HearthServerBuilder, ServerConfig};
    pub use hearth_protocol::{ClientFrame, ConnectionId, Identity, ServerFrame};
    pub use hearth_session::{
        Announce, Authenticator, CredentialStore, Gatekeeper, HashCost, InboundHandler,
        PresenceHook, Proof, Registry, RegistryConfig, Silent, TokenIssuer,
    };
    pub use hearth_transport::OriginPolicy;
}
