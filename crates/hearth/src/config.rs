//! Server configuration, read from TOML.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! token_secret = "change-me"
//! token_ttl_secs = 86400
//! allowed_origins = ["http://localhost:3000"]
//! announce_presence = true
//! handshake_timeout_secs = 5
//!
//! [registry]
//! mailbox_capacity = 32
//! inbound_capacity = 32
//! lock_timeout_ms = 250
//!
//! [hashing]
//! memory_kib = 19456
//! iterations = 2
//!
//! [[accounts]]
//! identity = "a@x.com"
//! password = "secret"
//! ```

use std::sync::Arc;
use std::time::Duration;

use hearth_protocol::Identity;
use hearth_session::{
    Announce, CredentialStore, Gatekeeper, HashCost, RegistryConfig, TokenIssuer,
};
use serde::Deserialize;

use crate::{HearthError, HearthServerBuilder};

/// One account seeded at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub identity: String,
    pub password: String,
}

/// Everything `hearthd` needs to start.
///
/// Every field has a default except `token_secret`, which must be set to
/// something non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,

    /// HMAC secret for reconnect tokens.
    pub token_secret: String,

    /// Lifetime of reconnect tokens, in seconds.
    pub token_ttl_secs: u64,

    /// Browser origins allowed to open a websocket. Empty allows any.
    pub allowed_origins: Vec<String>,

    /// Broadcast "<identity> has connected." and friends.
    pub announce_presence: bool,

    /// How long a new socket has to send its login frame, in seconds.
    pub handshake_timeout_secs: u64,

    pub registry: RegistryConfig,

    pub hashing: HashCost,

    pub accounts: Vec<AccountConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            token_secret: String::new(),
            token_ttl_secs: 86_400,
            allowed_origins: Vec::new(),
            announce_presence: false,
            handshake_timeout_secs: 5,
            registry: RegistryConfig::default(),
            hashing: HashCost::default(),
            accounts: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parses and checks a TOML document.
    ///
    /// # Errors
    /// [`HearthError::Config`] on a syntax error, an unknown key, an empty
    /// `token_secret`, or the same identity listed twice.
    pub fn from_toml(text: &str) -> Result<Self, HearthError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), HearthError> {
        if self.token_secret.is_empty() {
            return Err(HearthError::Config("token_secret must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self
            .accounts
            .iter()
            .find(|account| !seen.insert(account.identity.as_str()))
        {
            return Err(HearthError::Config(format!(
                "account {} is listed more than once",
                dup.identity
            )));
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Hashes every configured password into a fresh credential store.
    ///
    /// Runs Argon2 once per account, so it is slow with production costs.
    pub fn credential_store(&self) -> Result<CredentialStore, HearthError> {
        let accounts = self
            .accounts
            .iter()
            .map(|account| (account.identity.as_str(), account.password.as_str()));
        Ok(CredentialStore::seed(self.hashing, accounts)?)
    }

    /// Builds the default authenticator for this configuration.
    pub fn gatekeeper(&self) -> Result<Gatekeeper, HearthError> {
        let credentials = self.credential_store()?;
        let tokens = TokenIssuer::new(self.token_secret.as_bytes(), self.token_ttl());
        Ok(Gatekeeper::new(Arc::new(credentials), Arc::new(tokens)))
    }

    /// Returns a server builder with every setting from this file applied.
    pub fn server_builder(&self) -> HearthServerBuilder {
        let identities = self
            .accounts
            .iter()
            .map(|account| Identity::from(account.identity.as_str()));

        let builder = HearthServerBuilder::new()
            .bind(&self.bind)
            .allowed_origins(self.allowed_origins.iter().cloned())
            .registry_config(self.registry.clone())
            .handshake_timeout(self.handshake_timeout())
            .identities(identities);

        if self.announce_presence {
            builder.presence(Announce)
        } else {
            builder
        }
    }
}
