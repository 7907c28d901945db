//! Turning a client's proof of identity into an [`Identity`].

use std::sync::Arc;

use hearth_protocol::Identity;

use crate::{CredentialStore, SessionError, TokenIssuer};

/// What a client offers to prove who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    /// Identity and password.
    Password { identity: Identity, password: String },
    /// A bearer token from an earlier login.
    Token(String),
}

/// Decides whether a [`Proof`] is good.
///
/// The server calls this once per connection, before the connection is
/// admitted to the registry. Every failure is reported as
/// [`SessionError::AuthFailed`].
pub trait Authenticator: Send + Sync + 'static {
    /// Checks a proof and returns the identity it proves.
    fn authenticate(
        &self,
        proof: Proof,
    ) -> impl Future<Output = Result<Identity, SessionError>> + Send;

    /// Issues a reconnect token for an authenticated identity.
    ///
    /// The default issues none; clients then get an empty token in their
    /// welcome frame.
    fn issue_token(&self, identity: &Identity) -> Result<String, SessionError> {
        let _ = identity;
        Ok(String::new())
    }
}

/// The standard [`Authenticator`]: passwords against a [`CredentialStore`],
/// tokens against a [`TokenIssuer`].
#[derive(Clone)]
pub struct Gatekeeper {
    credentials: Arc<CredentialStore>,
    tokens: Arc<TokenIssuer>,
}

impl Gatekeeper {
    pub fn new(credentials: Arc<CredentialStore>, tokens: Arc<TokenIssuer>) -> Self {
        Self {
            credentials,
            tokens,
        }
    }

    /// The store this gatekeeper checks passwords against.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

impl Authenticator for Gatekeeper {
    async fn authenticate(&self, proof: Proof) -> Result<Identity, SessionError> {
        match proof {
            Proof::Password { identity, password } => {
                // Argon2 is CPU-bound; keep it off the async workers.
                let credentials = Arc::clone(&self.credentials);
                tokio::task::spawn_blocking(move || {
                    credentials.verify(identity.as_str(), &password)?;
                    Ok::<_, SessionError>(identity)
                })
                .await
                .map_err(|error| {
                    tracing::warn!(%error, "password check did not complete");
                    SessionError::AuthFailed
                })?
            }
            Proof::Token(token) => {
                let identity = self.tokens.verify(&token)?;
                if !self.credentials.contains(identity.as_str()) {
                    tracing::debug!(%identity, "token names no registered identity");
                    return Err(SessionError::AuthFailed);
                }
                Ok(identity)
            }
        }
    }

    fn issue_token(&self, identity: &Identity) -> Result<String, SessionError> {
        self.tokens.issue(identity)
    }
}
