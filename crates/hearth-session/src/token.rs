//! Signed bearer tokens, so a client that logged in once can reconnect
//! without sending its password again.
//!
//! Tokens are HS256 JWTs carrying the identity in `sub`. They are
//! stateless: the server keeps no list of issued tokens, and a token stays
//! valid until it expires.

use std::fmt;
use std::time::Duration;

use hearth_protocol::Identity;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// The `iss` claim on every token this server issues.
const ISSUER: &str = "hearth";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: u64,
    nbf: u64,
    exp: u64,
}

/// Issues and checks bearer tokens with a shared secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Creates an issuer whose tokens live for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// How long issued tokens stay valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `identity`.
    ///
    /// # Errors
    /// [`SessionError::TokenFailed`] if signing fails.
    pub fn issue(&self, identity: &Identity) -> Result<String, SessionError> {
        let now = get_current_timestamp();
        let claims = Claims {
            iss: ISSUER.to_owned(),
            sub: identity.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::TokenFailed(e.to_string()))
    }

    /// Checks a token and returns the identity it was issued to.
    ///
    /// A bad signature, a foreign issuer, expiry, and plain garbage all
    /// come back as [`SessionError::AuthFailed`].
    pub fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|error| {
            tracing::debug!(%error, "token rejected");
            SessionError::AuthFailed
        })?;
        Ok(Identity::new(data.claims.sub))
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
