//! The credential store: which identities exist and how to check their
//! passwords.
//!
//! Passwords are stored as Argon2id PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`). The store is filled once
//! at startup and only read afterwards, so it needs no locking of its own;
//! callers share it behind an `Arc`.

use std::collections::HashMap;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use hearth_protocol::Identity;
use rand::Rng;

use crate::{HashCost, SessionError};

/// The password that backs the decoy hash. Its value is irrelevant; it only
/// has to produce a well-formed hash with the store's own parameters.
const DECOY_PASSWORD: &str = "hearth-decoy";

/// One registered account.
#[derive(Debug, Clone)]
pub struct Account {
    /// The account's name.
    pub identity: Identity,
    /// Argon2id PHC string.
    pub password_hash: String,
}

/// Holds identity → password-verifier mappings.
pub struct CredentialStore {
    accounts: HashMap<Identity, Account>,

    /// A real hash of a throwaway password. Unknown identities are checked
    /// against it so they cost the same CPU time as known ones.
    decoy: String,

    hasher: Argon2<'static>,
}

impl CredentialStore {
    /// Creates an empty store with the default Argon2 cost.
    ///
    /// # Errors
    /// [`SessionError::HashingFailed`] if the decoy hash can't be built.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_cost(HashCost::default())
    }

    /// Creates an empty store that hashes with the given cost.
    pub fn with_cost(cost: HashCost) -> Result<Self, SessionError> {
        let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| SessionError::HashingFailed(e.to_string()))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy = hash_password(&hasher, DECOY_PASSWORD)?;
        Ok(Self {
            accounts: HashMap::new(),
            decoy,
            hasher,
        })
    }

    /// Builds a store from a list of `(identity, password)` pairs.
    ///
    /// This is how the daemon seeds its accounts at startup.
    pub fn seed<I, N, P>(cost: HashCost, accounts: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<Identity>,
        P: AsRef<str>,
    {
        let mut store = Self::with_cost(cost)?;
        for (identity, password) in accounts {
            store.register(identity, password.as_ref())?;
        }
        Ok(store)
    }

    /// Registers a new account, hashing its password.
    ///
    /// Bootstrap only: nothing reachable from the network calls this.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyRegistered`]: identities are immutable
    /// - [`SessionError::HashingFailed`]: Argon2 rejected the input
    pub fn register(
        &mut self,
        identity: impl Into<Identity>,
        password: &str,
    ) -> Result<&Account, SessionError> {
        let identity = identity.into();
        if self.accounts.contains_key(&identity) {
            return Err(SessionError::AlreadyRegistered(identity));
        }

        let password_hash = hash_password(&self.hasher, password)?;
        tracing::debug!(%identity, "account registered");

        let account = Account {
            identity: identity.clone(),
            password_hash,
        };
        Ok(self.accounts.entry(identity).or_insert(account))
    }

    /// Checks a password for an identity.
    ///
    /// Unknown identities and wrong passwords both return
    /// [`SessionError::AuthFailed`], and both run a full Argon2
    /// verification first.
    pub fn verify(&self, identity: &str, password: &str) -> Result<(), SessionError> {
        let (stored, known) = match self.accounts.get(identity) {
            Some(account) => (account.password_hash.as_str(), true),
            None => (self.decoy.as_str(), false),
        };

        let parsed = PasswordHash::new(stored).map_err(|_| SessionError::AuthFailed)?;
        let matches = self
            .hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        if known && matches {
            Ok(())
        } else {
            Err(SessionError::AuthFailed)
        }
    }

    /// Returns `true` if the identity has an account.
    pub fn contains(&self, identity: &str) -> bool {
        self.accounts.contains_key(identity)
    }

    /// Iterates over every registered identity.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.accounts.keys()
    }

    /// Returns the number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no accounts are registered.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Hashes a password with a fresh 128-bit random salt.
fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, SessionError> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| SessionError::HashingFailed(e.to_string()))?;
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| SessionError::HashingFailed(e.to_string()))?;
    Ok(hash.to_string())
}

// =========================================================================
// Tests
// =========================================================================
