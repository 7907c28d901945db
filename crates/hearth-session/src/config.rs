//! Tunables for the registry and the credential store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Configuration for the connection registry.
///
/// `#[serde(default)]` lets a config file override only the fields it
/// cares about; everything else falls back to [`RegistryConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// How many outbound messages a single connection may have queued
    /// before broadcasts start dropping messages for it.
    pub mailbox_capacity: usize,

    /// How many inbound messages an identity may have queued before its
    /// connections' readers wait for the router to catch up.
    pub inbound_capacity: usize,

    /// Upper bound on waiting for the registry lock, in milliseconds.
    /// `None` waits indefinitely.
    pub lock_timeout_ms: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 32,
            inbound_capacity: 32,
            lock_timeout_ms: None,
        }
    }
}

impl RegistryConfig {
    /// Returns the lock wait bound, if one is configured.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    // Tokio's bounded channels panic on a capacity of zero.
    pub(crate) fn mailbox_slots(&self) -> usize {
        self.mailbox_capacity.max(1)
    }

    pub(crate) fn inbound_slots(&self) -> usize {
        self.inbound_capacity.max(1)
    }
}

// ---------------------------------------------------------------------------
// HashCost
// ---------------------------------------------------------------------------

/// Argon2id cost parameters for password hashes.
///
/// The defaults match the `argon2` crate's recommended settings. Tests
/// and local development can turn them down with [`HashCost::cheap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
        }
    }
}

impl HashCost {
    /// The cheapest parameters Argon2 accepts. Never use in production.
    pub fn cheap() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST,
            iterations: argon2::Params::MIN_T_COST,
        }
    }
}
