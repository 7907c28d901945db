//! The connection registry: who is online, through which connections, and
//! where their messages go.
//!
//! # Concurrency note
//!
//! All maps and the id counter sit behind one `tokio::sync::Mutex`. Every
//! operation takes the lock once, does its bookkeeping, and lets go. The
//! lock is never held across network I/O or a send that could wait:
//! mailbox delivery uses `try_send`, so a full mailbox costs one dropped
//! message instead of stalling a broadcast for everybody else.
//!
//! Because delivery happens under the lock, broadcasts are totally ordered
//! with respect to each other and to connects/disconnects: a mailbox sees
//! exactly the broadcasts issued while it was registered. Presence
//! announcements go out in the same critical section as the change they
//! describe, so they arrive in the order the changes happened.
//!
//! A returning identity's new router is started without waiting for the
//! old one; the new task does that waiting itself.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use hearth_protocol::{ConnectionId, Identity};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;

use crate::delivery::DeliveryStats;
use crate::router::spawn_router;
use crate::{
    ConnectionHandle, DeliveryReport, InboundHandler, InboundSender, LogHandler,
    PresenceHook, RegistryConfig, SessionError, Silent,
};

/// A registered identity and its live connections.
struct PlayerRecord {
    identity: Identity,

    /// Connections this identity currently owns.
    connections: BTreeSet<ConnectionId>,

    /// The owning send end of the identity's inbound queue.
    /// `Some` exactly when `connections` is non-empty.
    inbound: Option<mpsc::Sender<String>>,

    /// The router draining the queue. Kept after the queue closes and
    /// handed to the next router, which waits for it before starting.
    router: Option<JoinHandle<()>>,
}

impl PlayerRecord {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            connections: BTreeSet::new(),
            inbound: None,
            router: None,
        }
    }
}

/// Everything the lock protects.
#[derive(Default)]
struct Inner {
    players: HashMap<Identity, PlayerRecord>,

    /// The only send end of each open mailbox. Removing an entry closes
    /// that mailbox.
    mailboxes: HashMap<ConnectionId, mpsc::Sender<String>>,

    /// Reverse index from connection to owner, kept in step with
    /// `mailboxes` and each record's `connections`.
    owners: HashMap<ConnectionId, Identity>,

    next_id: u64,
}

/// Tracks registered identities and their live connections, and routes
/// messages to them.
///
/// Built once at startup and shared by `Arc` with every connection task:
///
/// ```text
/// connect(identity) ──→ [Admitted: mailbox open] ──→ disconnect(id) ──→ [Retired]
///        │                                                   │
///        └─ first connection: start inbound router           └─ last connection: close inbound queue
/// ```
pub struct Registry {
    inner: Mutex<Inner>,
    config: RegistryConfig,
    handler: Arc<dyn InboundHandler>,
    presence: Arc<dyn PresenceHook>,
    stats: DeliveryStats,
}

impl Registry {
    /// Creates a registry for a fixed set of identities.
    ///
    /// Inbound messages go to [`LogHandler`] and presence changes are not
    /// announced until configured otherwise.
    pub fn new<I>(config: RegistryConfig, identities: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        let players = identities
            .into_iter()
            .map(|identity| {
                let identity = identity.into();
                (identity.clone(), PlayerRecord::new(identity))
            })
            .collect();

        Self {
            inner: Mutex::new(Inner {
                players,
                ..Inner::default()
            }),
            config,
            handler: Arc::new(LogHandler),
            presence: Arc::new(Silent),
            stats: DeliveryStats::default(),
        }
    }

    /// Replaces the inbound handler used by routers started from now on.
    pub fn with_inbound_handler(mut self, handler: impl InboundHandler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Replaces the presence hook.
    pub fn with_presence(mut self, presence: impl PresenceHook) -> Self {
        self.presence = Arc::new(presence);
        self
    }

    /// Returns the registry's configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Admits a new connection for `identity`.
    ///
    /// If this is the identity's first live connection, its inbound queue
    /// is created, its router started, and its arrival announced.
    /// Everything happens in one critical section: concurrent callers see
    /// either none or all of it.
    ///
    /// # Errors
    /// - [`SessionError::UnknownIdentity`]: no such registered identity
    /// - [`SessionError::Busy`]: lock wait bound exceeded
    pub async fn connect(&self, identity: &str) -> Result<ConnectionHandle, SessionError> {
        let mut guard = self.lock().await?;
        // Reborrow once so the maps and the counter can be borrowed
        // independently.
        let inner = &mut *guard;

        let record = inner
            .players
            .get_mut(identity)
            .ok_or_else(|| SessionError::UnknownIdentity(Identity::from(identity)))?;

        let first = record.connections.is_empty();
        let inbound = match &record.inbound {
            Some(tx) => tx.downgrade(),
            None => {
                let (tx, rx) = mpsc::channel(self.config.inbound_slots());
                // The old router, if any, is handed to the new one to wait on.
                let previous = record.router.take();
                record.router = Some(spawn_router(
                    record.identity.clone(),
                    rx,
                    Arc::clone(&self.handler),
                    previous,
                ));
                record.inbound.insert(tx).downgrade()
            }
        };

        let id = ConnectionId(inner.next_id);
        inner.next_id += 1;

        let (mailbox, outbound) = mpsc::channel(self.config.mailbox_slots());
        inner.mailboxes.insert(id, mailbox);
        inner.owners.insert(id, record.identity.clone());
        record.connections.insert(id);

        tracing::info!(
            identity = %record.identity,
            connection_id = %id,
            connections = record.connections.len(),
            "connection admitted"
        );

        let identity = record.identity.clone();
        if first {
            if let Some(message) = self.presence.on_arrival(&identity) {
                self.broadcast(&inner.mailboxes, &message);
            }
        }

        let inbound = InboundSender::new(identity.clone(), inbound);
        Ok(ConnectionHandle::new(id, identity, outbound, inbound))
    }

    /// Retires a connection.
    ///
    /// Closes its mailbox (the transport's receive end drains what's left,
    /// then sees end-of-stream). If it was the owner's last connection, the
    /// owner's inbound queue is closed too, which stops its router, and
    /// the departure is announced to everyone still connected.
    ///
    /// # Errors
    /// - [`SessionError::UnknownConnection`]: never issued, or already
    ///   retired. Nothing is closed twice.
    /// - [`SessionError::Busy`]: lock wait bound exceeded
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), SessionError> {
        let mut guard = self.lock().await?;
        self.remove_connection(&mut guard, id)
    }

    /// Same as [`disconnect`](Self::disconnect), but waits for the lock
    /// without the configured bound, so it never fails with
    /// [`SessionError::Busy`].
    ///
    /// For the task that owns a connection and is on its way out.
    pub async fn retire(&self, id: ConnectionId) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().await;
        self.remove_connection(&mut guard, id)
    }

    /// Delivers `message` to every open mailbox.
    ///
    /// Never waits on a recipient: a full mailbox drops the message and
    /// bumps [`DeliveryReport::dropped`]. Returns how many mailboxes
    /// accepted it.
    pub async fn notify_everyone(&self, message: &str) -> Result<usize, SessionError> {
        let inner = self.lock().await?;
        Ok(self.broadcast(&inner.mailboxes, message))
    }

    /// Delivers `message` to every open mailbox owned by `identity`.
    ///
    /// Same non-blocking policy as [`notify_everyone`](Self::notify_everyone).
    /// Returns how many of the identity's mailboxes accepted it.
    ///
    /// # Errors
    /// [`SessionError::UnknownIdentity`] if the identity isn't registered
    /// or has no live connections. Nothing is sent in that case.
    pub async fn to_player(&self, identity: &str, message: &str) -> Result<usize, SessionError> {
        let inner = self.lock().await?;

        let record = inner
            .players
            .get(identity)
            .filter(|record| !record.connections.is_empty())
            .ok_or_else(|| SessionError::UnknownIdentity(Identity::from(identity)))?;

        let delivered = record
            .connections
            .iter()
            .filter_map(|id| inner.mailboxes.get(id).map(|mailbox| (*id, mailbox)))
            .filter(|(id, mailbox)| self.deliver(*id, mailbox, message))
            .count();

        tracing::debug!(identity = %record.identity, delivered, "direct message");
        Ok(delivered)
    }

    /// Returns the number of open connections across all identities.
    pub async fn connection_count(&self) -> Result<usize, SessionError> {
        Ok(self.lock().await?.mailboxes.len())
    }

    /// Returns the connections `identity` currently owns, oldest first.
    ///
    /// # Errors
    /// [`SessionError::UnknownIdentity`] if the identity isn't registered.
    pub async fn connections_of(&self, identity: &str) -> Result<Vec<ConnectionId>, SessionError> {
        let inner = self.lock().await?;
        inner
            .players
            .get(identity)
            .map(|record| record.connections.iter().copied().collect())
            .ok_or_else(|| SessionError::UnknownIdentity(Identity::from(identity)))
    }

    /// Returns the identity that owns a live connection.
    pub async fn identity_of(&self, id: ConnectionId) -> Result<Identity, SessionError> {
        let inner = self.lock().await?;
        inner
            .owners
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownConnection(id))
    }

    /// Returns `true` if `identity` has at least one live connection.
    pub async fn is_online(&self, identity: &str) -> Result<bool, SessionError> {
        let inner = self.lock().await?;
        Ok(inner
            .players
            .get(identity)
            .is_some_and(|record| !record.connections.is_empty()))
    }

    /// Returns every identity with at least one live connection, sorted.
    pub async fn online_identities(&self) -> Result<Vec<Identity>, SessionError> {
        let inner = self.lock().await?;
        let mut online: Vec<Identity> = inner
            .players
            .values()
            .filter(|record| !record.connections.is_empty())
            .map(|record| record.identity.clone())
            .collect();
        online.sort();
        Ok(online)
    }

    /// Returns the delivery counters.
    pub fn stats(&self) -> DeliveryReport {
        self.stats.report()
    }

    /// Acquires the registry lock, honoring the configured wait bound.
    async fn lock(&self) -> Result<MutexGuard<'_, Inner>, SessionError> {
        match self.config.lock_timeout() {
            None => Ok(self.inner.lock().await),
            Some(limit) => tokio::time::timeout(limit, self.inner.lock())
                .await
                .map_err(|_| {
                    tracing::warn!(?limit, "registry lock wait exceeded");
                    SessionError::Busy
                }),
        }
    }

    /// The body of [`disconnect`](Self::disconnect), run under the lock.
    fn remove_connection(&self, inner: &mut Inner, id: ConnectionId) -> Result<(), SessionError> {
        let identity = inner
            .owners
            .remove(&id)
            .ok_or(SessionError::UnknownConnection(id))?;

        // Dropping the only sender closes the mailbox.
        inner.mailboxes.remove(&id);

        let mut last = false;
        if let Some(record) = inner.players.get_mut(&identity) {
            record.connections.remove(&id);
            if record.connections.is_empty() {
                // Same for the inbound queue: the router drains it and
                // exits.
                record.inbound = None;
                last = true;
            }
            tracing::info!(
                %identity,
                connection_id = %id,
                connections = record.connections.len(),
                "connection retired"
            );
        }

        if last {
            if let Some(message) = self.presence.on_departure(&identity) {
                self.broadcast(&inner.mailboxes, &message);
            }
        }
        Ok(())
    }

    /// Offers `message` to every mailbox in `mailboxes`. Returns how many
    /// accepted it.
    fn broadcast(
        &self,
        mailboxes: &HashMap<ConnectionId, mpsc::Sender<String>>,
        message: &str,
    ) -> usize {
        let delivered = mailboxes
            .iter()
            .filter(|(id, mailbox)| self.deliver(**id, mailbox, message))
            .count();

        tracing::debug!(recipients = mailboxes.len(), delivered, "broadcast");
        delivered
    }

    /// Offers one message to one mailbox without waiting.
    fn deliver(&self, id: ConnectionId, mailbox: &mpsc::Sender<String>, message: &str) -> bool {
        match mailbox.try_send(message.to_owned()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.stats.record_dropped();
                tracing::warn!(connection_id = %id, "mailbox full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.record_orphaned();
                tracing::debug!(connection_id = %id, "mailbox receiver gone, message discarded");
                false
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
