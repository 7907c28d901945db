//! What a transport gets back from [`Registry::connect`](crate::Registry::connect).

use hearth_protocol::{ConnectionId, Identity};
use tokio::sync::mpsc;

use crate::SessionError;

/// The capability a transport needs to run one connection, and nothing
/// more: the receive end of its mailbox and the send end of its
/// identity's inbound queue. The registry's maps stay private.
///
/// The transport must drain [`recv`](Self::recv) until it returns `None`
/// and call [`Registry::disconnect`](crate::Registry::disconnect) exactly
/// once when the socket ends.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    identity: Identity,
    outbound: mpsc::Receiver<String>,
    inbound: InboundSender,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Receiver<String>,
        inbound: InboundSender,
    ) -> Self {
        Self {
            id,
            identity,
            outbound,
            inbound,
        }
    }

    /// The id the registry issued for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The identity that owns this connection.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Waits for the next outbound message.
    ///
    /// Returns `None` once the connection has been retired and every
    /// message queued before that has been handed out.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Takes the next outbound message if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// The inbound send end, for forwarding what the client sends.
    pub fn inbound(&self) -> &InboundSender {
        &self.inbound
    }

    /// Splits the handle so the writer half and the reader half can live in
    /// different tasks.
    pub fn into_parts(self) -> (ConnectionId, mpsc::Receiver<String>, InboundSender) {
        (self.id, self.outbound, self.inbound)
    }
}

/// Send end of an identity's inbound queue.
///
/// Every connection of the same identity holds one of these, all pointing
/// at the same queue. They do not keep the queue alive: the registry owns
/// it, and once the identity's last connection is retired every send
/// fails with [`SessionError::InboundClosed`].
#[derive(Debug, Clone)]
pub struct InboundSender {
    identity: Identity,
    tx: mpsc::WeakSender<String>,
}

impl InboundSender {
    pub(crate) fn new(identity: Identity, tx: mpsc::WeakSender<String>) -> Self {
        Self { identity, tx }
    }

    /// Queues a message for the identity's router.
    ///
    /// Waits while the queue is full, so a client that outpaces its router
    /// slows down only its own reader.
    pub async fn send(&self, message: String) -> Result<(), SessionError> {
        let tx = self
            .tx
            .upgrade()
            .ok_or_else(|| SessionError::InboundClosed(self.identity.clone()))?;
        tx.send(message)
            .await
            .map_err(|_| SessionError::InboundClosed(self.identity.clone()))
    }

    /// Returns `true` once the queue has been retired.
    pub fn is_closed(&self) -> bool {
        self.tx.upgrade().is_none()
    }

    /// Returns `true` if both senders feed the same live queue.
    pub fn same_queue(&self, other: &Self) -> bool {
        match (self.tx.upgrade(), other.tx.upgrade()) {
            (Some(a), Some(b)) => a.same_channel(&b),
            _ => false,
        }
    }
}
