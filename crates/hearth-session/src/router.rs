//! Per-identity inbound routers.
//!
//! Each identity with at least one live connection has exactly one router
//! task. It is the single consumer of that identity's inbound queue, so
//! messages from all of the identity's connections are handled one at a
//! time, in the order they reached the queue.
//!
//! The router has no stop signal. It ends when the registry drops the
//! queue's only owning sender (last connection retired) and the queue has
//! been drained. A router started for a returning identity first waits
//! out its predecessor.

use std::sync::Arc;

use hearth_protocol::Identity;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where inbound messages end up.
///
/// This is the extension point for command dispatch. Implementations run
/// on the router task and should not block; spawn if there's real work.
pub trait InboundHandler: Send + Sync + 'static {
    /// Handles one message sent by any connection of `identity`.
    fn handle(&self, identity: &Identity, message: String);

    /// Called once, after the identity's queue was closed and drained.
    fn closed(&self, identity: &Identity) {
        let _ = identity;
    }
}

impl<T: InboundHandler + ?Sized> InboundHandler for Arc<T> {
    fn handle(&self, identity: &Identity, message: String) {
        (**self).handle(identity, message);
    }

    fn closed(&self, identity: &Identity) {
        (**self).closed(identity);
    }
}

/// The default handler: logs every message and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl InboundHandler for LogHandler {
    fn handle(&self, identity: &Identity, message: String) {
        tracing::debug!(%identity, %message, "inbound message");
    }
}

/// Starts the router task for one identity.
///
/// If the identity had a router before, the new task waits for it to
/// finish before taking its first message, so two routers never handle
/// the same identity at once.
pub(crate) fn spawn_router(
    identity: Identity,
    mut queue: mpsc::Receiver<String>,
    handler: Arc<dyn InboundHandler>,
    previous: Option<JoinHandle<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                tracing::warn!(%identity, error = %e, "previous inbound router failed");
            }
        }
        tracing::debug!(%identity, "inbound router started");

        while let Some(message) = queue.recv().await {
            handler.handle(&identity, message);
        }

        handler.closed(&identity);
        tracing::debug!(%identity, "inbound router stopped");
    })
}
