//! Presence announcements on an identity's first and last connection.

use std::sync::Arc;

use hearth_protocol::Identity;

/// Decides what, if anything, everyone hears when an identity comes
/// online (first connection admitted) or goes offline (last connection
/// retired). A second tab opening or closing is not an arrival or a
/// departure.
///
/// The returned text is broadcast in the same critical section as the
/// registry's bookkeeping, after it: the arriving identity's new
/// connection hears its own arrival and a departing identity hears
/// nothing. Hooks run under the registry lock, so keep them cheap.
pub trait PresenceHook: Send + Sync + 'static {
    /// Message to broadcast when `identity` comes online.
    fn on_arrival(&self, identity: &Identity) -> Option<String>;

    /// Message to broadcast when `identity` goes offline.
    fn on_departure(&self, identity: &Identity) -> Option<String>;
}

impl<T: PresenceHook + ?Sized> PresenceHook for Arc<T> {
    fn on_arrival(&self, identity: &Identity) -> Option<String> {
        (**self).on_arrival(identity)
    }

    fn on_departure(&self, identity: &Identity) -> Option<String> {
        (**self).on_departure(identity)
    }
}

/// Announces nothing. The registry's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl PresenceHook for Silent {
    fn on_arrival(&self, _identity: &Identity) -> Option<String> {
        None
    }

    fn on_departure(&self, _identity: &Identity) -> Option<String> {
        None
    }
}

/// Announces arrivals and departures in plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Announce;

impl PresenceHook for Announce {
    fn on_arrival(&self, identity: &Identity) -> Option<String> {
        Some(format!("{identity} has connected."))
    }

    fn on_departure(&self, identity: &Identity) -> Option<String> {
        Some(format!("{identity} has disconnected."))
    }
}
