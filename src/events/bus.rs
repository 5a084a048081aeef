//! # Event bus for supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]: the supervisor
//! loop and the subscriber workers publish, one listener fans events out to the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Architecture
//! ```text
//! Publishers:                          Listener (one):
//!   Supervisor::run_pass ──┐
//!   Supervisor::run      ──┼──► Bus ──► subscriber_listener ──► SubscriberSet
//!   SubscriberSet workers ─┘   (broadcast)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
