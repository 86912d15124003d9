//! DB change broker (C2).
//!
//! Sits above the durable store and fans out change notifications to
//! subscribers. Bursts of writes within a short window collapse into one
//! `DbChanged` event; a slow subscriber loses intermediate events but
//! never blocks a publisher, because the eventual event is sufficient --
//! every consumer re-polls the store rather than trusting event payloads.
//!
//! `gator-core` has no equivalent component (its harness streams are
//! per-agent, not store-wide), so this is built from first principles on
//! `tokio::sync::watch`, whose single-slot "latest value wins" semantics
//! are exactly the coalescing behavior this needs.

use tokio::sync::watch;

/// An event published by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A write committed to the durable store.
    DbChanged,
    /// The watcher observing the backing file failed; subscribers should
    /// fall back to their own timer tick rather than waiting on events.
    WatcherError,
}

/// Debounced fan-out of [`ChangeEvent`]s.
///
/// Internally a `watch` channel: every `notify` overwrites the single
/// pending slot, so N writes inside one dispatcher tick produce at most
/// one wakeup. Subscribing is cheap and unlimited; dropping a
/// [`ChangeSubscriber`] removes it without disturbing the others, since
/// `watch::Receiver` tracks its own "seen" cursor independently.
#[derive(Debug, Clone)]
pub struct ChangeBroker {
    tx: watch::Sender<ChangeEvent>,
}

impl ChangeBroker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ChangeEvent::DbChanged);
        Self { tx }
    }

    /// Publish a change. Coalesces with any not-yet-observed prior event.
    pub fn notify(&self, event: ChangeEvent) {
        // `send` only errors when every receiver has been dropped, which is
        // not a failure the publisher needs to act on.
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events. The new subscriber does not see events
    /// published before it subscribed.
    pub fn subscribe(&self) -> ChangeSubscriber {
        ChangeSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's view of the broker.
pub struct ChangeSubscriber {
    rx: watch::Receiver<ChangeEvent>,
}

impl ChangeSubscriber {
    /// Wait for the next not-yet-observed event. Returns `None` if the
    /// broker has been dropped (all senders gone).
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
