//! Fan-out of log deltas to every connected viewer.
//!
//! Each subscriber gets its own bounded `tokio::sync::mpsc` channel so that a
//! slow viewer can never hold up the tail loop. A subscriber whose channel is
//! full or closed is evicted during the broadcast that failed to reach it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::reader::LogDelta;

/// Default number of messages queued per subscriber before it is considered
/// too slow and evicted.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Unique identifier for a registered subscriber.
pub type SubscriberId = u64;

/// Formats a delta as the text pushed to viewers:
/// `File: <path>\n<line1>\n<line2>...`.
pub fn format_delta(delta: &LogDelta) -> String {
    format!("File: {}\n{}", delta.source().display(), delta.lines().join("\n"))
}

/// The set of currently connected subscribers.
///
/// `register`, `unregister` and `broadcast` share a single lock, and
/// `broadcast` holds it for the whole pass, so a message is never delivered to
/// a subscriber that is halfway through being removed.
#[derive(Debug)]
pub struct Hub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>,
    buffer_capacity: usize,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new(buffer_capacity: usize) -> Self {
        Hub {
            subscribers: Mutex::new(HashMap::new()),
            buffer_capacity: buffer_capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber.
    ///
    /// The returned [`Subscription`] receives every message broadcast from now
    /// on, and unregisters itself when dropped.
    pub fn register(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer_capacity);

        self.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");

        Subscription {
            id,
            receiver: rx,
            hub: Arc::clone(self),
        }
    }

    /// Removes a subscriber, returning whether it was still registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber unregistered");
        }
        removed
    }

    /// Sends `message` to every registered subscriber.
    ///
    /// Delivery never waits: a subscriber whose queue is full or whose
    /// connection is gone is dropped from the set. Returns the number of
    /// subscribers that accepted the message.
    pub fn broadcast(&self, message: impl Into<Arc<str>>) -> usize {
        let message = message.into();
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&message)) {
            Ok(()) => true,
            Err(e) => {
                // Dropping the sender closes the subscriber's connection
                debug!(subscriber = *id, error = %e, "evicting subscriber");
                false
            }
        });

        subscribers.len()
    }

    /// Returns the number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// A registered subscriber's end of the hub.
///
/// Yields `None` from [`recv`](Subscription::recv) once the hub has evicted
/// it. Dropping it unregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<str>>,
    hub: Arc<Hub>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next broadcast message.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Returns a message if one is queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
