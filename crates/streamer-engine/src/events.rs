//! Subscriber fan-out for coordinator events.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use streamer_ipc::{event_channel, StreamEvent};

/// Publishes [`StreamEvent`]s to any number of subscribers.
///
/// Each subscriber gets its own bounded channel. Publishing never blocks:
/// a full subscriber misses the event, a dropped receiver is pruned.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

struct BusInner {
    subscribers: Vec<Sender<StreamEvent>>,
    closed: bool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Register a subscriber. After [`close`](Self::close) the returned
    /// receiver is already disconnected.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = event_channel();
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: StreamEvent) {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!(?event, "Event bus closed, event discarded");
            return;
        }

        inner.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber channel full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Drop every subscriber channel and refuse new ones.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
