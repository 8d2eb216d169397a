use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

/// Free-form status lines from the engines, kept in a bounded ring.
///
/// Oldest lines are dropped once the ring is full. A live consumer (the CLI)
/// can additionally `subscribe` to an mpsc feed; timestamps are the
/// consumer's concern.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
    subscriber: Mutex<Option<Sender<String>>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                lines: Mutex::new(VecDeque::new()),
                subscriber: Mutex::new(None),
            }),
        }
    }

    pub fn emit(&self, msg: impl Into<String>) {
        let msg = msg.into();
        {
            let mut lines = self.inner.lines.lock();
            if lines.len() == self.inner.capacity {
                lines.pop_front();
            }
            lines.push_back(msg.clone());
        }

        let mut subscriber = self.inner.subscriber.lock();
        if let Some(tx) = subscriber.as_ref() {
            if tx.send(msg).is_err() {
                // Receiver went away; stop forwarding.
                *subscriber = None;
            }
        }
    }

    /// Attach a live feed. Replaces any previous subscriber.
    pub fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        *self.inner.subscriber.lock() = Some(tx);
        rx
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lines.lock().iter().cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100)
    }
}
