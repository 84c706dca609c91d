//! Pending chat queue with collapse-to-newest admission.

use crate::chat::event::ChatEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Events waiting for a reply.
///
/// Admission never lets a backlog build up: pushing while older events are
/// still waiting discards them and keeps only the newest one.
#[derive(Debug, Default)]
pub struct PendingQueue {
    events: VecDeque<ChatEvent>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`, collapsing any backlog. Returns how many events were discarded.
    pub fn push(&mut self, event: ChatEvent) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        self.events.push_back(event);
        dropped
    }

    /// Takes the next event to process.
    pub fn pop(&mut self) -> Option<ChatEvent> {
        self.events.pop_front()
    }

    /// Drops everything. Returns how many events were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Handle to a [`PendingQueue`] shared between the admission filter (push only)
/// and the response worker (pop and clear).
#[derive(Debug, Clone, Default)]
pub struct SharedQueue {
    inner: Arc<Mutex<PendingQueue>>,
    notify: Arc<Notify>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingQueue> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends with collapse and wakes the worker.
    pub fn push(&self, event: ChatEvent) -> usize {
        let dropped = self.lock().push(event);
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<ChatEvent> {
        self.lock().pop()
    }

    pub fn clear(&self) -> usize {
        self.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves after the next push (or immediately if one happened since the last wait).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
