//! Recent event history

use std::collections::VecDeque;

use dispatch_shared::EventMessage;
use parking_lot::Mutex;

/// Bounded, newest-first buffer of received events
#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    events: Mutex<VecDeque<EventMessage>>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record an event, evicting the oldest once full
    pub fn push(&self, event: EventMessage) {
        let mut events = self.events.lock();
        events.push_front(event);
        events.truncate(self.capacity);
    }

    /// Copy of the buffer, newest first
    pub fn snapshot(&self) -> Vec<EventMessage> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
