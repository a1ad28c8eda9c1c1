//! Event source doubles

use flowbus::pipeline::{Emitter, EventSource, Listener, SubscriptionId};
use std::cell::Cell;

/// Emitter that counts subscribe and unsubscribe calls
#[derive(Default)]
pub struct CountingSource {
    pub emitter: Emitter,
    pub subscribed: Cell<usize>,
    pub unsubscribed: Cell<usize>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSource for CountingSource {
    fn subscribe(&self, event: &str, listener: Listener, use_capture: bool) -> SubscriptionId {
        self.subscribed.set(self.subscribed.get() + 1);
        self.emitter.subscribe(event, listener, use_capture)
    }

    fn unsubscribe(&self, event: &str, id: SubscriptionId, use_capture: bool) {
        self.unsubscribed.set(self.unsubscribed.get() + 1);
        self.emitter.unsubscribe(event, id, use_capture);
    }
}
