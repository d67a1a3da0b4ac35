//! In-process publish/subscribe registry decoupling the hub transport from
//! UI and business consumers.
//!
//! Dispatch guarantees: handlers run in registration order; a panicking
//! handler is caught and logged without affecting its siblings or the
//! publisher; a handler that unsubscribes mid-dispatch (even for the event
//! currently being delivered) is not invoked afterwards.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::protocol::{EventKey, HubEvent};
use tracing::error;

pub type ListenerId = u64;

type Handler = Arc<dyn Fn(&HubEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: ListenerId,
    by_key: HashMap<EventKey, Vec<(ListenerId, Handler)>>,
    keys_by_id: HashMap<ListenerId, EventKey>,
}

#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(
        &self,
        key: EventKey,
        handler: impl Fn(&HubEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.keys_by_id.insert(id, key.clone());
        registry
            .by_key
            .entry(key)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removing a listener that is already gone is a no-op.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let Some(key) = registry.keys_by_id.remove(&id) else {
            return false;
        };
        if let Some(handlers) = registry.by_key.get_mut(&key) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            if handlers.is_empty() {
                registry.by_key.remove(&key);
            }
        }
        true
    }

    pub fn publish(&self, event: &HubEvent) {
        let snapshot: Vec<(ListenerId, Handler)> = {
            let registry = self.registry();
            registry
                .by_key
                .get(&event.key())
                .cloned()
                .unwrap_or_default()
        };

        for (id, handler) in snapshot {
            // The registry lock is never held across a handler call, so
            // handlers are free to subscribe/unsubscribe; anything removed
            // since the snapshot is skipped here.
            if !self.registry().keys_by_id.contains_key(&id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(
                    listener = id,
                    event = ?event.key(),
                    "event listener panicked; remaining listeners still run"
                );
            }
        }
    }

    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.registry()
            .by_key
            .get(key)
            .map(Vec::len)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
