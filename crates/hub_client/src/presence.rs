//! Tracks which users the hub currently reports as online.
//!
//! The hub is the source of truth: every `online_users_update` carries the
//! full set and replaces the local one wholesale. Out-of-order delivery can
//! therefore only cause a transient stale view, never a bad merge.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{DeviceId, UserSessionId},
    protocol::{EventKey, HubEvent},
};
use tracing::debug;

use crate::{bus::EventBus, transport::HubConnection};

pub struct PresenceTracker {
    conn: Arc<HubConnection>,
    online: Mutex<HashSet<String>>,
}

impl PresenceTracker {
    /// Builds the tracker and subscribes it to online-set updates on the bus.
    pub(crate) fn attach(conn: Arc<HubConnection>, bus: &EventBus) -> Arc<Self> {
        let tracker = Arc::new(Self {
            conn,
            online: Mutex::new(HashSet::new()),
        });

        let weak = Arc::downgrade(&tracker);
        bus.subscribe(EventKey::OnlineUsersUpdate, move |event| {
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            if let HubEvent::OnlineUsersUpdate(payload) = event {
                tracker.replace_online(payload.online_users.iter().cloned());
            }
        });

        tracker
    }

    fn online_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.online.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_online(&self, identifiers: impl Iterator<Item = String>) {
        let next: HashSet<String> = identifiers.collect();
        debug!(count = next.len(), "online set replaced");
        *self.online_set() = next;
    }

    pub(crate) fn clear(&self) {
        self.online_set().clear();
    }

    /// Announces `identifier` to the hub. Only effective while connected;
    /// otherwise logged and dropped, since the transport re-issues the
    /// registration on its next successful open.
    pub fn register_user(&self, identifier: UserSessionId, device: Option<DeviceId>) {
        self.conn.register_user(identifier, device);
    }

    /// Stops counting this client as the current user without severing the
    /// channel, so a following login re-associates cheaply.
    pub fn deregister_user(&self) {
        self.conn.deregister_user();
    }

    pub fn online_users(&self) -> Vec<String> {
        self.online_set().iter().cloned().collect()
    }

    /// Numeric ids of everyone online; identifiers that do not parse are
    /// skipped.
    pub fn online_user_ids(&self) -> HashSet<i64> {
        self.online_set()
            .iter()
            .filter_map(|identifier| UserSessionId::parse_user_id(identifier))
            .collect()
    }

    /// Compares by the leading numeric segment of each identifier; malformed
    /// entries never match.
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.online_set()
            .iter()
            .any(|identifier| UserSessionId::parse_user_id(identifier) == Some(user_id))
    }
}
