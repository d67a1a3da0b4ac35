//! Real-time presence and call-signaling client.
//!
//! One [`HubClient`] per process (or per test) owns the event bus, the hub
//! connection, the presence tracker, the call-signaling client, and the
//! session lifecycle glue. There is no global state: tests can run multiple
//! isolated instances concurrently.

use std::sync::Arc;

use room_service::{RoomProvisioner, RoomServiceClient, RoomServiceConfig};

pub mod bus;
pub mod call;
pub mod config;
pub mod presence;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use bus::{EventBus, ListenerId};
pub use call::CallSignaling;
pub use config::{load_settings, HubSettings};
pub use presence::PresenceTracker;
pub use reconnect::ReconnectPolicy;
pub use session::{AuthSnapshot, SessionLifecycle};
pub use transport::HubConnection;

pub struct HubClient {
    settings: HubSettings,
    bus: Arc<EventBus>,
    connection: Arc<HubConnection>,
    presence: Arc<PresenceTracker>,
    calls: Arc<CallSignaling>,
    session: SessionLifecycle,
}

impl HubClient {
    pub fn new(settings: HubSettings) -> Arc<Self> {
        let rooms = Arc::new(RoomServiceClient::new(RoomServiceConfig {
            base_url: settings.room_api_url.clone(),
            api_key: settings.api_key.clone(),
        }));
        Self::new_with_provisioner(settings, rooms)
    }

    /// Injects a room provisioner, e.g. a test double.
    pub fn new_with_provisioner(
        settings: HubSettings,
        rooms: Arc<dyn RoomProvisioner>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let connection = HubConnection::new(settings.clone(), Arc::clone(&bus));
        let presence = PresenceTracker::attach(Arc::clone(&connection), &bus);
        let calls = CallSignaling::attach(Arc::clone(&connection), rooms, &bus);
        let session = SessionLifecycle::new(Arc::clone(&connection), Arc::clone(&presence));

        Arc::new(Self {
            settings,
            bus,
            connection,
            presence,
            calls,
            session,
        })
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn connection(&self) -> &Arc<HubConnection> {
        &self.connection
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn calls(&self) -> &Arc<CallSignaling> {
        &self.calls
    }

    /// Feeds an authentication transition into the session lifecycle glue.
    pub fn handle_auth_change(&self, snapshot: &AuthSnapshot) {
        self.session.apply(snapshot);
    }

    /// Hard teardown: closes the channel and forgets the online set. The
    /// session glue never calls this on logout; it is for app shutdown.
    pub fn disconnect(&self) {
        self.connection.disconnect();
        self.presence.clear();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
