//! Call signaling: room provisioning on the outgoing side, the single
//! pending-call slot on the incoming side.
//!
//! Only one call can be surfaced to the user at a time, so a new
//! `incoming_call` replaces any unhandled one — last call wins, no queueing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use room_service::{RoomGrant, RoomProvisioner, RoomRequest, RoomServiceError};
use shared::protocol::{CallDeclinedPayload, ClientSignal, EventKey, HubEvent, IncomingCallPayload};
use tracing::{debug, info};

use crate::{bus::EventBus, transport::HubConnection};

pub struct CallSignaling {
    conn: Arc<HubConnection>,
    rooms: Arc<dyn RoomProvisioner>,
    pending: Mutex<Option<IncomingCallPayload>>,
}

impl CallSignaling {
    /// Builds the signaling client and subscribes it to `incoming_call` on
    /// the bus.
    pub(crate) fn attach(
        conn: Arc<HubConnection>,
        rooms: Arc<dyn RoomProvisioner>,
        bus: &EventBus,
    ) -> Arc<Self> {
        let calls = Arc::new(Self {
            conn,
            rooms,
            pending: Mutex::new(None),
        });

        let weak = Arc::downgrade(&calls);
        bus.subscribe(EventKey::IncomingCall, move |event| {
            let Some(calls) = weak.upgrade() else {
                return;
            };
            if let HubEvent::IncomingCall(payload) = event {
                calls.set_pending(payload.clone());
            }
        });

        calls
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<IncomingCallPayload>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_pending(&self, call: IncomingCallPayload) {
        info!(room = %call.room_id, from = %call.from_username, video = call.is_video, "incoming call");
        if let Some(previous) = self.pending_slot().replace(call) {
            debug!(room = %previous.room_id, "replaced unhandled pending call");
        }
    }

    /// The most recent unhandled incoming call, if any.
    pub fn pending_call(&self) -> Option<IncomingCallPayload> {
        self.pending_slot().clone()
    }

    /// Clears the pending slot and hands the call back to the caller, who is
    /// responsible for actually joining the room.
    pub fn accept_call(&self) -> Option<IncomingCallPayload> {
        let call = self.pending_slot().take();
        if let Some(call) = &call {
            info!(room = %call.room_id, "accepted incoming call");
        }
        call
    }

    /// Clears the pending call and notifies the remote party. Declining with
    /// nothing pending emits nothing and is not an error.
    pub fn decline_call(&self) {
        let Some(call) = self.pending_slot().take() else {
            return;
        };
        info!(room = %call.room_id, from = %call.from_user_id, "declined incoming call");
        self.conn.emit(ClientSignal::CallDeclined(CallDeclinedPayload {
            room_id: call.room_id,
            from_user_id: call.from_user_id,
        }));
    }

    /// Clears the pending call without any outbound side effect, e.g. on a
    /// ring timeout.
    pub fn clear_incoming_call(&self) {
        if self.pending_slot().take().is_some() {
            debug!("cleared pending incoming call");
        }
    }

    /// Provisions a conferencing room. Validation and HTTP failures surface
    /// to the caller; there is no automatic retry for call initiation.
    pub async fn request_room(&self, request: &RoomRequest) -> Result<RoomGrant, RoomServiceError> {
        self.rooms.create_room(request).await
    }
}
