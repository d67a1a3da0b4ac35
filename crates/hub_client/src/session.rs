//! Binds the hub connection to the application's authentication state.
//!
//! `apply` is idempotent: re-applying an unchanged snapshot (a UI re-render)
//! never tears the channel down or re-registers. Logout only deregisters —
//! the channel is kept open so the next login re-associates without a full
//! handshake; a hard disconnect is reserved for app teardown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::{DeviceId, UserProfile, UserSessionId};
use tracing::{info, warn};

use crate::{presence::PresenceTracker, transport::HubConnection};

/// What the authentication layer knows right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
}

pub struct SessionLifecycle {
    conn: Arc<HubConnection>,
    presence: Arc<PresenceTracker>,
    bound: Mutex<Option<UserSessionId>>,
}

impl SessionLifecycle {
    pub(crate) fn new(conn: Arc<HubConnection>, presence: Arc<PresenceTracker>) -> Self {
        Self {
            conn,
            presence,
            bound: Mutex::new(None),
        }
    }

    fn bound(&self) -> MutexGuard<'_, Option<UserSessionId>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies an authentication transition. Must be called from within a
    /// Tokio runtime (it may start the hub connection).
    pub fn apply(&self, snapshot: &AuthSnapshot) {
        let identity = if snapshot.is_authenticated {
            let identity = snapshot.user.as_ref().and_then(UserSessionId::from_profile);
            if identity.is_none() && snapshot.user.is_some() {
                // Fails closed: no numeric id, no connection, no registration.
                warn!("authenticated user record has no numeric id; skipping presence binding");
            }
            identity
        } else {
            None
        };

        let mut bound = self.bound();
        if *bound == identity {
            return;
        }

        match identity {
            Some(identifier) => {
                let device = DeviceId::generate();
                info!(user = %identifier, device = device.as_str(), "binding session identity");
                if self.conn.is_connected() {
                    // The channel survived a logout or an identity change;
                    // re-associate over it instead of reconnecting.
                    self.presence.register_user(identifier.clone(), Some(device));
                } else {
                    self.conn.connect(Some(identifier.clone()), Some(device));
                }
                *bound = Some(identifier);
            }
            None => {
                if bound.take().is_some() {
                    info!("session identity cleared; deregistering user");
                    self.presence.deregister_user();
                }
            }
        }
    }

    pub fn bound_identity(&self) -> Option<UserSessionId> {
        self.bound().clone()
    }
}
