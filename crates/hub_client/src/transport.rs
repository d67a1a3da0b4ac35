//! The single long-lived hub channel: connection state machine, reader and
//! writer tasks, and the reconnect backstop.
//!
//! One `HubConnection` instance owns one logical channel. All lifecycle
//! transitions happen here; consumers only read [`ConnectionState`]. A
//! monotonically increasing epoch stamps every spawned task so that a later
//! `connect`/`disconnect` deterministically supersedes stale readers and
//! pending reconnect timers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::{ConnectionState, DeviceId, UserSessionId},
    protocol::{AddUserPayload, AuthPayload, ClientSignal, HubEvent},
};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, handshake::client::Request, Message},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    bus::EventBus,
    config::{normalize_hub_url, HubSettings},
};

#[derive(Clone)]
struct BoundIdentity {
    user: UserSessionId,
    device: Option<DeviceId>,
}

struct ConnInner {
    state: ConnectionState,
    /// Bumped by every `connect`/`disconnect`; tasks carrying an older epoch
    /// are superseded and must not touch shared state.
    epoch: u64,
    attempts: u32,
    identity: Option<BoundIdentity>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

pub struct HubConnection {
    settings: HubSettings,
    bus: Arc<EventBus>,
    inner: Mutex<ConnInner>,
}

impl HubConnection {
    pub fn new(settings: HubSettings, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            bus,
            inner: Mutex::new(ConnInner {
                state: ConnectionState::Disconnected,
                epoch: 0,
                attempts: 0,
                identity: None,
                outbound: None,
                reader_task: None,
                reconnect_task: None,
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, ConnInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner().attempts
    }

    pub fn current_identity(&self) -> Option<UserSessionId> {
        self.inner().identity.as_ref().map(|bound| bound.user.clone())
    }

    /// Opens the hub channel. Fire-and-forget: failures drive the reconnect
    /// policy instead of surfacing here. No-op while already connected or a
    /// connect is in flight. Must be called from within a Tokio runtime.
    pub fn connect(self: &Arc<Self>, identifier: Option<UserSessionId>, device: Option<DeviceId>) {
        let epoch = {
            let mut inner = self.inner();
            match inner.state {
                ConnectionState::Connected => {
                    debug!("connect ignored: already connected");
                    return;
                }
                ConnectionState::Connecting => {
                    debug!("connect ignored: connection already in progress");
                    return;
                }
                ConnectionState::Disconnected => {}
            }
            inner.state = ConnectionState::Connecting;
            inner.epoch += 1;
            inner.identity = identifier.map(|user| BoundIdentity { user, device });
            if let Some(timer) = inner.reconnect_task.take() {
                timer.abort();
            }
            inner.epoch
        };

        let conn = Arc::clone(self);
        let handle = tokio::spawn(async move { conn.run_connection(epoch).await });

        let mut inner = self.inner();
        if inner.epoch == epoch {
            inner.reader_task = Some(handle);
        }
    }

    /// Closes the channel and stays down until the next explicit `connect`.
    /// Deregisters the bound user and cancels any pending reconnect timer.
    /// Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let (reader, timer, outbound) = {
            let mut inner = self.inner();
            inner.identity = None;
            inner.epoch += 1;
            inner.state = ConnectionState::Disconnected;
            (
                inner.reader_task.take(),
                inner.reconnect_task.take(),
                inner.outbound.take(),
            )
        };

        if let Some(tx) = outbound {
            let _ = tx.send(Message::Close(None));
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(reader) = reader {
            reader.abort();
        }
        info!("disconnected from presence hub");
    }

    /// Fire-and-forget outbound send. Presence and call signals are
    /// perishable, so nothing is queued while disconnected: the event is
    /// dropped with a warning and the caller never sees an error.
    pub fn emit(&self, signal: ClientSignal) {
        let tx = {
            let inner = self.inner();
            if inner.state != ConnectionState::Connected {
                warn!(event = signal.name(), "cannot emit: not connected");
                return;
            }
            inner.outbound.clone()
        };
        let Some(tx) = tx else {
            warn!(event = signal.name(), "cannot emit: hub writer unavailable");
            return;
        };

        match signal.encode() {
            Ok(text) => {
                if tx.send(Message::Text(text)).is_err() {
                    warn!(event = signal.name(), "hub writer closed; dropping outbound event");
                }
            }
            Err(err) => warn!(event = signal.name(), "failed to encode outbound event: {err}"),
        }
    }

    pub fn emit_custom(&self, name: impl Into<String>, data: serde_json::Value) {
        self.emit(ClientSignal::Custom {
            name: name.into(),
            data,
        });
    }

    /// Registers `identifier` for presence counting. Only meaningful while
    /// connected; otherwise the registration rides the next successful open.
    pub fn register_user(&self, identifier: UserSessionId, device: Option<DeviceId>) {
        {
            let mut inner = self.inner();
            if inner.state != ConnectionState::Connected {
                warn!(user = %identifier, "cannot register user: not connected");
                return;
            }
            inner.identity = Some(BoundIdentity {
                user: identifier.clone(),
                device: device.clone(),
            });
        }

        info!(user = %identifier, "registering user with presence hub");
        self.emit(ClientSignal::AddUser(AddUserPayload {
            user_id: identifier.as_str().to_string(),
            device_id: device.map(|d| d.as_str().to_string()),
        }));
    }

    /// Stops counting this client as the bound user. The channel itself is
    /// left open so another identity can bind without a reconnect.
    pub fn deregister_user(&self) {
        if self.inner().identity.take().is_some() {
            info!("deregistered user from presence hub");
        }
    }

    fn build_request(&self) -> Result<Request> {
        let ws_url = normalize_hub_url(&self.settings.hub_url).ok_or_else(|| {
            anyhow!(
                "hub url `{}` must use ws, wss, http or https",
                self.settings.hub_url
            )
        })?;

        let mut url = Url::parse(&ws_url).context("invalid hub url")?;
        url.query_pairs_mut()
            .append_pair("x-api-key", &self.settings.api_key);

        let mut request = url.as_str().into_client_request()?;
        let identifier = self
            .inner()
            .identity
            .as_ref()
            .map(|bound| bound.user.as_str().to_string())
            .unwrap_or_default();
        let headers = request.headers_mut();
        headers.insert("x-api-key", self.settings.api_key.parse()?);
        headers.insert("x-user-identifier", identifier.parse()?);
        Ok(request)
    }

    async fn run_connection(self: Arc<Self>, epoch: u64) {
        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                warn!("hub connection aborted: {err}");
                self.fail_connect(epoch);
                return;
            }
        };

        info!(url = %self.settings.hub_url, "connecting to presence hub");
        let (stream, _response) =
            match timeout(self.settings.connect_timeout, connect_async(request)).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    warn!("hub connection failed: {err}");
                    self.fail_connect(epoch);
                    return;
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.settings.connect_timeout.as_secs(),
                        "hub connection timed out"
                    );
                    self.fail_connect(epoch);
                    return;
                }
            };

        let (mut writer, mut reader) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if writer.send(message).await.is_err() {
                    break;
                }
            }
            let _ = writer.close().await;
        });

        let identity = {
            let mut inner = self.inner();
            if inner.epoch != epoch {
                drop(inner);
                writer_task.abort();
                return;
            }
            inner.state = ConnectionState::Connected;
            inner.attempts = 0;
            inner.outbound = Some(tx.clone());
            inner.identity.clone()
        };
        info!("connected to presence hub");

        // The credential also rides in the first frame, so the hub can
        // authenticate from whichever channel its extraction reads.
        self.send_on(
            &tx,
            ClientSignal::Auth(AuthPayload {
                api_key: self.settings.api_key.clone(),
                user_identifier: identity
                    .as_ref()
                    .map(|bound| bound.user.as_str().to_string()),
            }),
        );

        if let Some(bound) = &identity {
            self.send_on(
                &tx,
                ClientSignal::AddUser(AddUserPayload {
                    user_id: bound.user.as_str().to_string(),
                    device_id: bound.device.as_ref().map(|d| d.as_str().to_string()),
                }),
            );
            info!(user = %bound.user, "registered user with presence hub");
        }

        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Text(text)) => match HubEvent::decode(&text) {
                    // Inbound events reach local listeners in arrival order.
                    Ok(event) => self.bus.publish(&event),
                    Err(err) => warn!("dropping undecodable hub frame: {err}"),
                },
                Ok(Message::Close(frame)) => {
                    info!(?frame, "hub closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("hub connection errored: {err}");
                    break;
                }
            }
        }

        // A voluntary disconnect bumps the epoch and aborts this task, so any
        // closure observed here is attributable to the far end.
        {
            let mut inner = self.inner();
            if inner.epoch != epoch {
                drop(inner);
                writer_task.abort();
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.outbound = None;
        }
        writer_task.abort();
        self.schedule_reconnect();
    }

    fn send_on(&self, tx: &mpsc::UnboundedSender<Message>, signal: ClientSignal) {
        match signal.encode() {
            Ok(text) => {
                let _ = tx.send(Message::Text(text));
            }
            Err(err) => warn!(event = signal.name(), "failed to encode outbound event: {err}"),
        }
    }

    fn fail_connect(self: &Arc<Self>, epoch: u64) {
        {
            let mut inner = self.inner();
            if inner.epoch != epoch {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.outbound = None;
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let policy = &self.settings.reconnect;
        let (delay, attempt) = {
            let mut inner = self.inner();
            inner.attempts += 1;
            if policy.exhausted(inner.attempts) {
                error!(
                    max_attempts = policy.max_attempts,
                    "reconnect ceiling reached; staying offline until an explicit connect"
                );
                return;
            }
            if let Some(timer) = inner.reconnect_task.take() {
                timer.abort();
            }
            (policy.delay_for(inner.attempts), inner.attempts)
        };

        info!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling hub reconnect"
        );

        let conn = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let identity = {
                let mut inner = conn.inner();
                inner.reconnect_task = None;
                inner.identity.clone()
            };
            // Re-connect with the identity that was active before the drop so
            // the presence registration is transparently restored.
            match identity {
                Some(bound) => conn.connect(Some(bound.user), bound.device),
                None => conn.connect(None, None),
            }
        });

        let mut inner = self.inner();
        inner.reconnect_task = Some(timer);
    }
}
