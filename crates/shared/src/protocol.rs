use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ONLINE_USERS_UPDATE: &str = "online_users_update";
pub const INCOMING_CALL: &str = "incoming_call";
pub const AUTH: &str = "auth";
pub const ADD_USER: &str = "add_user";
pub const CALL_DECLINED: &str = "call_declined";

/// Envelope carried on the hub channel in both directions:
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed hub frame: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Routing key for event-bus subscriptions. Known hub events get closed
/// variants; anything else is addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    OnlineUsersUpdate,
    IncomingCall,
    Custom(String),
}

/// Inbound hub events, decoded into strongly shaped payloads. Unknown event
/// names pass through as `Custom` so downstream consumers can still opt in.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    OnlineUsersUpdate(OnlineUsersPayload),
    IncomingCall(IncomingCallPayload),
    Custom { name: String, data: Value },
}

impl HubEvent {
    pub fn key(&self) -> EventKey {
        match self {
            HubEvent::OnlineUsersUpdate(_) => EventKey::OnlineUsersUpdate,
            HubEvent::IncomingCall(_) => EventKey::IncomingCall,
            HubEvent::Custom { name, .. } => EventKey::Custom(name.clone()),
        }
    }

    pub fn decode(text: &str) -> Result<HubEvent, ProtocolError> {
        let frame: WireFrame = serde_json::from_str(text).map_err(ProtocolError::Frame)?;
        HubEvent::from_frame(frame)
    }

    pub fn from_frame(frame: WireFrame) -> Result<HubEvent, ProtocolError> {
        let payload_err = |event: &str| {
            let event = event.to_string();
            move |source| ProtocolError::Payload { event, source }
        };

        match frame.event.as_str() {
            ONLINE_USERS_UPDATE => serde_json::from_value(frame.data)
                .map(HubEvent::OnlineUsersUpdate)
                .map_err(payload_err(ONLINE_USERS_UPDATE)),
            INCOMING_CALL => serde_json::from_value(frame.data)
                .map(HubEvent::IncomingCall)
                .map_err(payload_err(INCOMING_CALL)),
            _ => Ok(HubEvent::Custom {
                name: frame.event,
                data: frame.data,
            }),
        }
    }
}

/// Outbound signals emitted toward the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientSignal {
    Auth(AuthPayload),
    AddUser(AddUserPayload),
    CallDeclined(CallDeclinedPayload),
    Custom { name: String, data: Value },
}

impl ClientSignal {
    pub fn name(&self) -> &str {
        match self {
            ClientSignal::Auth(_) => AUTH,
            ClientSignal::AddUser(_) => ADD_USER,
            ClientSignal::CallDeclined(_) => CALL_DECLINED,
            ClientSignal::Custom { name, .. } => name,
        }
    }

    pub fn to_frame(&self) -> Result<WireFrame, ProtocolError> {
        let data = match self {
            ClientSignal::Auth(payload) => serde_json::to_value(payload),
            ClientSignal::AddUser(payload) => serde_json::to_value(payload),
            ClientSignal::CallDeclined(payload) => serde_json::to_value(payload),
            ClientSignal::Custom { data, .. } => Ok(data.clone()),
        }
        .map_err(|source| ProtocolError::Payload {
            event: self.name().to_string(),
            source,
        })?;

        Ok(WireFrame {
            event: self.name().to_string(),
            data,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let frame = self.to_frame()?;
        serde_json::to_string(&frame).map_err(ProtocolError::Frame)
    }
}

/// Full replacement set of online identifiers; the hub is the source of
/// truth and always sends the whole set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersPayload {
    #[serde(default)]
    pub online_users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
}

/// Call-invitation payload. Optional flags default to false/empty/None so a
/// sparse payload from the hub still normalizes into the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallPayload {
    pub room_id: String,
    pub from_user_id: String,
    pub from_username: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub participants: Vec<CallParticipant>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub e2ee_key: Option<String>,
    #[serde(default)]
    pub is_delayed_call: bool,
}

/// First frame after the socket opens; the hub accepts the credential here,
/// in the query string, or in headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "x-api-key")]
    pub api_key: String,
    #[serde(
        rename = "userIdentifier",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserPayload {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDeclinedPayload {
    pub room_id: String,
    pub from_user_id: String,
}
