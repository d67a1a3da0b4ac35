//! Client for the external conferencing-room provisioning service.
//!
//! Room creation is a plain HTTPS call with a static service credential; the
//! hub only relays the resulting invitation, so every provisioning failure is
//! surfaced to the caller instead of being retried here.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RoomServiceConfig {
    /// Base URL of the provisioning API, e.g. `https://hub.example.com/api`.
    pub base_url: String,
    pub api_key: String,
}

/// One invited participant: session identifier plus the name to show in the
/// invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecipient {
    pub identifier: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomRequest {
    pub room_id: String,
    pub from_username: String,
    pub recipients: Vec<RoomRecipient>,
    pub is_video: bool,
    pub group_name: Option<String>,
    /// Probe recipient availability without ringing anyone.
    pub check_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipantStatus {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
}

/// Grant returned by the provisioning service: everything a client needs to
/// join the conferencing room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomGrant {
    pub token: String,
    pub server_url: String,
    #[serde(default)]
    pub e2ee_key: Option<String>,
    pub room_id: String,
    #[serde(default)]
    pub participants: Vec<RoomParticipantStatus>,
}

#[derive(Debug, Error)]
pub enum RoomServiceError {
    #[error("room request missing required field: {0}")]
    MissingField(&'static str),
    #[error("room service rejected request with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("failed to reach room service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("room service returned an unparseable response: {source}")]
    MalformedResponse {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

/// Seam for callers that need a test double instead of the live service.
#[async_trait]
pub trait RoomProvisioner: Send + Sync {
    async fn create_room(&self, request: &RoomRequest) -> Result<RoomGrant, RoomServiceError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomBody {
    room_id: String,
    to_user_ids: Vec<String>,
    to_usernames: HashMap<String, String>,
    is_video: bool,
    from_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check_only: Option<bool>,
}

pub struct RoomServiceClient {
    http: reqwest::Client,
    config: RoomServiceConfig,
}

impl RoomServiceClient {
    pub fn new(config: RoomServiceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn validate(request: &RoomRequest) -> Result<(), RoomServiceError> {
        if request.room_id.is_empty() {
            return Err(RoomServiceError::MissingField("roomId"));
        }
        if request.from_username.is_empty() {
            return Err(RoomServiceError::MissingField("fromUsername"));
        }
        if request.recipients.is_empty() {
            return Err(RoomServiceError::MissingField("recipients"));
        }
        Ok(())
    }

    fn body_for(request: &RoomRequest) -> CreateRoomBody {
        CreateRoomBody {
            room_id: request.room_id.clone(),
            to_user_ids: request
                .recipients
                .iter()
                .map(|r| r.identifier.clone())
                .collect(),
            to_usernames: request
                .recipients
                .iter()
                .map(|r| (r.identifier.clone(), r.display_name.clone()))
                .collect(),
            is_video: request.is_video,
            from_username: request.from_username.clone(),
            group_name: request.group_name.clone(),
            check_only: request.check_only,
        }
    }
}

#[async_trait]
impl RoomProvisioner for RoomServiceClient {
    async fn create_room(&self, request: &RoomRequest) -> Result<RoomGrant, RoomServiceError> {
        Self::validate(request)?;

        let response = self
            .http
            .post(format!("{}/create-room", self.config.base_url))
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.config.api_key)
            .json(&Self::body_for(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, room_id = %request.room_id, "room service responded");

        if !status.is_success() {
            return Err(RoomServiceError::Rejected { status, body });
        }

        serde_json::from_str(&body)
            .map_err(|source| RoomServiceError::MalformedResponse { source, body })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
