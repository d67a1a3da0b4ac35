use chrono::Utc;
use serde::{Deserialize, Serialize};

/// User record as supplied by the authentication layer. Every field except
/// `id` is best-effort; the session identifier derivation fails closed when
/// `id` is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Opaque per-session user identifier in the form `{id}_{name}_{role}`,
/// with whitespace in the human-readable segments normalized to hyphens so
/// the composite stays a single unbroken token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSessionId(pub String);

impl UserSessionId {
    /// Derives the identifier from an authenticated profile. Returns `None`
    /// without a numeric id: no identifier, no connection, no registration.
    pub fn from_profile(profile: &UserProfile) -> Option<UserSessionId> {
        let id = profile.id?;

        let full_name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let name = if full_name.is_empty() {
            profile
                .username
                .clone()
                .or_else(|| profile.email.clone())
                .unwrap_or_else(|| format!("user-{id}"))
        } else {
            full_name
        };

        let role = profile.role.as_deref().unwrap_or("user");

        Some(UserSessionId(format!(
            "{id}_{}_{}",
            hyphenate(&name),
            hyphenate(role)
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading numeric segment of the identifier. Malformed identifiers
    /// yield `None`, never an error.
    pub fn user_id(&self) -> Option<i64> {
        Self::parse_user_id(&self.0)
    }

    /// Borrowing form of [`UserSessionId::user_id`] for raw identifier
    /// strings received from the hub.
    pub fn parse_user_id(identifier: &str) -> Option<i64> {
        identifier.split('_').next()?.parse().ok()
    }

    /// Display-name segment with hyphens mapped back to spaces.
    pub fn display_name(&self) -> Option<String> {
        let name = self.0.split('_').nth(1)?;
        Some(name.replace('-', " "))
    }

    /// Role segment. Roles may themselves contain underscores, so everything
    /// past the second separator is rejoined.
    pub fn role(&self) -> Option<String> {
        let mut parts = self.0.split('_');
        parts.next()?;
        parts.next()?;
        let role = parts.collect::<Vec<_>>().join("_");
        if role.is_empty() {
            None
        } else {
            Some(role)
        }
    }
}

impl std::fmt::Display for UserSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hyphenate(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Advisory per-tab/per-process identifier used by the hub for multi-device
/// disambiguation. Not a security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Host/runtime fingerprint plus a millisecond timestamp; generated once
    /// per session binding and never reused.
    pub fn generate() -> DeviceId {
        DeviceId(format!(
            "{}-{}-{}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::process::id(),
            Utc::now().timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Connection lifecycle of the single hub channel. Mutated only by the
/// transport; consumers read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}
