use std::{collections::HashMap, fs, time::Duration};

use crate::reconnect::ReconnectPolicy;

/// Connection settings for the presence hub and the room provisioning API.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub hub_url: String,
    pub api_key: String,
    pub room_api_url: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            hub_url: "wss://hub.clinic.internal".into(),
            api_key: "devkey".into(),
            room_api_url: "https://hub.clinic.internal/api".into(),
            connect_timeout: Duration::from_secs(20),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

pub fn load_settings() -> HubSettings {
    let mut settings = HubSettings::default();

    if let Ok(raw) = fs::read_to_string("hub.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("hub_url") {
                settings.hub_url = v.clone();
            }
            if let Some(v) = file_cfg.get("api_key") {
                settings.api_key = v.clone();
            }
            if let Some(v) = file_cfg.get("room_api_url") {
                settings.room_api_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("HUB_URL") {
        settings.hub_url = v;
    }
    if let Ok(v) = std::env::var("APP__HUB_URL") {
        settings.hub_url = v;
    }

    if let Ok(v) = std::env::var("HUB_API_KEY") {
        settings.api_key = v;
    }
    if let Ok(v) = std::env::var("APP__HUB_API_KEY") {
        settings.api_key = v;
    }

    if let Ok(v) = std::env::var("ROOM_API_URL") {
        settings.room_api_url = v;
    }
    if let Ok(v) = std::env::var("APP__ROOM_API_URL") {
        settings.room_api_url = v;
    }

    if let Ok(v) = std::env::var("APP__HUB_CONNECT_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.connect_timeout = Duration::from_secs(parsed);
        }
    }

    settings
}

/// Maps an http(s) hub URL onto the matching WebSocket scheme; ws(s) URLs
/// pass through. Anything else is unusable as a hub endpoint.
pub fn normalize_hub_url(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_end_matches('/');

    if raw.starts_with("ws://") || raw.starts_with("wss://") {
        return Some(raw.to_string());
    }
    if let Some(rest) = raw.strip_prefix("https://") {
        return Some(format!("wss://{rest}"));
    }
    if let Some(rest) = raw.strip_prefix("http://") {
        return Some(format!("ws://{rest}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_urls_map_to_wss() {
        assert_eq!(
            normalize_hub_url("https://hub.clinic.internal/"),
            Some("wss://hub.clinic.internal".into())
        );
        assert_eq!(
            normalize_hub_url("http://127.0.0.1:9000"),
            Some("ws://127.0.0.1:9000".into())
        );
    }

    #[test]
    fn websocket_urls_pass_through() {
        assert_eq!(
            normalize_hub_url("wss://hub.clinic.internal"),
            Some("wss://hub.clinic.internal".into())
        );
    }

    #[test]
    fn unsupported_schemes_are_rejected() {
        assert_eq!(normalize_hub_url("ftp://hub"), None);
        assert_eq!(normalize_hub_url("hub.clinic.internal"), None);
    }
}
