//! Payloads of the handshake frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shardline_core::{Intents, ShardId, Snowflake};

/// `d` of op 10 (Hello)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Milliseconds between heartbeats
    pub heartbeat_interval: u64,
}

/// `d` of op 2 (Identify)
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    pub shard: ShardId,
    pub properties: IdentifyProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
    pub large_threshold: u8,
    pub compress: bool,
}

/// Connection properties sent with IDENTIFY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl IdentifyProperties {
    pub fn new(os: impl Into<String>, browser: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new(std::env::consts::OS, "shardline", "shardline")
    }
}

/// `d` of op 3 (Presence Update), also sent as the initial presence on IDENTIFY
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix milliseconds since the client went idle
    pub since: Option<u64>,
    pub activities: Vec<Value>,
    pub status: String,
    pub afk: bool,
}

impl PresenceUpdatePayload {
    pub const VALID_STATUSES: &'static [&'static str] =
        &["online", "idle", "dnd", "invisible", "offline"];

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: status.into(),
            afk: false,
        }
    }

    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// `d` of op 4 (Resume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// A guild entry of the READY dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

/// `d` of the READY dispatch; only the fields the session and readiness
/// tracking need
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub resume_gateway_url: Option<String>,
    pub user: Value,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identify_wire_format() {
        let payload = IdentifyPayload {
            token: "abc".to_string(),
            intents: Intents::GUILDS | Intents::GUILD_MESSAGES,
            shard: ShardId::new(2, 4).unwrap(),
            properties: IdentifyProperties::new("linux", "shardline", "shardline"),
            presence: None,
            large_threshold: 250,
            compress: false,
        };
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["token"], "abc");
        assert_eq!(value["shard"], json!([2, 4]));
        assert_eq!(value["intents"], json!((Intents::GUILDS | Intents::GUILD_MESSAGES).bits()));
        assert_eq!(value["properties"]["os"], "linux");
        assert_eq!(value["large_threshold"], 250);
        assert!(value.get("presence").is_none());
    }

    #[test]
    fn test_presence_status_validation() {
        assert!(PresenceUpdatePayload::status("dnd").is_valid_status());
        assert!(!PresenceUpdatePayload::status("busy").is_valid_status());
    }

    #[test]
    fn test_ready_payload() {
        let ready: ReadyPayload = serde_json::from_value(json!({
            "v": 10,
            "session_id": "s1",
            "resume_gateway_url": "wss://resume.example",
            "user": {"id": "5", "username": "bot"},
            "guilds": [{"id": "10", "unavailable": true}, {"id": "11"}],
            "shard": [0, 1]
        }))
        .unwrap();

        assert_eq!(ready.session_id, "s1");
        assert_eq!(ready.resume_gateway_url.as_deref(), Some("wss://resume.example"));
        assert_eq!(ready.guilds.len(), 2);
        assert_eq!(ready.guilds[0].id, Snowflake::new(10));
        assert!(!ready.guilds[1].unavailable);
    }
}
