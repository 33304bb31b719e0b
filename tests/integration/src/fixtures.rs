//! Gateway payloads, HTTP responses and client configuration for tests

use serde_json::{json, Value};
use std::time::Duration;

use shardline_common::{BackoffConfig, ClientConfig};
use shardline_rest::RestResponse;

pub const BOT_USER_ID: &str = "900";

/// Client configuration with short timings for real-socket tests
pub fn test_config(gateway_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new("test-token");
    config.gateway.url = gateway_url.to_string();
    config.gateway.identify_spacing = Duration::from_millis(200);
    config.gateway.guild_ready_timeout = Duration::from_millis(300);
    config.gateway.hello_timeout = Duration::from_secs(5);
    config.gateway.startup_timeout = Duration::from_secs(20);
    config.backoff = BackoffConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        jitter: 0.0,
        ..BackoffConfig::default()
    };
    config
}

pub fn ready(session_id: &str, guilds: &[u64]) -> Value {
    let guilds: Vec<Value> = guilds
        .iter()
        .map(|id| json!({"id": id.to_string(), "unavailable": true}))
        .collect();
    json!({
        "session_id": session_id,
        "user": {"id": BOT_USER_ID, "username": "probe", "bot": true},
        "guilds": guilds,
    })
}

pub fn guild_create(id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "owner_id": "1",
        "channels": [{"id": (id + 1).to_string(), "name": "general", "type": 0}],
        "roles": [{"id": id.to_string(), "name": "@everyone", "position": 0}],
        "members": [{"user": {"id": "1", "username": "owner"}, "roles": []}],
    })
}

pub fn message_create(id: u64, channel_id: u64, content: &str) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": channel_id.to_string(),
        "content": content,
        "author": {"id": "1", "username": "owner"},
    })
}

/// 200 with a JSON body and the given bucket state
pub fn ok_with_bucket(bucket: &str, remaining: u32, reset_after: Duration) -> RestResponse {
    RestResponse::new(200)
        .with_header("x-ratelimit-bucket", bucket)
        .with_header("x-ratelimit-limit", "5")
        .with_header("x-ratelimit-remaining", &remaining.to_string())
        .with_header(
            "x-ratelimit-reset-after",
            &format!("{:.3}", reset_after.as_secs_f64()),
        )
        .with_json(&json!({"ok": true}))
}

/// A global 429 as sent by the platform
pub fn global_rate_limited(retry_after: Duration) -> RestResponse {
    RestResponse::new(429)
        .with_header("via", "1.1 google")
        .with_header("x-ratelimit-global", "true")
        .with_header("x-ratelimit-scope", "global")
        .with_json(&json!({
            "message": "You are being rate limited.",
            "retry_after": retry_after.as_secs_f64(),
            "global": true,
        }))
}
