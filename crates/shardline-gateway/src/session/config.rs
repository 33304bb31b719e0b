//! Per-session settings derived from the client configuration

use std::time::Duration;

use shardline_common::{BackoffConfig, ClientConfig};
use shardline_core::Intents;

use crate::protocol::{IdentifyProperties, PresenceUpdatePayload};

/// Settings shared by every session of a fleet
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token: String,
    /// Gateway URL without the version query
    pub gateway_url: String,
    pub intents: Intents,
    pub large_threshold: u8,
    pub connect_timeout: Duration,
    pub hello_timeout: Duration,
    pub backoff: BackoffConfig,
    pub properties: IdentifyProperties,
    pub presence: Option<PresenceUpdatePayload>,
}

impl SessionConfig {
    pub fn from_client(config: &ClientConfig, gateway_url: impl Into<String>) -> Self {
        Self {
            token: config.auth.token.clone(),
            gateway_url: gateway_url.into(),
            intents: config.gateway.intents,
            large_threshold: config.gateway.large_threshold,
            connect_timeout: config.gateway.connect_timeout,
            hello_timeout: config.gateway.hello_timeout,
            backoff: config.backoff,
            properties: IdentifyProperties::default(),
            presence: None,
        }
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }
}
