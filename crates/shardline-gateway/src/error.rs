//! Gateway error types

use std::time::Duration;

use shardline_core::{ModelError, ShardId};
use shardline_rest::RestError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::CloseCode;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket connect or I/O failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Connection failure reported by a non-WebSocket transport
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connect did not complete within {0:?}")]
    ConnectTimeout(Duration),

    #[error("No HELLO received within {0:?}")]
    HelloTimeout(Duration),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid fleet configuration: {0}")]
    Model(#[from] ModelError),

    /// Gateway discovery through the REST API failed
    #[error("Gateway discovery failed: {0}")]
    Discovery(#[from] RestError),

    #[error("Shard {shard} closed: {code}")]
    ShardClosed { shard: ShardId, code: CloseCode },

    #[error("Fleet did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Shard fleet already started")]
    AlreadyStarted,

    #[error("Shard fleet not started")]
    NotStarted,

    #[error("Shutting down")]
    Shutdown,
}

impl GatewayError {
    /// Errors after which retrying the same operation cannot succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::ShardClosed { .. } | Self::Model(_) | Self::AlreadyStarted | Self::Shutdown
        )
    }
}
