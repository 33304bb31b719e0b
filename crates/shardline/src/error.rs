//! Client errors

use thiserror::Error;

use shardline_common::ConfigError;
use shardline_gateway::GatewayError;
use shardline_rest::{RestError, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Rest(#[from] RestError),
}

impl ClientError {
    /// Errors caused by the client's setup rather than the network
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Gateway(GatewayError::Model(_) | GatewayError::AlreadyStarted)
        )
    }
}
