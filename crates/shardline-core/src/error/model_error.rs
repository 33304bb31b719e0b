//! Model errors - failures turning gateway payloads into entity records

use thiserror::Error;

/// Model layer errors
#[derive(Debug, Error)]
pub enum ModelError {
    // =========================================================================
    // Payload Shape Errors
    // =========================================================================
    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid snowflake in field: {0}")]
    InvalidSnowflake(&'static str),

    #[error("Invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    // =========================================================================
    // Value Errors
    // =========================================================================
    #[error("Invalid shard [{id}, {total}]")]
    InvalidShard { id: u32, total: u32 },
}

impl ModelError {
    /// Get an error code string for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject => "NOT_AN_OBJECT",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidSnowflake(_) => "INVALID_SNOWFLAKE",
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidShard { .. } => "INVALID_SHARD",
        }
    }

    /// Check if this error came from a malformed payload
    pub fn is_malformed_payload(&self) -> bool {
        !matches!(self, Self::InvalidShard { .. })
    }
}
