//! Role record - a guild role

use serde_json::Value;

use super::Fields;
use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// Role entity
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub fields: Fields,
}

impl Role {
    /// Build from a role object. Role objects never carry their guild, so the
    /// owner is always supplied by the enclosing payload.
    pub fn from_payload(value: Value, guild_id: Snowflake) -> Result<Self, ModelError> {
        let mut fields = Fields::from_value(value)?;
        let id = fields.take_snowflake("id")?;
        Ok(Self {
            id,
            guild_id,
            fields,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.str("name")
    }

    pub fn position(&self) -> i64 {
        self.fields.i64("position").unwrap_or(0)
    }

    /// Permission bitset (sent as a decimal string)
    pub fn permissions(&self) -> u64 {
        self.fields.u64_lenient("permissions").unwrap_or(0)
    }

    /// The @everyone role shares its ID with the guild
    #[inline]
    pub fn is_everyone(&self) -> bool {
        self.id == self.guild_id
    }

    /// Compare role positions for hierarchy (higher position = more authority)
    #[inline]
    pub fn is_higher_than(&self, other: &Role) -> bool {
        self.position() > other.position()
    }

    /// Merge an update for the same role
    pub fn merge(&mut self, patch: &Role) -> bool {
        self.fields.merge(&patch.fields)
    }
}
