//! Channel record - text, voice, category or thread channel

use serde_json::Value;

use super::Fields;
use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// Channel entity
///
/// `guild_id` is `None` for direct message channels, which the cache does not keep.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub fields: Fields,
}

impl Channel {
    /// Build from a channel object.
    ///
    /// Channels nested in a GUILD_CREATE omit `guild_id`, so the owning guild
    /// may be supplied as `guild_hint`. An explicit `guild_id` in the payload wins.
    pub fn from_payload(value: Value, guild_hint: Option<Snowflake>) -> Result<Self, ModelError> {
        let mut fields = Fields::from_value(value)?;
        let id = fields.take_snowflake("id")?;
        let guild_id = fields.take_optional_snowflake("guild_id")?.or(guild_hint);
        Ok(Self {
            id,
            guild_id,
            fields,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.str("name")
    }

    /// Raw channel type number
    pub fn kind(&self) -> Option<i64> {
        self.fields.i64("type")
    }

    pub fn parent_id(&self) -> Option<Snowflake> {
        self.fields.snowflake("parent_id")
    }

    pub fn position(&self) -> Option<i64> {
        self.fields.i64("position")
    }

    /// Merge an update for the same channel
    pub fn merge(&mut self, patch: &Channel) -> bool {
        self.fields.merge(&patch.fields)
    }
}
