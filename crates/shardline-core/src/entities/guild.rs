//! Guild record - a server, the parent of channels, roles and members

use serde_json::Value;

use super::{Channel, Fields, Member, Role, User};
use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// Keys of a guild payload that hold child collections.
/// They are split into their own records and never kept on the guild.
const CHILD_KEYS: [&str; 6] = [
    "channels",
    "threads",
    "roles",
    "members",
    "presences",
    "voice_states",
];

/// Guild entity
#[derive(Debug, Clone, PartialEq)]
pub struct Guild {
    pub id: Snowflake,
    pub unavailable: bool,
    pub fields: Fields,
}

/// A full guild payload split into the guild and its children
#[derive(Debug, Clone, Default)]
pub struct GuildParts {
    pub guild: Option<Guild>,
    pub channels: Vec<Channel>,
    pub roles: Vec<Role>,
    pub members: Vec<Member>,
    pub users: Vec<User>,
}

impl Guild {
    /// A placeholder for a guild known only by ID (READY's unavailable list)
    pub fn unavailable(id: Snowflake) -> Self {
        Self {
            id,
            unavailable: true,
            fields: Fields::new(),
        }
    }

    /// Build a guild from a GUILD_CREATE or GUILD_UPDATE payload, discarding children
    pub fn from_payload(value: Value) -> Result<Self, ModelError> {
        let mut fields = Fields::from_value(value)?;
        let id = fields.take_snowflake("id")?;
        let unavailable = fields
            .remove("unavailable")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        for key in CHILD_KEYS {
            fields.remove(key);
        }
        Ok(Self {
            id,
            unavailable,
            fields,
        })
    }

    /// Split a GUILD_CREATE payload into the guild and its child records.
    ///
    /// Child entries that fail to decode are skipped; the guild itself must decode.
    pub fn split_payload(value: Value) -> Result<GuildParts, ModelError> {
        let mut fields = Fields::from_value(value)?;
        let id = fields
            .get("id")
            .and_then(Snowflake::from_json)
            .ok_or(ModelError::MissingField("id"))?;

        let mut parts = GuildParts::default();
        for key in ["channels", "threads"] {
            for item in take_array(&mut fields, key) {
                if let Ok(channel) = Channel::from_payload(item, Some(id)) {
                    parts.channels.push(channel);
                }
            }
        }
        for item in take_array(&mut fields, "roles") {
            if let Ok(role) = Role::from_payload(item, id) {
                parts.roles.push(role);
            }
        }
        for item in take_array(&mut fields, "members") {
            if let Ok((member, user)) = Member::from_payload(item, Some(id)) {
                parts.members.push(member);
                parts.users.push(user);
            }
        }

        parts.guild = Some(Self::from_payload(fields.into_value())?);
        Ok(parts)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.str("name")
    }

    pub fn owner_id(&self) -> Option<Snowflake> {
        self.fields.snowflake("owner_id")
    }

    /// Check if a user is the guild owner
    #[inline]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id() == Some(user_id)
    }

    pub fn member_count(&self) -> Option<i64> {
        self.fields.i64("member_count")
    }

    /// Merge an update for the same guild. Availability is not carried by updates.
    pub fn merge(&mut self, patch: &Guild) -> bool {
        self.fields.merge(&patch.fields)
    }
}

impl GuildParts {
    pub fn guild_id(&self) -> Option<Snowflake> {
        self.guild.as_ref().map(|g| g.id)
    }
}

fn take_array(fields: &mut Fields, key: &str) -> Vec<Value> {
    match fields.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
