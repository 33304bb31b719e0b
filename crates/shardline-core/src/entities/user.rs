//! User record - a platform account, shared across guilds

use serde_json::Value;

use super::Fields;
use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// User entity
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Snowflake,
    pub fields: Fields,
}

impl User {
    /// Build from a user object (`{"id": ..., "username": ...}`)
    pub fn from_payload(value: Value) -> Result<Self, ModelError> {
        let mut fields = Fields::from_value(value)?;
        let id = fields.take_snowflake("id")?;
        Ok(Self { id, fields })
    }

    pub fn username(&self) -> Option<&str> {
        self.fields.str("username")
    }

    /// Display name: global name if set, otherwise the username
    pub fn display_name(&self) -> Option<&str> {
        self.fields.str("global_name").or_else(|| self.username())
    }

    pub fn is_bot(&self) -> bool {
        self.fields.bool("bot").unwrap_or(false)
    }

    /// Merge an update for the same user
    pub fn merge(&mut self, patch: &User) -> bool {
        self.fields.merge(&patch.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload() {
        let user = User::from_payload(json!({
            "id": "80351110224678912",
            "username": "nelly",
            "global_name": null,
            "bot": true
        }))
        .unwrap();

        assert_eq!(user.id, Snowflake::new(80_351_110_224_678_912));
        assert_eq!(user.username(), Some("nelly"));
        assert_eq!(user.display_name(), Some("nelly"));
        assert!(user.is_bot());
        assert!(!user.fields.contains_key("id"));
    }

    #[test]
    fn test_from_payload_requires_id() {
        assert!(User::from_payload(json!({"username": "x"})).is_err());
    }
}
