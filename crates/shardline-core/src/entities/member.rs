//! Member record - a user's membership in a guild

use serde_json::Value;

use super::{Fields, User};
use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// Guild member entity, keyed by `(guild_id, user_id)`
///
/// The embedded user object is split off into its own [`User`] record.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub fields: Fields,
}

impl Member {
    /// Build from a member object, returning the member and its user.
    ///
    /// `guild_hint` supplies the guild for members nested in a GUILD_CREATE;
    /// an explicit `guild_id` in the payload wins.
    pub fn from_payload(
        value: Value,
        guild_hint: Option<Snowflake>,
    ) -> Result<(Self, User), ModelError> {
        let mut fields = Fields::from_value(value)?;
        let guild_id = fields
            .take_optional_snowflake("guild_id")?
            .or(guild_hint)
            .ok_or(ModelError::MissingField("guild_id"))?;
        let user = User::from_payload(fields.remove("user").ok_or(ModelError::MissingField("user"))?)?;

        let member = Self {
            guild_id,
            user_id: user.id,
            fields,
        };
        Ok((member, user))
    }

    #[inline]
    pub fn key(&self) -> (Snowflake, Snowflake) {
        (self.guild_id, self.user_id)
    }

    pub fn nick(&self) -> Option<&str> {
        self.fields.str("nick")
    }

    pub fn role_ids(&self) -> Vec<Snowflake> {
        self.fields.snowflakes("roles")
    }

    /// Check if member has a specific role
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.role_ids().contains(&role_id)
    }

    /// Get display name (nickname if set, otherwise the user's name)
    pub fn display_name<'a>(&'a self, user: &'a User) -> Option<&'a str> {
        self.nick().or_else(|| user.display_name())
    }

    /// Merge an update for the same member
    pub fn merge(&mut self, patch: &Member) -> bool {
        self.fields.merge(&patch.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload_splits_user() {
        let (member, user) = Member::from_payload(
            json!({
                "guild_id": "1",
                "user": {"id": "2", "username": "kit"},
                "nick": null,
                "roles": ["3", "4"]
            }),
            None,
        )
        .unwrap();

        assert_eq!(member.key(), (Snowflake::new(1), Snowflake::new(2)));
        assert_eq!(user.username(), Some("kit"));
        assert!(!member.fields.contains_key("user"));
        assert!(member.has_role(Snowflake::new(4)));
        assert_eq!(member.display_name(&user), Some("kit"));
    }

    #[test]
    fn test_guild_hint() {
        let (member, _) =
            Member::from_payload(json!({"user": {"id": "2"}, "nick": "k"}), Some(Snowflake::new(9)))
                .unwrap();
        assert_eq!(member.guild_id, Snowflake::new(9));
        assert_eq!(member.nick(), Some("k"));
    }

    #[test]
    fn test_missing_guild_or_user() {
        assert!(matches!(
            Member::from_payload(json!({"user": {"id": "2"}}), None),
            Err(ModelError::MissingField("guild_id"))
        ));
        assert!(matches!(
            Member::from_payload(json!({"guild_id": "1"}), None),
            Err(ModelError::MissingField("user"))
        ));
    }
}
