//! Gateway intents bitflags
//!
//! Intents select which event families the gateway delivers to a session.
//! They are sent as a plain integer in the IDENTIFY payload.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Gateway intent flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Guild, channel and role lifecycle events
        const GUILDS                    = 1 << 0;
        /// Member add/update/remove (privileged)
        const GUILD_MEMBERS             = 1 << 1;
        /// Bans and audit log entries
        const GUILD_MODERATION          = 1 << 2;
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        const GUILD_INTEGRATIONS        = 1 << 4;
        const GUILD_WEBHOOKS            = 1 << 5;
        const GUILD_INVITES             = 1 << 6;
        const GUILD_VOICE_STATES        = 1 << 7;
        /// Presence updates (privileged)
        const GUILD_PRESENCES           = 1 << 8;
        const GUILD_MESSAGES            = 1 << 9;
        const GUILD_MESSAGE_REACTIONS   = 1 << 10;
        const GUILD_MESSAGE_TYPING      = 1 << 11;
        const DIRECT_MESSAGES           = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS  = 1 << 13;
        const DIRECT_MESSAGE_TYPING     = 1 << 14;
        /// Message bodies in guild messages (privileged)
        const MESSAGE_CONTENT           = 1 << 15;

        /// Intents that must be enabled for the application before use
        const PRIVILEGED = Self::GUILD_MEMBERS.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::MESSAGE_CONTENT.bits();

        /// Everything that does not require approval
        const UNPRIVILEGED = Self::GUILDS.bits()
            | Self::GUILD_MODERATION.bits()
            | Self::GUILD_EMOJIS_AND_STICKERS.bits()
            | Self::GUILD_INTEGRATIONS.bits()
            | Self::GUILD_WEBHOOKS.bits()
            | Self::GUILD_INVITES.bits()
            | Self::GUILD_VOICE_STATES.bits()
            | Self::GUILD_MESSAGES.bits()
            | Self::GUILD_MESSAGE_REACTIONS.bits()
            | Self::GUILD_MESSAGE_TYPING.bits()
            | Self::DIRECT_MESSAGES.bits()
            | Self::DIRECT_MESSAGE_REACTIONS.bits()
            | Self::DIRECT_MESSAGE_TYPING.bits();
    }
}

impl Intents {
    /// Check whether any privileged intent is requested
    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.intersects(Intents::PRIVILEGED)
    }

    /// The intent that gates a dispatch event, if any.
    ///
    /// READY, RESUMED and USER_UPDATE are always delivered.
    pub fn required_for(event_name: &str) -> Option<Intents> {
        let intent = match event_name {
            "GUILD_CREATE" | "GUILD_UPDATE" | "GUILD_DELETE" | "GUILD_ROLE_CREATE"
            | "GUILD_ROLE_UPDATE" | "GUILD_ROLE_DELETE" | "CHANNEL_CREATE" | "CHANNEL_UPDATE"
            | "CHANNEL_DELETE" => Intents::GUILDS,
            "GUILD_MEMBER_ADD" | "GUILD_MEMBER_UPDATE" | "GUILD_MEMBER_REMOVE" => {
                Intents::GUILD_MEMBERS
            }
            "MESSAGE_CREATE" | "MESSAGE_UPDATE" | "MESSAGE_DELETE" => {
                Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES
            }
            "PRESENCE_UPDATE" => Intents::GUILD_PRESENCES,
            _ => return None,
        };
        Some(intent)
    }

    /// Parse from a decimal string (environment variables)
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<u64>().ok().map(Self::from_bits_truncate)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Intents::UNPRIVILEGED
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Intents::from_bits_truncate(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_detection() {
        assert!(!Intents::UNPRIVILEGED.is_privileged());
        assert!((Intents::GUILDS | Intents::GUILD_MEMBERS).is_privileged());
        assert!(Intents::MESSAGE_CONTENT.is_privileged());
    }

    #[test]
    fn test_unprivileged_and_privileged_are_disjoint() {
        assert!(!Intents::UNPRIVILEGED.intersects(Intents::PRIVILEGED));
        assert_eq!(
            (Intents::UNPRIVILEGED | Intents::PRIVILEGED).bits(),
            (1 << 16) - 1
        );
    }

    #[test]
    fn test_required_for() {
        assert_eq!(Intents::required_for("GUILD_CREATE"), Some(Intents::GUILDS));
        assert_eq!(
            Intents::required_for("GUILD_MEMBER_ADD"),
            Some(Intents::GUILD_MEMBERS)
        );
        assert_eq!(Intents::required_for("READY"), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Intents::parse("513"), Some(Intents::GUILDS | Intents::GUILD_MESSAGES));
        assert_eq!(Intents::parse(" 1 "), Some(Intents::GUILDS));
        assert_eq!(Intents::parse("abc"), None);
    }

    #[test]
    fn test_serialize_as_integer() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert_eq!(serde_json::to_string(&intents).unwrap(), "513");

        let back: Intents = serde_json::from_str("513").unwrap();
        assert_eq!(back, intents);
    }
}
