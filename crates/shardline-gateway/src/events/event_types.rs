//! Dispatch names the pipeline understands

use std::fmt;

/// Value of the `t` field of a dispatch frame.
///
/// Dispatches with any other name are not decoded; they only surface as
/// `GatewayDispatch` when debug events are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchType {
    Ready,
    Resumed,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    UserUpdate,
}

impl DispatchType {
    pub const ALL: [DispatchType; 18] = [
        Self::Ready,
        Self::Resumed,
        Self::GuildCreate,
        Self::GuildUpdate,
        Self::GuildDelete,
        Self::GuildRoleCreate,
        Self::GuildRoleUpdate,
        Self::GuildRoleDelete,
        Self::GuildMemberAdd,
        Self::GuildMemberUpdate,
        Self::GuildMemberRemove,
        Self::ChannelCreate,
        Self::ChannelUpdate,
        Self::ChannelDelete,
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::UserUpdate,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::UserUpdate => "USER_UPDATE",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for DispatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve_back() {
        for t in DispatchType::ALL {
            assert_eq!(DispatchType::from_name(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(DispatchType::from_name("TYPING_START"), None);
        assert_eq!(DispatchType::from_name("ready"), None);
    }
}
