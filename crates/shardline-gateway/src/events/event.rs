//! Typed events delivered to listeners.

use serde_json::Value;
use std::fmt;

use shardline_core::{Channel, Guild, Member, Role, ShardId, Snowflake, User};

/// Discriminant of [`Event`], used to subscribe listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ShardReady,
    Ready,
    GuildAvailable,
    GuildUnavailable,
    GuildJoin,
    GuildLeave,
    GuildUpdate,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    MemberAdd,
    MemberUpdate,
    MemberRemove,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    UserUpdate,
    GatewayDispatch,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShardReady => "shard_ready",
            Self::Ready => "ready",
            Self::GuildAvailable => "guild_available",
            Self::GuildUnavailable => "guild_unavailable",
            Self::GuildJoin => "guild_join",
            Self::GuildLeave => "guild_leave",
            Self::GuildUpdate => "guild_update",
            Self::RoleCreate => "role_create",
            Self::RoleUpdate => "role_update",
            Self::RoleDelete => "role_delete",
            Self::MemberAdd => "member_add",
            Self::MemberUpdate => "member_update",
            Self::MemberRemove => "member_remove",
            Self::ChannelCreate => "channel_create",
            Self::ChannelUpdate => "channel_update",
            Self::ChannelDelete => "channel_delete",
            Self::MessageCreate => "message_create",
            Self::MessageUpdate => "message_update",
            Self::MessageDelete => "message_delete",
            Self::UserUpdate => "user_update",
            Self::GatewayDispatch => "gateway_dispatch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application event.
///
/// `before` fields hold the cached state prior to the change, or `None` when
/// the entity was not cached.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A shard's initial guilds arrived, or stopped arriving
    ShardReady {
        /// Guilds announced in READY that never became available
        unavailable: Vec<Snowflake>,
    },
    /// Every shard of the fleet is ready
    Ready { user: Option<User>, shards: u32 },
    /// A guild from READY, or one recovering from an outage, became available
    GuildAvailable(Guild),
    GuildUnavailable {
        guild_id: Snowflake,
        before: Option<Guild>,
    },
    GuildJoin(Guild),
    GuildLeave {
        guild_id: Snowflake,
        before: Option<Guild>,
    },
    GuildUpdate {
        before: Option<Guild>,
        after: Guild,
    },
    RoleCreate(Role),
    RoleUpdate {
        before: Option<Role>,
        after: Role,
    },
    RoleDelete {
        guild_id: Snowflake,
        role_id: Snowflake,
        before: Option<Role>,
    },
    MemberAdd {
        member: Member,
        user: User,
    },
    MemberUpdate {
        before: Option<Member>,
        after: Member,
        user: User,
    },
    MemberRemove {
        guild_id: Snowflake,
        user: User,
        before: Option<Member>,
    },
    ChannelCreate(Channel),
    ChannelUpdate {
        before: Option<Channel>,
        after: Channel,
    },
    ChannelDelete(Channel),
    /// Messages are not cached; the payload is passed through
    MessageCreate {
        message_id: Snowflake,
        channel_id: Snowflake,
        guild_id: Option<Snowflake>,
        author: Option<User>,
        data: Value,
    },
    MessageUpdate {
        message_id: Snowflake,
        channel_id: Snowflake,
        guild_id: Option<Snowflake>,
        data: Value,
    },
    MessageDelete {
        message_id: Snowflake,
        channel_id: Snowflake,
        guild_id: Option<Snowflake>,
    },
    UserUpdate {
        before: Option<User>,
        after: User,
    },
    /// Every raw dispatch, when debug events are enabled
    GatewayDispatch { name: String, data: Value },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ShardReady { .. } => EventKind::ShardReady,
            Self::Ready { .. } => EventKind::Ready,
            Self::GuildAvailable(_) => EventKind::GuildAvailable,
            Self::GuildUnavailable { .. } => EventKind::GuildUnavailable,
            Self::GuildJoin(_) => EventKind::GuildJoin,
            Self::GuildLeave { .. } => EventKind::GuildLeave,
            Self::GuildUpdate { .. } => EventKind::GuildUpdate,
            Self::RoleCreate(_) => EventKind::RoleCreate,
            Self::RoleUpdate { .. } => EventKind::RoleUpdate,
            Self::RoleDelete { .. } => EventKind::RoleDelete,
            Self::MemberAdd { .. } => EventKind::MemberAdd,
            Self::MemberUpdate { .. } => EventKind::MemberUpdate,
            Self::MemberRemove { .. } => EventKind::MemberRemove,
            Self::ChannelCreate(_) => EventKind::ChannelCreate,
            Self::ChannelUpdate { .. } => EventKind::ChannelUpdate,
            Self::ChannelDelete(_) => EventKind::ChannelDelete,
            Self::MessageCreate { .. } => EventKind::MessageCreate,
            Self::MessageUpdate { .. } => EventKind::MessageUpdate,
            Self::MessageDelete { .. } => EventKind::MessageDelete,
            Self::UserUpdate { .. } => EventKind::UserUpdate,
            Self::GatewayDispatch { .. } => EventKind::GatewayDispatch,
        }
    }

    /// Guild the event belongs to, if any
    pub fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Self::GuildAvailable(guild) | Self::GuildJoin(guild) => Some(guild.id),
            Self::GuildUpdate { after, .. } => Some(after.id),
            Self::GuildUnavailable { guild_id, .. }
            | Self::GuildLeave { guild_id, .. }
            | Self::RoleDelete { guild_id, .. }
            | Self::MemberRemove { guild_id, .. } => Some(*guild_id),
            Self::RoleCreate(role) => Some(role.guild_id),
            Self::RoleUpdate { after, .. } => Some(after.guild_id),
            Self::MemberAdd { member, .. } => Some(member.guild_id),
            Self::MemberUpdate { after, .. } => Some(after.guild_id),
            Self::ChannelCreate(channel) | Self::ChannelDelete(channel) => channel.guild_id,
            Self::ChannelUpdate { after, .. } => after.guild_id,
            Self::MessageCreate { guild_id, .. }
            | Self::MessageUpdate { guild_id, .. }
            | Self::MessageDelete { guild_id, .. } => *guild_id,
            Self::ShardReady { .. }
            | Self::Ready { .. }
            | Self::UserUpdate { .. }
            | Self::GatewayDispatch { .. } => None,
        }
    }
}

/// An event together with the shard that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub shard: ShardId,
    pub event: Event,
}

impl DispatchedEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
