//! Read-only view of the entity cache

use std::sync::Arc;

use shardline_cache::{CacheStats, EntityCache};
use shardline_core::{Channel, Guild, Member, Role, ShardId, Snowflake, User};

/// Lookups into the cache the event pipeline maintains.
///
/// Cheap to clone. Every lookup returns an owned snapshot.
#[derive(Debug, Clone)]
pub struct CacheReader {
    cache: Arc<EntityCache>,
}

impl CacheReader {
    pub(crate) fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    pub fn guild(&self, guild_id: Snowflake) -> Option<Guild> {
        self.cache.guild(guild_id)
    }

    /// Cached and available
    pub fn is_available(&self, guild_id: Snowflake) -> bool {
        self.cache.guild(guild_id).is_some_and(|g| !g.unavailable)
    }

    pub fn channel(&self, channel_id: Snowflake) -> Option<Channel> {
        self.cache.channel(channel_id)
    }

    pub fn role(&self, role_id: Snowflake) -> Option<Role> {
        self.cache.role(role_id)
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.cache.member(guild_id, user_id)
    }

    pub fn user(&self, user_id: Snowflake) -> Option<User> {
        self.cache.user(user_id)
    }

    pub fn guild_ids(&self) -> Vec<Snowflake> {
        self.cache.guild_ids()
    }

    pub fn guild_channels(&self, guild_id: Snowflake) -> Vec<Channel> {
        self.cache.guild_channels(guild_id)
    }

    pub fn guild_roles(&self, guild_id: Snowflake) -> Vec<Role> {
        self.cache.guild_roles(guild_id)
    }

    pub fn guild_members(&self, guild_id: Snowflake) -> Vec<Member> {
        self.cache.guild_members(guild_id)
    }

    /// Whether `shard` re-identified and its guilds have not settled yet
    pub fn needs_refresh(&self, shard: ShardId) -> bool {
        self.cache.needs_refresh(shard.id())
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
