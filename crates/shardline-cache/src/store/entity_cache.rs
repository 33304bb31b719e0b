//! Concurrent entity store.
//!
//! One `DashMap` per entity kind. Child inserts hold a read guard on the
//! owning guild's entry for the duration of the insert, so a concurrent guild
//! removal either happens before the insert (which then sees no guild and is
//! refused) or after it (and its cascade removes the new child). Cascades
//! never hold a guild guard while touching a child map.

use dashmap::DashMap;
use std::collections::HashSet;

use shardline_core::{Channel, Guild, GuildParts, Member, Role, ShardId, Snowflake, User};

use super::RefreshFlags;

/// An entity before and after an update was merged into it
#[derive(Debug, Clone, PartialEq)]
pub struct Updated<T> {
    pub before: T,
    pub after: T,
}

/// Entry counts per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub guilds: usize,
    pub unavailable_guilds: usize,
    pub channels: usize,
    pub roles: usize,
    pub members: usize,
    pub users: usize,
}

/// In-memory entity cache
#[derive(Debug, Default)]
pub struct EntityCache {
    guilds: DashMap<Snowflake, Guild>,
    channels: DashMap<Snowflake, Channel>,
    roles: DashMap<Snowflake, Role>,
    members: DashMap<(Snowflake, Snowflake), Member>,
    users: DashMap<Snowflake, User>,
    refresh: RefreshFlags,
}

impl EntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Guilds
    // =========================================================================

    /// Store a full guild and its children, replacing any previous children.
    ///
    /// Returns the previously cached guild (an unavailable placeholder when the
    /// guild is becoming available again).
    pub fn insert_guild(&self, parts: GuildParts) -> Option<Guild> {
        let GuildParts {
            guild,
            channels,
            roles,
            members,
            users,
        } = parts;
        let mut guild = guild?;
        let guild_id = guild.id;
        guild.unavailable = false;

        let previous = self.guilds.insert(guild_id, guild);
        if previous.is_some() {
            self.drop_children(&HashSet::from([guild_id]));
        }

        for user in users {
            self.upsert_user(user);
        }

        // Held while the children go in; see the module docs
        let Some(_guard) = self.guilds.get(&guild_id) else {
            return previous;
        };
        for channel in channels {
            self.channels.insert(channel.id, channel);
        }
        for role in roles {
            self.roles.insert(role.id, role);
        }
        for member in members {
            self.members.insert(member.key(), member);
        }

        tracing::trace!(guild_id = %guild_id, "Cached guild");
        previous
    }

    /// Record a guild that is known but not yet (or no longer) available
    pub fn insert_unavailable_guild(&self, guild_id: Snowflake) {
        self.guilds
            .entry(guild_id)
            .and_modify(|g| g.unavailable = true)
            .or_insert_with(|| Guild::unavailable(guild_id));
    }

    /// Merge a guild update. Uncached guilds are ignored.
    pub fn merge_guild(&self, patch: &Guild) -> Option<Updated<Guild>> {
        let mut entry = self.guilds.get_mut(&patch.id)?;
        let before = entry.clone();
        entry.merge(patch);
        Some(Updated {
            before,
            after: entry.clone(),
        })
    }

    /// Remove a guild and everything it owns. Users are kept.
    pub fn remove_guild(&self, guild_id: Snowflake) -> Option<Guild> {
        let (_, guild) = self.guilds.remove(&guild_id)?;
        self.drop_children(&HashSet::from([guild_id]));
        tracing::trace!(guild_id = %guild_id, "Removed guild");
        Some(guild)
    }

    /// Mark a guild unavailable (outage) and drop its children.
    ///
    /// Returns the guild as it was before, or `None` if it was not cached
    /// (a placeholder is stored in that case).
    pub fn mark_guild_unavailable(&self, guild_id: Snowflake) -> Option<Guild> {
        let before = match self.guilds.get_mut(&guild_id) {
            Some(mut entry) => {
                let before = entry.clone();
                entry.unavailable = true;
                Some(before)
            }
            None => {
                self.guilds.insert(guild_id, Guild::unavailable(guild_id));
                None
            }
        };
        self.drop_children(&HashSet::from([guild_id]));
        before
    }

    /// Remove every guild routed to `shard` and their children.
    ///
    /// Returns the removed guild IDs.
    pub fn purge_shard(&self, shard: ShardId) -> Vec<Snowflake> {
        let mut removed = HashSet::new();
        self.guilds.retain(|id, _| {
            if shard.owns(*id) {
                removed.insert(*id);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.drop_children(&removed);
        }
        tracing::debug!(shard = %shard, guilds = removed.len(), "Purged shard from cache");
        removed.into_iter().collect()
    }

    fn drop_children(&self, guild_ids: &HashSet<Snowflake>) {
        self.channels
            .retain(|_, c| !c.guild_id.is_some_and(|g| guild_ids.contains(&g)));
        self.roles.retain(|_, r| !guild_ids.contains(&r.guild_id));
        self.members.retain(|(g, _), _| !guild_ids.contains(g));
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Insert or replace a guild channel. Refused when its guild is not cached;
    /// direct message channels are never stored.
    pub fn insert_channel(&self, channel: Channel) -> bool {
        let Some(guild_id) = channel.guild_id else {
            return false;
        };
        let Some(_guard) = self.guilds.get(&guild_id) else {
            return false;
        };
        self.channels.insert(channel.id, channel);
        true
    }

    /// Merge a channel update. Uncached channels are ignored.
    pub fn merge_channel(&self, patch: &Channel) -> Option<Updated<Channel>> {
        let mut entry = self.channels.get_mut(&patch.id)?;
        let before = entry.clone();
        entry.merge(patch);
        Some(Updated {
            before,
            after: entry.clone(),
        })
    }

    pub fn remove_channel(&self, channel_id: Snowflake) -> Option<Channel> {
        self.channels.remove(&channel_id).map(|(_, c)| c)
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Insert or replace a role. Refused when its guild is not cached.
    pub fn insert_role(&self, role: Role) -> bool {
        let Some(_guard) = self.guilds.get(&role.guild_id) else {
            return false;
        };
        self.roles.insert(role.id, role);
        true
    }

    /// Merge a role update. Uncached roles are ignored.
    pub fn merge_role(&self, patch: &Role) -> Option<Updated<Role>> {
        let mut entry = self.roles.get_mut(&patch.id)?;
        let before = entry.clone();
        entry.merge(patch);
        Some(Updated {
            before,
            after: entry.clone(),
        })
    }

    pub fn remove_role(&self, role_id: Snowflake) -> Option<Role> {
        self.roles.remove(&role_id).map(|(_, r)| r)
    }

    // =========================================================================
    // Members
    // =========================================================================

    /// Insert or replace a member and upsert its user. Refused when the guild
    /// is not cached; the user is stored either way.
    pub fn insert_member(&self, member: Member, user: User) -> bool {
        self.upsert_user(user);
        let Some(_guard) = self.guilds.get(&member.guild_id) else {
            return false;
        };
        self.members.insert(member.key(), member);
        true
    }

    /// Merge a member update (and the user it carries, if cached).
    /// Uncached members are ignored.
    pub fn merge_member(&self, patch: &Member, user: Option<&User>) -> Option<Updated<Member>> {
        if let Some(user) = user {
            self.merge_user(user);
        }
        let mut entry = self.members.get_mut(&patch.key())?;
        let before = entry.clone();
        entry.merge(patch);
        Some(Updated {
            before,
            after: entry.clone(),
        })
    }

    pub fn remove_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.remove(&(guild_id, user_id)).map(|(_, m)| m)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user or merge into the cached one. Returns the previous state.
    pub fn upsert_user(&self, user: User) -> Option<User> {
        match self.users.get_mut(&user.id) {
            Some(mut entry) => {
                let before = entry.clone();
                entry.merge(&user);
                Some(before)
            }
            None => {
                // Another shard may have inserted in between; merge rather than overwrite
                let mut before = None;
                self.users
                    .entry(user.id)
                    .and_modify(|existing| {
                        before = Some(existing.clone());
                        existing.merge(&user);
                    })
                    .or_insert_with(|| user.clone());
                before
            }
        }
    }

    /// Merge a user update. Uncached users are ignored.
    pub fn merge_user(&self, patch: &User) -> Option<Updated<User>> {
        let mut entry = self.users.get_mut(&patch.id)?;
        let before = entry.clone();
        entry.merge(patch);
        Some(Updated {
            before,
            after: entry.clone(),
        })
    }

    // =========================================================================
    // Refresh flags
    // =========================================================================

    /// Flag a shard as rebuilding after a fresh identify
    pub fn mark_needs_refresh(&self, shard_id: u32) {
        if self.refresh.mark(shard_id) {
            tracing::debug!(shard_id, "Shard needs full cache refresh");
        }
    }

    /// Clear a shard's refresh flag once its guilds have settled
    pub fn mark_reconciled(&self, shard_id: u32) {
        if self.refresh.clear(shard_id) {
            tracing::debug!(shard_id, "Shard cache reconciled");
        }
    }

    #[must_use]
    pub fn needs_refresh(&self, shard_id: u32) -> bool {
        self.refresh.is_marked(shard_id)
    }

    #[must_use]
    pub fn refresh_flags(&self) -> &RefreshFlags {
        &self.refresh
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    #[must_use]
    pub fn guild(&self, guild_id: Snowflake) -> Option<Guild> {
        self.guilds.get(&guild_id).map(|g| g.clone())
    }

    #[must_use]
    pub fn contains_guild(&self, guild_id: Snowflake) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    #[must_use]
    pub fn channel(&self, channel_id: Snowflake) -> Option<Channel> {
        self.channels.get(&channel_id).map(|c| c.clone())
    }

    #[must_use]
    pub fn role(&self, role_id: Snowflake) -> Option<Role> {
        self.roles.get(&role_id).map(|r| r.clone())
    }

    #[must_use]
    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.get(&(guild_id, user_id)).map(|m| m.clone())
    }

    #[must_use]
    pub fn user(&self, user_id: Snowflake) -> Option<User> {
        self.users.get(&user_id).map(|u| u.clone())
    }

    #[must_use]
    pub fn guild_ids(&self) -> Vec<Snowflake> {
        self.guilds.iter().map(|g| *g.key()).collect()
    }

    #[must_use]
    pub fn guild_channels(&self, guild_id: Snowflake) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| c.guild_id == Some(guild_id))
            .map(|c| c.clone())
            .collect()
    }

    /// Roles of a guild, highest position first
    #[must_use]
    pub fn guild_roles(&self, guild_id: Snowflake) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter(|r| r.guild_id == guild_id)
            .map(|r| r.clone())
            .collect();
        roles.sort_by_key(|r| std::cmp::Reverse(r.position()));
        roles
    }

    #[must_use]
    pub fn guild_members(&self, guild_id: Snowflake) -> Vec<Member> {
        self.members
            .iter()
            .filter(|m| m.guild_id == guild_id)
            .map(|m| m.clone())
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            guilds: self.guilds.len(),
            unavailable_guilds: self.guilds.iter().filter(|g| g.unavailable).count(),
            channels: self.channels.len(),
            roles: self.roles.len(),
            members: self.members.len(),
            users: self.users.len(),
        }
    }
}
