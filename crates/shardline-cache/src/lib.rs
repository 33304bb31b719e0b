//! # shardline-cache
//!
//! In-memory store of guilds, channels, roles, members and users, mutated by
//! the event pipeline in gateway order and read concurrently by listeners.
//!
//! ## Consistency rules
//!
//! - Updates merge only the fields present in the payload.
//! - Children (channels, roles, members) exist only while their guild is cached;
//!   inserts for an uncached guild are refused and updates never create entries.
//! - Removing a guild, or marking it unavailable, drops its children. Users are
//!   shared between guilds and are never cascaded.
//!
//! ## Example
//!
//! ```ignore
//! use shardline_cache::EntityCache;
//! use shardline_core::Guild;
//!
//! let cache = EntityCache::new();
//! cache.insert_guild(Guild::split_payload(guild_create_payload)?);
//! let general = cache.guild_channels(guild_id);
//! ```

pub mod store;

pub use store::{CacheStats, EntityCache, RefreshFlags, Updated};
