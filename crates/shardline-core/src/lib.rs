//! # shardline-core
//!
//! Model layer shared by every other crate: snowflake IDs, shard routing,
//! gateway intents, and the entity records kept by the cache.
//! This crate has no I/O and no async runtime dependency.

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Channel, EntityKind, Fields, Guild, GuildParts, Member, Role, User};
pub use error::ModelError;
pub use value_objects::{Intents, ShardId, Snowflake, SnowflakeParseError};
