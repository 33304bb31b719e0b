//! Value objects - small immutable types shared across the client

mod intents;
mod shard;
mod snowflake;

pub use intents::Intents;
pub use shard::ShardId;
pub use snowflake::{Snowflake, SnowflakeParseError};
