//! Fleet layout and fleet-level notifications

use std::fmt;

use shardline_core::ShardId;

use crate::session::CloseReason;

/// Shape of a shard fleet, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetPlan {
    /// Gateway URL without the version query
    pub url: String,
    pub shard_count: u32,
    /// Shards that may identify in parallel
    pub max_concurrency: u32,
}

impl FleetPlan {
    pub fn new(url: impl Into<String>, shard_count: u32) -> Self {
        Self {
            url: url.into(),
            shard_count,
            max_concurrency: 1,
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn shards(&self) -> impl Iterator<Item = ShardId> {
        ShardId::fleet(self.shard_count)
    }
}

impl fmt::Display for FleetPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shard(s), max concurrency {}, {}",
            self.shard_count, self.max_concurrency, self.url
        )
    }
}

/// Something that happened to the fleet as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// A shard's session ended for good. Closed shards are not replaced.
    ShardClosed { shard: ShardId, reason: CloseReason },
}
