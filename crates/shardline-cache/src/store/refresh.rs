//! Per-shard "needs full refresh" flags.
//!
//! A shard is flagged when its session re-identified from scratch: the guilds
//! it owned were purged and the cache only becomes trustworthy for that shard
//! again once the new session's guild availability has settled.

use dashmap::DashSet;

/// Set of shard indexes whose cached view is being rebuilt
#[derive(Debug, Default)]
pub struct RefreshFlags {
    pending: DashSet<u32>,
}

impl RefreshFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a shard. Returns `false` if it was already flagged.
    pub fn mark(&self, shard_id: u32) -> bool {
        self.pending.insert(shard_id)
    }

    /// Clear a shard's flag. Returns `true` if it was set.
    pub fn clear(&self, shard_id: u32) -> bool {
        self.pending.remove(&shard_id).is_some()
    }

    #[must_use]
    pub fn is_marked(&self, shard_id: u32) -> bool {
        self.pending.contains(&shard_id)
    }

    /// Flagged shards, sorted
    #[must_use]
    pub fn marked(&self) -> Vec<u32> {
        let mut shards: Vec<u32> = self.pending.iter().map(|s| *s).collect();
        shards.sort_unstable();
        shards
    }
}
