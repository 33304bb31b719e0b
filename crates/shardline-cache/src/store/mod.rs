//! Entity store module.
//!
//! Per-kind concurrent maps plus per-shard refresh bookkeeping.

mod entity_cache;
mod refresh;

pub use entity_cache::{CacheStats, EntityCache, Updated};
pub use refresh::RefreshFlags;
