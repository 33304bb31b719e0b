//! Shard identity and guild-to-shard routing

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::Snowflake;
use crate::error::ModelError;

/// One shard of a fleet: `id` in `0..total`.
///
/// Serialized as the `[id, total]` pair the IDENTIFY payload expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId {
    id: u32,
    total: u32,
}

impl ShardId {
    /// Create a shard identity, rejecting `id >= total` and `total == 0`
    pub fn new(id: u32, total: u32) -> Result<Self, ModelError> {
        if total == 0 || id >= total {
            return Err(ModelError::InvalidShard { id, total });
        }
        Ok(Self { id, total })
    }

    /// The single shard of an unsharded client
    pub const ONE: ShardId = ShardId { id: 0, total: 1 };

    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Index of the shard that receives events for `guild_id`:
    /// `(guild_id >> 22) % total`.
    #[inline]
    pub fn for_guild(guild_id: Snowflake, total: u32) -> u32 {
        if total == 0 {
            return 0;
        }
        ((guild_id.get() >> 22) % u64::from(total)) as u32
    }

    /// Whether this shard owns `guild_id`
    #[inline]
    pub fn owns(&self, guild_id: Snowflake) -> bool {
        Self::for_guild(guild_id, self.total) == self.id
    }

    /// Every shard of a fleet of `total`
    pub fn fleet(total: u32) -> impl Iterator<Item = ShardId> {
        (0..total).map(move |id| ShardId { id, total })
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.id, self.total)
    }
}

impl Serialize for ShardId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.id, self.total].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShardId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let [id, total] = <[u32; 2]>::deserialize(deserializer)?;
        ShardId::new(id, total).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_bounds() {
        assert!(ShardId::new(0, 1).is_ok());
        assert!(ShardId::new(3, 4).is_ok());
        assert!(ShardId::new(4, 4).is_err());
        assert!(ShardId::new(0, 0).is_err());
    }

    #[test]
    fn test_for_guild_routing() {
        // 41944705796 is the timestamp portion of this id
        let guild = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(ShardId::for_guild(guild, 1), 0);
        assert_eq!(ShardId::for_guild(guild, 16), (41_944_705_796_u64 % 16) as u32);
        assert_eq!(ShardId::for_guild(guild, 0), 0);
    }

    #[test]
    fn test_owns_is_exclusive_across_fleet() {
        let guild = Snowflake::new(81_384_788_765_712_384);
        let owners: Vec<_> = ShardId::fleet(8).filter(|s| s.owns(guild)).collect();
        assert_eq!(owners.len(), 1);
    }

    #[test]
    fn test_serialize_as_pair() {
        let shard = ShardId::new(2, 5).unwrap();
        assert_eq!(serde_json::to_string(&shard).unwrap(), "[2,5]");

        let back: ShardId = serde_json::from_str("[2,5]").unwrap();
        assert_eq!(back, shard);
        assert!(serde_json::from_str::<ShardId>("[5,5]").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ShardId::new(1, 3).unwrap().to_string(), "[1, 3]");
    }
}
