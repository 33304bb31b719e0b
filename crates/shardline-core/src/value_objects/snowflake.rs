//! Snowflake IDs
//!
//! Every guild, channel, role and user is keyed by a 64-bit snowflake whose
//! top 42 bits are a millisecond timestamp. Those bits also route guilds to
//! shards, see [`crate::ShardId::for_guild`]. The gateway sends snowflakes
//! as JSON strings; numbers are accepted too.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// 2015-01-01T00:00:00Z in Unix milliseconds
    pub const EPOCH: u64 = 1_420_070_400_000;

    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Creation time in Unix milliseconds
    #[inline]
    pub const fn timestamp(&self) -> u64 {
        (self.0 >> 22) + Self::EPOCH
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp() as i64).unwrap_or_default()
    }

    pub fn parse(s: &str) -> Result<Self, SnowflakeParseError> {
        s.parse::<u64>()
            .map(Snowflake)
            .map_err(|_| SnowflakeParseError::InvalidFormat)
    }

    /// Read a snowflake out of a JSON string or number
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s).ok(),
            serde_json::Value::Number(n) => n.as_u64().map(Snowflake),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnowflakeParseError {
    #[error("invalid snowflake format")]
    InvalidFormat,
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl std::str::FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Snowflake::parse(s)
    }
}

// The platform sends IDs as strings; mirror that on the way out
impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing a snowflake ID")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Snowflake)
                    .map_err(|_| de::Error::custom("negative snowflake"))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                Ok(Snowflake(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Snowflake, E>
            where
                E: de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Snowflake)
                    .map_err(|_| de::Error::custom("invalid snowflake string"))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snowflake_creation() {
        let sf = Snowflake::new(123_456_789);
        assert_eq!(sf.get(), 123_456_789);
    }

    #[test]
    fn test_snowflake_zero() {
        assert!(Snowflake::default().is_zero());
        assert!(!Snowflake::new(1).is_zero());
    }

    #[test]
    fn test_snowflake_parse() {
        let sf = Snowflake::parse("175928847299117063").unwrap();
        assert_eq!(sf.get(), 175_928_847_299_117_063);

        assert!(Snowflake::parse("invalid").is_err());
        assert!(Snowflake::parse("-5").is_err());
    }

    #[test]
    fn test_snowflake_timestamp_extraction() {
        // 175928847299117063 was minted at 2016-04-30 11:18:25.796 UTC
        let sf = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(sf.timestamp(), 1_462_015_105_796);
        assert_eq!(
            sf.created_at().to_rfc3339(),
            "2016-04-30T11:18:25.796+00:00"
        );
    }

    #[test]
    fn test_snowflake_serialize_json() {
        let sf = Snowflake::new(123_456_789_012_345_678);
        let json = serde_json::to_string(&sf).unwrap();
        assert_eq!(json, "\"123456789012345678\"");
    }

    #[test]
    fn test_snowflake_deserialize_string() {
        let sf: Snowflake = serde_json::from_str("\"123456789012345678\"").unwrap();
        assert_eq!(sf.get(), 123_456_789_012_345_678);
    }

    #[test]
    fn test_snowflake_deserialize_number() {
        let sf: Snowflake = serde_json::from_str("12345").unwrap();
        assert_eq!(sf.get(), 12345);

        assert!(serde_json::from_str::<Snowflake>("-1").is_err());
    }

    #[test]
    fn test_snowflake_from_json_value() {
        assert_eq!(Snowflake::from_json(&json!("42")), Some(Snowflake::new(42)));
        assert_eq!(Snowflake::from_json(&json!(42)), Some(Snowflake::new(42)));
        assert_eq!(Snowflake::from_json(&json!(null)), None);
        assert_eq!(Snowflake::from_json(&json!("x")), None);
    }

    #[test]
    fn test_snowflake_ordering() {
        assert!(Snowflake::new(100) < Snowflake::new(200));
    }
}
