//! Untyped entity fields with shallow merge

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::value_objects::Snowflake;

/// Non-identity fields of an entity, as received from the gateway.
///
/// Updates are applied with [`Fields::merge`]: keys present in the patch
/// overwrite, keys absent from the patch are left alone. Nested values are
/// replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Take ownership of a JSON object
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ModelError::NotAnObject),
        }
    }

    /// Apply `patch` on top of these fields. Returns whether anything changed.
    pub fn merge(&mut self, patch: &Fields) -> bool {
        let mut changed = false;
        for (key, value) in &patch.0 {
            if self.0.get(key) != Some(value) {
                self.0.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Integer that the platform may send as a string (permission bitsets)
    pub fn u64_lenient(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn snowflake(&self, key: &str) -> Option<Snowflake> {
        self.0.get(key).and_then(Snowflake::from_json)
    }

    /// Array of snowflakes; malformed entries are skipped
    pub fn snowflakes(&self, key: &str) -> Vec<Snowflake> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Snowflake::from_json).collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Remove and parse a required snowflake
    pub(crate) fn take_snowflake(&mut self, key: &'static str) -> Result<Snowflake, ModelError> {
        let value = self.0.remove(key).ok_or(ModelError::MissingField(key))?;
        Snowflake::from_json(&value).ok_or(ModelError::InvalidSnowflake(key))
    }

    /// Remove and parse an optional snowflake; `null` counts as absent
    pub(crate) fn take_optional_snowflake(
        &mut self,
        key: &'static str,
    ) -> Result<Option<Snowflake>, ModelError> {
        match self.0.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Snowflake::from_json(&value)
                .map(Some)
                .ok_or(ModelError::InvalidSnowflake(key)),
        }
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
