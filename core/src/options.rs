//! Opaque layer options
//!
//! The factory hands these to layer constructors untouched; only the concrete layer knows
//! what a key means.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerOptions(BTreeMap<String, Value>);

impl LayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns these options with `overrides` laid over them. Keys absent from `overrides`
    /// keep their current value.
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut merged = self.clone();
        merged
            .0
            .extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl From<BTreeMap<String, Value>> for LayerOptions {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for LayerOptions {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for LayerOptions {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_unspecified_keys() {
        let standing = LayerOptions::new().with("pretty", true).with("timeout_ms", 500);
        let merged = standing.merged(&LayerOptions::new().with("pretty", false));

        assert_eq!(merged.get_bool("pretty"), Some(false));
        assert_eq!(merged.get_u64("timeout_ms"), Some(500));
        // Original untouched
        assert_eq!(standing.get_bool("pretty"), Some(true));
    }

    #[test]
    fn test_typed_getters() {
        let options: LayerOptions = [("name", json!("x")), ("n", json!(3)), ("flag", json!("yes"))]
            .into_iter()
            .collect();

        assert_eq!(options.get_str("name"), Some("x"));
        assert_eq!(options.get_u64("n"), Some(3));
        assert_eq!(options.get_bool("flag"), None);
        assert_eq!(options.len(), 3);
        assert_eq!(options.keys().collect::<Vec<_>>(), ["flag", "n", "name"]);
    }

    #[test]
    fn test_deserialize_from_object() {
        let options: LayerOptions =
            serde_json::from_str(r#"{"strict_version": false}"#).unwrap();
        assert_eq!(options.get_bool("strict_version"), Some(false));
        assert!(!options.contains_key("pretty"));
    }
}
