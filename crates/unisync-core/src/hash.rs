//! Content hashing for change detection.
//!
//! The hash is SHA-256 over a canonical JSON rendering (object keys sorted,
//! no insignificant whitespace), so equal configurations hash equally no
//! matter how their maps were built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::MergedConfig;
use crate::error::Result;

/// Hex-encoded SHA-256 of a canonicalized configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_value(value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this hash equals a previously persisted one.
    pub fn matches(&self, stored: Option<&str>) -> bool {
        stored == Some(self.0.as_str())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a merged configuration, including its resource type tag.
pub fn content_hash(config: &MergedConfig) -> Result<ContentHash> {
    let value = serde_json::to_value(config)?;
    Ok(ContentHash::of_value(&value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a string cannot fail.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_key_order() {
        let a = json!({"name": "r1", "nested": {"x": 1, "y": [1, 2]}, "action": "block"});
        let b = json!({"action": "block", "nested": {"y": [1, 2], "x": 1}, "name": "r1"});
        assert_eq!(ContentHash::of_value(&a), ContentHash::of_value(&b));
    }

    #[test]
    fn test_hash_is_sensitive_to_array_order_and_values() {
        let a = json!({"items": [1, 2]});
        let b = json!({"items": [2, 1]});
        let c = json!({"items": [1, 3]});
        assert_ne!(ContentHash::of_value(&a), ContentHash::of_value(&b));
        assert_ne!(ContentHash::of_value(&a), ContentHash::of_value(&c));
    }

    #[test]
    fn test_content_hash_of_merged_config() {
        let rule = RuleConfig {
            name: "r1".into(),
            expression: None,
            action: "block".into(),
            description: None,
            enabled: true,
        };
        let h1 = content_hash(&MergedConfig::Rule(rule.clone())).unwrap();
        let h2 = content_hash(&MergedConfig::Rule(rule)).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.as_str().len(), 64);
        assert!(h1.matches(Some(h2.as_str())));
        assert!(!h1.matches(None));
    }
}
