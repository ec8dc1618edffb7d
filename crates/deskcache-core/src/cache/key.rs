//! Cache key derivation.
//!
//! A key is the resource path followed by a canonical JSON rendering of the
//! request filters. Object keys are sorted recursively, so two filter objects
//! with the same content always produce the same key no matter how they were
//! built.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a resource path with no filters.
    pub fn for_path(path: &str) -> Self {
        Self(normalize_path(path))
    }

    /// Key for a resource path plus a filter object.
    ///
    /// Filters that serialize to `null` or an empty object produce the same
    /// key as `for_path`.
    pub fn for_request<F: Serialize + ?Sized>(path: &str, filters: &F) -> serde_json::Result<Self> {
        let value = serde_json::to_value(filters)?;
        Ok(Self::from_value(path, &value))
    }

    pub fn from_value(path: &str, filters: &Value) -> Self {
        let path = normalize_path(path);
        match canonicalize(filters) {
            Value::Null => Self(path),
            Value::Object(map) if map.is_empty() => Self(path),
            canonical => Self(format!("{}?{}", path, canonical)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
