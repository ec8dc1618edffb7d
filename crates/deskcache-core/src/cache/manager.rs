use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::KeyValueStore;
use crate::clock::{Clock, SystemClock};

/// Entries are considered expired 5 minutes after they are written.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Prefix separating TTL cache entries from anything else in the store.
const KEY_NAMESPACE: &str = "api:";

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Json(#[cfg_attr(feature = "ts", ts(type = "unknown"))] Value),
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Payload,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Read-through cache with per-entry expiry over a `KeyValueStore`.
///
/// Every operation is best-effort: storage failures are logged and turn
/// into "absent" on read and no-ops on write. Clone is cheap.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store_key(key: &CacheKey) -> String {
        format!("{}{}", KEY_NAMESPACE, key)
    }

    /// Return the payload for `key` if it exists and has not expired.
    ///
    /// Expired and unreadable entries are removed.
    pub fn get(&self, key: &CacheKey) -> Option<Payload> {
        let store_key = Self::store_key(key);

        let raw = match self.store.get_item(&store_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.remove(&store_key);
                return None;
            }
        };

        if entry.is_expired_at(self.clock.now()) {
            debug!(key = %key, expired_at = %entry.expires_at, "Cache entry expired");
            self.remove(&store_key);
            return None;
        }

        Some(entry.payload)
    }

    /// Store `payload` under `key` with the default TTL.
    pub fn set(&self, key: &CacheKey, payload: &Payload) {
        self.set_with_ttl(key, payload, self.ttl);
    }

    pub fn set_with_ttl(&self, key: &CacheKey, payload: &Payload, ttl: Duration) {
        let Some(expires_at) = self.clock.now().checked_add_signed(ttl) else {
            warn!(key = %key, ttl_secs = ttl.num_seconds(), "Cache TTL out of range, entry not stored");
            return;
        };
        let entry = CacheEntry {
            payload: payload.clone(),
            expires_at,
        };

        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        match self.store.set_item(&Self::store_key(key), &serialized) {
            Ok(()) => debug!(key = %key, expires_at = %entry.expires_at, "Cached response"),
            Err(e) => warn!(key = %key, error = %e, "Failed to write cache entry"),
        }
    }

    /// Evict everything. Used by the manual "clear cache" action.
    pub fn clear(&self) {
        match self.store.clear() {
            Ok(()) => debug!("Cache cleared"),
            Err(e) => warn!(error = %e, "Failed to clear cache"),
        }
    }

    fn remove(&self, store_key: &str) {
        if let Err(e) = self.store.remove_item(store_key) {
            debug!(key = store_key, error = %e, "Failed to remove cache entry");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{DisabledStore, MemoryStore};
    use crate::clock::ManualClock;
    use serde_json::json;

    fn cache_with_clock() -> (TtlCache, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let cache = TtlCache::new(store.clone()).with_clock(clock.clone());
        (cache, clock, store)
    }

    #[test]
    fn test_entry_available_before_ttl() {
        let (cache, clock, _) = cache_with_clock();
        let key = CacheKey::for_path("/tickets");
        let payload = Payload::Json(json!([{"id": 1}]));

        cache.set(&key, &payload);
        clock.advance(Duration::seconds(DEFAULT_TTL_SECS - 1));

        assert_eq!(cache.get(&key), Some(payload));
    }

    #[test]
    fn test_entry_absent_at_and_after_ttl() {
        let (cache, clock, store) = cache_with_clock();
        let key = CacheKey::for_path("/tickets");

        cache.set(&key, &Payload::Text("hello".into()));
        clock.advance(Duration::seconds(DEFAULT_TTL_SECS));

        assert_eq!(cache.get(&key), None);
        // Lazy eviction removed the entry on read
        assert!(store.is_empty());
    }

    #[test]
    fn test_custom_ttl() {
        let (cache, clock, _) = cache_with_clock();
        let key = CacheKey::for_path("/events");

        cache.set_with_ttl(&key, &Payload::Text("x".into()), Duration::seconds(10));
        clock.advance(Duration::seconds(9));
        assert!(cache.get(&key).is_some());
        clock.advance(Duration::seconds(1));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_out_of_range_ttl_is_not_stored() {
        let (cache, _, store) = cache_with_clock();
        let key = CacheKey::for_path("/tickets");

        // Well past the latest representable timestamp
        cache.set_with_ttl(&key, &Payload::Text("x".into()), Duration::days(365 * 1_000_000));
        assert_eq!(cache.get(&key), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_refreshes_expiry() {
        let (cache, clock, _) = cache_with_clock();
        let key = CacheKey::for_path("/inventory");
        let payload = Payload::Json(json!({"count": 3}));

        cache.set(&key, &payload);
        clock.advance(Duration::seconds(DEFAULT_TTL_SECS - 10));
        cache.set(&key, &payload);
        clock.advance(Duration::seconds(60));

        assert_eq!(cache.get(&key), Some(payload));
    }

    #[test]
    fn test_corrupt_entry_is_absent_and_removed() {
        let (cache, _, store) = cache_with_clock();
        store.set_item("api:/tickets", "{not json").unwrap();

        assert_eq!(cache.get(&CacheKey::for_path("/tickets")), None);
        assert!(store.get_item("api:/tickets").unwrap().is_none());
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let cache = TtlCache::new(Arc::new(DisabledStore));
        let key = CacheKey::for_path("/tickets");

        cache.set(&key, &Payload::Text("ignored".into()));
        assert_eq!(cache.get(&key), None);
        cache.clear();
    }

    #[test]
    fn test_quota_exceeded_write_is_ignored() {
        let cache = TtlCache::new(Arc::new(MemoryStore::with_quota(16)));
        let key = CacheKey::for_path("/tickets");

        cache.set(&key, &Payload::Text("far too large for the quota".into()));
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_entry_serialization_shape() {
        let (cache, _, store) = cache_with_clock();
        cache.set(&CacheKey::for_path("/tickets"), &Payload::Json(json!([1])));

        let raw = store.get_item("api:/tickets").unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["payload"]["json"], json!([1]));
        assert!(value["expiresAt"].is_string());
    }

    #[test]
    fn test_clear_evicts_everything() {
        let (cache, _, _) = cache_with_clock();
        let a = CacheKey::for_path("/a");
        let b = CacheKey::for_path("/b");
        cache.set(&a, &Payload::Text("a".into()));
        cache.set(&b, &Payload::Text("b".into()));

        cache.clear();
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_none());
    }
}
