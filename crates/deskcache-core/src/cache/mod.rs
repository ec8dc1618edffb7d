//! Persistent read-through cache for offline data access.
//!
//! This module provides the `TtlCache` that remembers the last successful
//! response for a logical resource. Entries expire 5 minutes after they are
//! written and are removed lazily when read after expiry.
//!
//! Storage backends:
//! - `FileStore`: one JSON file per entry in the cache directory
//! - `MemoryStore`: in-process map
//! - `DisabledStore`: storage turned off, every lookup misses

pub mod key;
pub mod manager;
pub mod store;

pub use key::CacheKey;
pub use manager::{CacheEntry, Payload, TtlCache, DEFAULT_TTL_SECS};
pub use store::{DisabledStore, FileStore, KeyValueStore, MemoryStore, StorageError};
