//! Generation-scoped response storage.
//!
//! A generation is a named bucket of request-identity keyed responses. The
//! proxy writes into the generation named by its version tag and deletes all
//! others on activation.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::types::{RequestKey, StoredResponse};

const ENTRY_EXTENSION: &str = "entry";

/// Separates the metadata line from the body in an entry file.
const META_TERMINATOR: u8 = b'\n';

/// Distinguishes temporary files of concurrent writers within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generation names double as directory names: ASCII alphanumerics plus
/// `.`, `-` and `_`, excluding `.` and `..`.
pub fn is_valid_generation_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all existing generations.
    async fn generations(&self) -> Result<Vec<String>>;

    /// Returns false when the generation did not exist.
    async fn delete_generation(&self, name: &str) -> Result<bool>;

    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<StoredResponse>>;

    async fn put(&self, generation: &str, entry: StoredResponse) -> Result<()>;
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Default)]
pub struct MemoryCacheStorage {
    generations: RwLock<HashMap<String, HashMap<RequestKey, StoredResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry_count(&self, generation: &str) -> usize {
        self.generations
            .read()
            .await
            .get(generation)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn generations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.generations.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, name: &str) -> Result<bool> {
        Ok(self.generations.write().await.remove(name).is_some())
    }

    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let generations = self.generations.read().await;
        Ok(generations.get(generation).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, generation: &str, entry: StoredResponse) -> Result<()> {
        let mut generations = self.generations.write().await;
        generations
            .entry(generation.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }
}

// ============================================================================
// Disk
// ============================================================================

/// One directory per generation under `root`. Each entry is a single file
/// `<digest>.entry` holding one line of JSON metadata followed by the raw
/// body. Entries are written to a unique temporary file and renamed into
/// place, so readers see either the old or the new entry in full.
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(cache_dir = ?self.root, "Proxy cache initialized");
        Ok(())
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_generation_name(name) {
            return Err(ProxyError::InvalidRequest(format!("Invalid generation name: {:?}", name)));
        }
        Ok(self.root.join(name))
    }

    fn entry_path(dir: &Path, key: &RequestKey) -> PathBuf {
        dir.join(format!("{}.{}", key.digest(), ENTRY_EXTENSION))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = match fs::write(&tmp, data).await {
            Ok(()) => fs::rename(&tmp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn generations(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if is_valid_generation_name(name) => names.push(name.to_string()),
                _ => warn!(path = ?entry.path(), "Ignoring foreign directory in proxy cache"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, name: &str) -> Result<bool> {
        let dir = self.generation_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let dir = self.generation_dir(generation)?;

        let mut raw = match fs::read(Self::entry_path(&dir, key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = raw
            .iter()
            .position(|&b| b == META_TERMINATOR)
            .ok_or_else(|| ProxyError::Storage(format!("Truncated proxy cache entry for {}", key)))?;
        let body = raw.split_off(split + 1);

        let mut stored: StoredResponse = serde_json::from_slice(&raw[..split])?;
        if &stored.key != key {
            warn!(key = %key, stored = %stored.key, "Digest collision in proxy cache");
            return Ok(None);
        }
        stored.response.body = body;
        Ok(Some(stored))
    }

    async fn put(&self, generation: &str, entry: StoredResponse) -> Result<()> {
        let dir = self.generation_dir(generation)?;
        fs::create_dir_all(&dir).await?;

        // Compact JSON never contains a raw newline
        let mut data = serde_json::to_vec(&entry)?;
        data.push(META_TERMINATOR);
        data.extend_from_slice(&entry.response.body);
        Self::write_atomic(&Self::entry_path(&dir, &entry.key), &data).await?;

        debug!(generation = %generation, key = %entry.key, size = entry.response.body.len(), "Stored response");
        Ok(())
    }
}
