//! Application configuration management.
//!
//! Configuration is stored at `~/.config/deskcache/config.json` and can be
//! overridden per process through `DESKCACHE_*` environment variables, read
//! from the process environment or a `.env` file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::api::dispatcher::{MAX_RATE_LIMIT_RETRIES, REQUEST_TIMEOUT_SECS};
use crate::cache::{DisabledStore, FileStore, KeyValueStore, DEFAULT_TTL_SECS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "deskcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API base URL for a locally served backend
const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Default TTL cache quota (5 MB, in line with browser local storage)
const DEFAULT_CACHE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Longest accepted TTL (ten years)
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_dir: Option<PathBuf>,
    pub cache_quota_bytes: Option<u64>,
    pub rate_limit_retries: u32,
    pub initially_online: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_TTL_SECS as u64,
            cache_dir: None,
            cache_quota_bytes: Some(DEFAULT_CACHE_QUOTA_BYTES),
            rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            initially_online: true,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `DESKCACHE_*` variables resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DESKCACHE_API_BASE_URL") {
            self.base_url = url;
        }
        if let Some(secs) = lookup("DESKCACHE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("DESKCACHE_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("DESKCACHE_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_var("DESKCACHE_CACHE_TTL_SECS", &secs)?;
        }
        if let Some(dir) = lookup("DESKCACHE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(bytes) = lookup("DESKCACHE_CACHE_QUOTA_BYTES") {
            // 0 lifts the quota
            let bytes: u64 = parse_var("DESKCACHE_CACHE_QUOTA_BYTES", &bytes)?;
            self.cache_quota_bytes = (bytes > 0).then_some(bytes);
        }
        if let Some(retries) = lookup("DESKCACHE_RATE_LIMIT_RETRIES") {
            self.rate_limit_retries = parse_var("DESKCACHE_RATE_LIMIT_RETRIES", &retries)?;
        }
        self.validate()
    }

    /// Reject values that would disable the timeout or overflow expiry
    /// arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            bail!(
                "cache_ttl_secs must be at most {} (got {})",
                MAX_CACHE_TTL_SECS,
                self.cache_ttl_secs
            );
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Invalid API base URL: {}", self.base_url))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Open the TTL cache's backing store. When no cache directory can be
    /// used, caching is disabled rather than failing startup.
    pub fn open_store(&self) -> Arc<dyn KeyValueStore> {
        let opened = self
            .cache_dir()
            .and_then(|dir| FileStore::new(dir).map_err(anyhow::Error::from));

        match opened {
            Ok(store) => match self.cache_quota_bytes {
                Some(quota) => Arc::new(store.with_quota(quota)),
                None => Arc::new(store),
            },
            Err(e) => {
                warn!(error = %e, "Cache directory unavailable, caching disabled");
                Arc::new(DisabledStore)
            }
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}
