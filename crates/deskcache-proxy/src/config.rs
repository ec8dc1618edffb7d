//! Proxy configuration, read from `DESKCACHE_PROXY_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::storage::is_valid_generation_name;

/// Configuration for the interception proxy
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream: String,
    /// Cache generation name; bump per deployment.
    pub version: String,
    pub cache_dir: PathBuf,
    pub api_prefixes: Vec<String>,
    pub precache: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            upstream: "http://localhost:3000".to_string(),
            version: "deskcache-v1".to_string(),
            cache_dir: PathBuf::from("./cache/proxy"),
            api_prefixes: vec!["/api".to_string()],
            precache: vec!["/".to_string(), "/index.html".to_string()],
            timeout_secs: 30,
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` resolves.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("DESKCACHE_PROXY_PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid DESKCACHE_PROXY_PORT: {:?}", port))?;
        }
        if let Some(upstream) = lookup("DESKCACHE_PROXY_UPSTREAM") {
            config.upstream = upstream;
        }
        if let Some(version) = lookup("DESKCACHE_PROXY_VERSION") {
            config.version = version;
        }
        if let Some(dir) = lookup("DESKCACHE_PROXY_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(prefixes) = lookup("DESKCACHE_PROXY_API_PREFIXES") {
            config.api_prefixes = split_list(&prefixes);
        }
        if let Some(paths) = lookup("DESKCACHE_PROXY_PRECACHE") {
            config.precache = split_list(&paths);
        }
        if let Some(secs) = lookup("DESKCACHE_PROXY_TIMEOUT_SECS") {
            config.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid DESKCACHE_PROXY_TIMEOUT_SECS: {:?}", secs))?;
        }

        config.upstream_url()?;
        if !is_valid_generation_name(&config.version) {
            bail!(
                "Invalid DESKCACHE_PROXY_VERSION: {:?} (use letters, digits, '.', '-' or '_')",
                config.version
            );
        }
        Ok(config)
    }

    pub fn upstream_url(&self) -> Result<Url> {
        Url::parse(&self.upstream).with_context(|| format!("Invalid upstream URL: {}", self.upstream))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Comma-separated list, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
