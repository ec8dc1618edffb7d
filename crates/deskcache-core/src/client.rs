//! Top-level handle wiring the cache, dispatcher and connectivity signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{Dispatcher, ReqwestTransport, Transport};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::connectivity::{ConnectivityProbe, ConnectivitySignal};
use crate::models::{Event, InventoryItem, Ticket};
use crate::resources::ResourceClient;

/// Probe timeout; a probe is only a liveness hint.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// Entry point for applications: one per process, cloned freely.
#[derive(Clone)]
pub struct DeskCache {
    dispatcher: Dispatcher,
    connectivity: ConnectivitySignal,
}

impl DeskCache {
    pub fn new(dispatcher: Dispatcher, connectivity: ConnectivitySignal) -> Self {
        Self {
            dispatcher,
            connectivity,
        }
    }

    /// Build the production stack from configuration: reqwest transport,
    /// file-backed TTL cache, and a connectivity signal seeded from
    /// `initially_online`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .context("Failed to build HTTP client")?;
        let cache = TtlCache::new(config.open_store()).with_ttl(config.cache_ttl());
        let dispatcher = Dispatcher::new(Arc::new(transport), cache, config.base_url()?)
            .with_timeout(config.request_timeout())
            .with_rate_limit_retries(config.rate_limit_retries);

        info!(base_url = %config.base_url, "deskcache client ready");
        Ok(Self::new(dispatcher, ConnectivitySignal::new(config.initially_online)))
    }

    pub fn tickets(&self) -> ResourceClient<Ticket> {
        ResourceClient::new(self.dispatcher.clone())
    }

    pub fn events(&self) -> ResourceClient<Event> {
        ResourceClient::new(self.dispatcher.clone())
    }

    pub fn inventory(&self) -> ResourceClient<InventoryItem> {
        ResourceClient::new(self.dispatcher.clone())
    }

    /// Manual "clear cache" action.
    pub fn clear_cache(&self) {
        self.dispatcher.cache().clear();
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// A probe that feeds this handle's connectivity signal by pinging the
    /// API base URL every `interval`.
    pub fn probe(&self, interval: Duration) -> ConnectivityProbe {
        let transport: Arc<dyn Transport> = Arc::clone(self.dispatcher.transport());
        ConnectivityProbe::new(
            transport,
            self.dispatcher.base_url().clone(),
            interval,
            Duration::from_secs(PROBE_TIMEOUT_SECS),
            self.connectivity.clone(),
        )
    }
}
