//! Online/offline signal for display.
//!
//! `ConnectivitySignal` holds one boolean-like state that the UI reads to
//! show a persistent offline banner. It is flipped only by connectivity
//! notifications and never consulted by the dispatcher: whether cached data
//! is served depends on request outcomes alone.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::api::{HttpRequest, Transport};

/// Banner text shown while offline.
const OFFLINE_BANNER: &str = "You are offline. Showing saved data where available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Notifications carry the state they switch to.
pub type ConnectivityEvent = ConnectivityState;

impl ConnectivityState {
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Cloneable handle; all clones observe the same state.
#[derive(Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivitySignal {
    /// `initially_online` is the platform's reported state at startup.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::from_online(initially_online));
        Self { tx: Arc::new(tx) }
    }

    /// Apply an online/offline notification. Repeated notifications of the
    /// current state do not wake subscribers.
    pub fn notify(&self, state: ConnectivityState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!(from = ?*current, to = ?state, "Connectivity changed");
            *current = state;
            true
        });
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectivityState::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// Persistent banner text, present only while offline.
    pub fn banner(&self) -> Option<&'static str> {
        if self.is_online() {
            None
        } else {
            Some(OFFLINE_BANNER)
        }
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Source of online/offline notifications outside a browser: periodically
/// sends `HEAD` to the API base URL. Any HTTP response means online.
pub struct ConnectivityProbe {
    transport: Arc<dyn Transport>,
    url: Url,
    interval: Duration,
    timeout: Duration,
    signal: ConnectivitySignal,
}

impl ConnectivityProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        url: Url,
        interval: Duration,
        timeout: Duration,
        signal: ConnectivitySignal,
    ) -> Self {
        Self {
            transport,
            url,
            interval,
            timeout,
            signal,
        }
    }

    /// Probe once and publish the result.
    pub async fn check(&self) -> ConnectivityState {
        let request = HttpRequest {
            method: Method::HEAD,
            url: self.url.clone(),
            body: None,
        };

        let state = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => {
                debug!(status = response.status, "Connectivity probe answered");
                ConnectivityState::Online
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Connectivity probe failed");
                ConnectivityState::Offline
            }
            Err(_) => {
                debug!("Connectivity probe timed out");
                ConnectivityState::Offline
            }
        };

        self.signal.notify(state);
        state
    }

    /// Probe on an interval until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.check().await;
                    }
                }
            }
        })
    }
}
