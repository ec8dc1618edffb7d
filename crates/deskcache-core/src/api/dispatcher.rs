//! The single chokepoint for application requests.
//!
//! Reads go through `fetch_with_fallback`: a successful response is written
//! through to the TTL cache, and when no response can be obtained at all the
//! last cached copy is served instead. A response that arrives with an error
//! status is never masked by the cache. Mutations go through `send`, which
//! does not touch the cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::error::ApiError;
use super::request::ApiRequest;
use super::transport::{HttpRequest, RawResponse, Transport};
use crate::cache::{CacheKey, Payload, TtlCache};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough to fall back.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Where a fetched payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    /// Served from the TTL cache because the network was unreachable
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Payload,
    pub source: Source,
}

impl Fetched {
    pub fn is_from_cache(&self) -> bool {
        self.source == Source::Cache
    }
}

/// Clone is cheap; the transport and cache store are shared.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    cache: TtlCache,
    base_url: Url,
    timeout: Duration,
    rate_limit_retries: u32,
    initial_backoff: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, cache: TtlCache, base_url: Url) -> Self {
        Self {
            transport,
            cache,
            base_url,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve a request path against the base URL, keeping the base path.
    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = request.path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{}/{}", base, path))
            .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", request.path, e)))?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }

    /// Issue a read, falling back to the cached copy under `cache_key` only
    /// when no response could be obtained.
    pub async fn fetch_with_fallback(
        &self,
        request: &ApiRequest,
        cache_key: Option<&CacheKey>,
    ) -> Result<Fetched, ApiError> {
        let outcome = self.execute(request).await;
        self.settle(outcome, cache_key)
    }

    /// Like `fetch_with_fallback`, but yields `Ok(None)` if `cancel` fires
    /// first. A cancelled read never writes to the cache.
    pub async fn fetch_with_fallback_cancellable(
        &self,
        request: &ApiRequest,
        cache_key: Option<&CacheKey>,
        cancel: &CancellationToken,
    ) -> Result<Option<Fetched>, ApiError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(path = %request.path, "Read cancelled");
                return Ok(None);
            }
            outcome = self.execute(request) => outcome,
        };

        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.settle(outcome, cache_key).map(Some)
    }

    /// Issue a mutation. Never consults or updates the cache.
    pub async fn send(&self, request: &ApiRequest) -> Result<Payload, ApiError> {
        self.execute(request).await
    }

    pub async fn send_cancellable(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Payload>, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            outcome = self.execute(request) => outcome.map(Some),
        }
    }

    fn settle(
        &self,
        outcome: Result<Payload, ApiError>,
        cache_key: Option<&CacheKey>,
    ) -> Result<Fetched, ApiError> {
        match outcome {
            Ok(payload) => {
                if let Some(key) = cache_key {
                    self.cache.set(key, &payload);
                }
                Ok(Fetched {
                    payload,
                    source: Source::Network,
                })
            }
            Err(err) if err.is_connectivity() => {
                let Some(key) = cache_key else {
                    return Err(err);
                };
                match self.cache.get(key) {
                    Some(payload) => {
                        info!(key = %key, error = %err, "Network unavailable, serving cached data");
                        Ok(Fetched {
                            payload,
                            source: Source::Cache,
                        })
                    }
                    None => {
                        debug!(key = %key, "Network unavailable and nothing cached");
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    /// One logical request: timeout per attempt, 429 backoff, decode.
    async fn execute(&self, request: &ApiRequest) -> Result<Payload, ApiError> {
        let url = self.url_for(request)?;
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let http = HttpRequest {
                method: request.method.clone(),
                url: url.clone(),
                body: request.body.clone(),
            };

            let response = match tokio::time::timeout(self.timeout, self.transport.send(http)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(url = %url, timeout_secs = self.timeout.as_secs(), "Request timed out");
                    return Err(ApiError::Timeout(self.timeout));
                }
            };

            if response.status == 429 && retries < self.rate_limit_retries {
                retries += 1;
                warn!(
                    url = %url,
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            return decode(response);
        }
    }
}

/// Decode a body by declared content type and map error statuses.
fn decode(response: RawResponse) -> Result<Payload, ApiError> {
    let success = response.is_success();

    let payload = if response.is_json() {
        if response.body.trim().is_empty() {
            Payload::Json(Value::Null)
        } else {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => Payload::Json(value),
                Err(e) if success => {
                    return Err(ApiError::InvalidResponse(format!(
                        "Failed to parse JSON response: {}",
                        e
                    )))
                }
                // An error body that lies about its type is still a message
                Err(_) => Payload::Text(response.body),
            }
        }
    } else {
        Payload::Text(response.body)
    };

    if success {
        Ok(payload)
    } else {
        Err(ApiError::from_status(response.status, &payload))
    }
}

// ============================================================================
// Tests
// ============================================================================
