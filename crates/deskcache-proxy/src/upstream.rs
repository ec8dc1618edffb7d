//! The network side of the proxy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::debug;

use crate::error::{ProxyError, Result};
use crate::types::{HttpResponse, ProxyRequest};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Any response, including 4xx/5xx, is `Ok`. `Err(ProxyError::Unreachable)`
/// means no response was obtained.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<HttpResponse>;
}

pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn forward_headers(headers: &[(String, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                map.append(name, value);
            }
        }
        map
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &ProxyRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "Forwarding upstream");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::forward_headers(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_hop_by_hop_filter() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("etag"));
    }

    #[test]
    fn test_forward_headers_drops_hop_by_hop_and_invalid() {
        let headers = vec![
            ("Host".to_string(), "app.test".to_string()),
            ("Accept".to_string(), "text/html".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ];
        let map = HttpUpstream::forward_headers(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("accept").unwrap(), "text/html");
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let upstream = HttpUpstream::new(Duration::from_secs(2)).unwrap();
        let request = ProxyRequest::get(Url::parse("http://127.0.0.1:9/index.html").unwrap());

        let err = upstream.fetch(&request).await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
