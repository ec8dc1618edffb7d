use reqwest::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live response preferred; stored copy only when upstream is unreachable.
    NetworkFirst,
    /// Stored copy preferred; network only on a miss.
    CacheFirst,
    /// Straight to upstream, never stored.
    Passthrough,
}

/// Chooses a caching strategy per request from the path prefixes that mark
/// API traffic.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    api_prefixes: Vec<String>,
}

impl RoutePolicy {
    pub fn new<I, S>(api_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let api_prefixes = api_prefixes
            .into_iter()
            .map(|p| {
                let p: String = p.into();
                format!("/{}", p.trim_matches('/'))
            })
            .collect();
        Self { api_prefixes }
    }

    /// Prefixes match whole path segments: `/api` covers `/api` and
    /// `/api/tickets` but not `/apiary`.
    pub fn is_api_path(&self, path: &str) -> bool {
        self.api_prefixes.iter().any(|prefix| {
            prefix == "/"
                || path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// `path` is the path the client asked for, before any upstream base
    /// path is applied.
    pub fn classify(&self, method: &Method, path: &str) -> Strategy {
        if *method != Method::GET {
            Strategy::Passthrough
        } else if self.is_api_path(path) {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(["/api"])
    }
}
