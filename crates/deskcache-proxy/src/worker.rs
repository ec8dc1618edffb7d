//! The interception proxy: precache on install, generation cleanup on
//! activate, and per-request strategy dispatch.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::storage::CacheStorage;
use crate::strategy::{RoutePolicy, Strategy};
use crate::types::{CacheStatus, HttpResponse, ProxyRequest, ProxyResponse, StoredResponse};
use crate::upstream::Upstream;

pub struct InterceptionProxy {
    storage: Arc<dyn CacheStorage>,
    upstream: Arc<dyn Upstream>,
    policy: RoutePolicy,
    version: String,
    origin: Url,
    precache: Vec<String>,
}

impl InterceptionProxy {
    /// `version` names the cache generation; bump it per deployment.
    /// `origin` is the upstream base that precache paths resolve against.
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        upstream: Arc<dyn Upstream>,
        version: impl Into<String>,
        origin: Url,
    ) -> Self {
        Self {
            storage,
            upstream,
            policy: RoutePolicy::default(),
            version: version.into(),
            origin,
            precache: vec!["/".to_string(), "/index.html".to_string()],
        }
    }

    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_precache<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a path (with optional query) against the upstream origin,
    /// keeping any base path the origin carries.
    pub fn resolve(&self, path_and_query: &str) -> Result<Url> {
        let base = self.origin.as_str().trim_end_matches('/');
        let path = path_and_query.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
            .map_err(|e| ProxyError::InvalidRequest(format!("{}: {}", path_and_query, e)))
    }

    /// The request path with the origin's base path removed, i.e. the path
    /// the client addressed.
    pub fn route_path<'a>(&self, request: &'a ProxyRequest) -> &'a str {
        let base = self.origin.path().trim_end_matches('/');
        match request.path().strip_prefix(base) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => request.path(),
        }
    }

    // ===== Lifecycle =====

    /// Fetch and store the precache manifest. Nothing is stored unless every
    /// path returns a successful response.
    pub async fn install(&self) -> Result<usize> {
        let requests = self
            .precache
            .iter()
            .map(|path| Ok((path.as_str(), ProxyRequest::get(self.resolve(path)?))))
            .collect::<Result<Vec<_>>>()?;

        let fetched = try_join_all(requests.iter().map(|(path, request)| async move {
            let response = self.upstream.fetch(request).await.map_err(|e| ProxyError::Install {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(ProxyError::Install {
                    path: path.to_string(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            Ok(StoredResponse::new(request.key(), response))
        }))
        .await?;

        let count = fetched.len();
        for entry in fetched {
            self.storage.put(&self.version, entry).await?;
        }
        info!(version = %self.version, entries = count, "Precache installed");
        Ok(count)
    }

    /// Delete every generation other than the current version. Returns the
    /// deleted names. A generation that cannot be deleted is logged and
    /// skipped.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.generations().await? {
            if name == self.version {
                continue;
            }
            match self.storage.delete_generation(&name).await {
                Ok(true) => {
                    info!(generation = %name, "Deleted stale cache generation");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(generation = %name, error = %e, "Failed to delete stale cache generation"),
            }
        }
        Ok(deleted)
    }

    // ===== Interception =====

    pub async fn handle(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let strategy = self.policy.classify(&request.method, self.route_path(request));
        debug!(method = %request.method, url = %request.url, strategy = ?strategy, "Intercepted");

        match strategy {
            Strategy::Passthrough => {
                let response = self.upstream.fetch(request).await?;
                Ok(ProxyResponse {
                    response,
                    cache: CacheStatus::Bypass,
                })
            }
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        match self.upstream.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(request, &response).await;
                }
                Ok(ProxyResponse {
                    response,
                    cache: CacheStatus::Miss,
                })
            }
            Err(e) if e.is_unreachable() => match self.lookup(request).await {
                Some(stored) => {
                    warn!(url = %request.url, error = %e, "Upstream unreachable, serving stored copy");
                    Ok(ProxyResponse {
                        response: stored.response,
                        cache: CacheStatus::Fallback,
                    })
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn cache_first(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        if let Some(stored) = self.lookup(request).await {
            return Ok(ProxyResponse {
                response: stored.response,
                cache: CacheStatus::Hit,
            });
        }

        let response = self.upstream.fetch(request).await?;
        if response.is_success() {
            self.store(request, &response).await;
        }
        Ok(ProxyResponse {
            response,
            cache: CacheStatus::Miss,
        })
    }

    /// Storage failures degrade to a miss.
    async fn lookup(&self, request: &ProxyRequest) -> Option<StoredResponse> {
        match self.storage.lookup(&self.version, &request.key()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Proxy cache lookup failed");
                None
            }
        }
    }

    async fn store(&self, request: &ProxyRequest, response: &HttpResponse) {
        let entry = StoredResponse::new(request.key(), response.clone());
        if let Err(e) = self.storage.put(&self.version, entry).await {
            warn!(url = %request.url, error = %e, "Failed to store response copy");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::{DiskCacheStorage, MemoryCacheStorage};
    use crate::types::RequestKey;
    use async_trait::async_trait;
    use reqwest::Method;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Upstream that answers by path and can be switched offline.
    #[derive(Default)]
    pub(crate) struct FakeUpstream {
        routes: Mutex<HashMap<String, HttpResponse>>,
        offline: Mutex<bool>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeUpstream {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn route(&self, path: &str, response: HttpResponse) {
            self.routes.lock().unwrap().insert(path.to_string(), response);
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap() = offline;
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn fetch(&self, request: &ProxyRequest) -> Result<HttpResponse> {
            let target = match request.url.query() {
                Some(q) => format!("{}?{}", request.url.path(), q),
                None => request.url.path().to_string(),
            };
            self.calls.lock().unwrap().push(format!("{} {}", request.method, target));

            if *self.offline.lock().unwrap() {
                return Err(ProxyError::Unreachable("connection refused".to_string()));
            }
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(&target)
                .cloned()
                .unwrap_or_else(|| HttpResponse::new(404, "not found")))
        }
    }

    fn proxy(upstream: Arc<FakeUpstream>, storage: Arc<MemoryCacheStorage>, version: &str) -> InterceptionProxy {
        InterceptionProxy::new(storage, upstream, version, Url::parse("http://app.test").unwrap())
    }

    fn get(proxy: &InterceptionProxy, path: &str) -> ProxyRequest {
        ProxyRequest::get(proxy.resolve(path).unwrap())
    }

    fn html(body: &str) -> HttpResponse {
        HttpResponse::new(200, body).with_header("content-type", "text/html")
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let upstream = FakeUpstream::new();
        upstream.route("/", html("root"));
        upstream.route("/index.html", html("index"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = proxy(upstream.clone(), storage.clone(), "v1");

        assert_eq!(proxy.install().await.unwrap(), 2);
        assert_eq!(storage.entry_count("v1").await, 2);

        // Offline now; both precached documents are served from storage
        upstream.set_offline(true);
        let page = proxy.handle(&get(&proxy, "/index.html")).await.unwrap();
        assert_eq!(page.cache, CacheStatus::Hit);
        assert_eq!(page.response.body, b"index".to_vec());
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let upstream = FakeUpstream::new();
        upstream.route("/", html("root"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = proxy(upstream, storage.clone(), "v1");

        let err = proxy.install().await.unwrap_err();
        assert!(matches!(err, ProxyError::Install { ref path, .. } if path == "/index.html"));
        assert_eq!(storage.entry_count("v1").await, 0);
    }

    #[tokio::test]
    async fn test_install_fails_offline() {
        let upstream = FakeUpstream::new();
        upstream.set_offline(true);
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = proxy(upstream, storage.clone(), "v1");

        assert!(matches!(proxy.install().await, Err(ProxyError::Install { .. })));
        assert!(storage.generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_deletes_other_generations() {
        let upstream = FakeUpstream::new();
        let storage = Arc::new(MemoryCacheStorage::new());
        let old = html("old");
        for generation in ["v1", "v2", "v3"] {
            let key = ProxyRequest::get(Url::parse("http://app.test/").unwrap()).key();
            storage.put(generation, StoredResponse::new(key, old.clone())).await.unwrap();
        }
        let proxy = proxy(upstream, storage.clone(), "v2");

        let deleted = proxy.activate().await.unwrap();
        assert_eq!(deleted, vec!["v1", "v3"]);
        assert_eq!(storage.generations().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_activate_ignores_foreign_directories_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lost+found")).unwrap();
        let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()));
        let key = ProxyRequest::get(Url::parse("http://app.test/").unwrap()).key();
        storage.put("v1", StoredResponse::new(key.clone(), html("old"))).await.unwrap();

        let proxy = InterceptionProxy::new(
            storage.clone(),
            FakeUpstream::new(),
            "v2",
            Url::parse("http://app.test").unwrap(),
        );
        assert_eq!(proxy.activate().await.unwrap(), vec!["v1"]);
        assert!(storage.lookup("v1", &key).await.unwrap().is_none());
        assert!(dir.path().join("lost+found").is_dir());
    }

    #[tokio::test]
    async fn test_activate_continues_past_failed_deletion() {
        struct StuckGeneration(MemoryCacheStorage);

        #[async_trait]
        impl CacheStorage for StuckGeneration {
            async fn generations(&self) -> Result<Vec<String>> {
                self.0.generations().await
            }

            async fn delete_generation(&self, name: &str) -> Result<bool> {
                if name == "v0" {
                    return Err(ProxyError::Storage("permission denied".to_string()));
                }
                self.0.delete_generation(name).await
            }

            async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
                self.0.lookup(generation, key).await
            }

            async fn put(&self, generation: &str, entry: StoredResponse) -> Result<()> {
                self.0.put(generation, entry).await
            }
        }

        let storage = Arc::new(StuckGeneration(MemoryCacheStorage::new()));
        let key = ProxyRequest::get(Url::parse("http://app.test/").unwrap()).key();
        for generation in ["v0", "v1", "v2"] {
            storage.put(generation, StoredResponse::new(key.clone(), html("old"))).await.unwrap();
        }

        let proxy = InterceptionProxy::new(
            storage.clone(),
            FakeUpstream::new(),
            "v2",
            Url::parse("http://app.test").unwrap(),
        );
        assert_eq!(proxy.activate().await.unwrap(), vec!["v1"]);
        assert_eq!(storage.generations().await.unwrap(), vec!["v0", "v2"]);
    }

    #[tokio::test]
    async fn test_cache_first_serves_stored_copy_without_network() {
        let upstream = FakeUpstream::new();
        upstream.route("/app.js", HttpResponse::new(200, "console.log(1)"));
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");
        let request = get(&proxy, "/app.js");

        let first = proxy.handle(&request).await.unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);

        upstream.route("/app.js", HttpResponse::new(200, "console.log(2)"));
        let second = proxy.handle(&request).await.unwrap();
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.response.body, b"console.log(1)".to_vec());
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let upstream = FakeUpstream::new();
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");
        let request = get(&proxy, "/missing.png");

        let first = proxy.handle(&request).await.unwrap();
        assert_eq!(first.response.status, 404);
        assert_eq!(first.cache, CacheStatus::Miss);

        proxy.handle(&request).await.unwrap();
        assert_eq!(upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_network_first_prefers_live_response() {
        let upstream = FakeUpstream::new();
        upstream.route("/api/tickets?status=open", HttpResponse::new(200, "[1]"));
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");
        let request = get(&proxy, "/api/tickets?status=open");

        proxy.handle(&request).await.unwrap();
        upstream.route("/api/tickets?status=open", HttpResponse::new(200, "[1,2]"));

        let live = proxy.handle(&request).await.unwrap();
        assert_eq!(live.cache, CacheStatus::Miss);
        assert_eq!(live.response.body, b"[1,2]".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_when_unreachable() {
        let upstream = FakeUpstream::new();
        upstream.route("/api/tickets?status=open", HttpResponse::new(200, "[1]"));
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");

        proxy.handle(&get(&proxy, "/api/tickets?status=open")).await.unwrap();
        upstream.set_offline(true);

        let fallback = proxy.handle(&get(&proxy, "/api/tickets?status=open")).await.unwrap();
        assert_eq!(fallback.cache, CacheStatus::Fallback);
        assert_eq!(fallback.response.body, b"[1]".to_vec());

        // Different query string is a different identity
        let err = proxy.handle(&get(&proxy, "/api/tickets?status=closed")).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_network_first_passes_error_responses_through() {
        let upstream = FakeUpstream::new();
        upstream.route("/api/tickets", HttpResponse::new(200, "[1]"));
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");
        let request = get(&proxy, "/api/tickets");
        proxy.handle(&request).await.unwrap();

        upstream.route("/api/tickets", HttpResponse::new(500, "boom"));
        let response = proxy.handle(&request).await.unwrap();
        assert_eq!(response.response.status, 500);
        assert_eq!(response.cache, CacheStatus::Miss);

        // The 500 did not overwrite the stored copy
        upstream.set_offline(true);
        let fallback = proxy.handle(&request).await.unwrap();
        assert_eq!(fallback.response.body, b"[1]".to_vec());
    }

    #[tokio::test]
    async fn test_non_get_is_never_cached() {
        let upstream = FakeUpstream::new();
        let proxy = proxy(upstream.clone(), Arc::new(MemoryCacheStorage::new()), "v1");
        let post = ProxyRequest::new(Method::POST, proxy.resolve("/api/tickets").unwrap()).with_body("{}");

        let response = proxy.handle(&post).await.unwrap();
        assert_eq!(response.cache, CacheStatus::Bypass);

        upstream.set_offline(true);
        assert!(proxy.handle(&post).await.unwrap_err().is_unreachable());
        assert_eq!(upstream.calls(), vec!["POST /api/tickets", "POST /api/tickets"]);
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let upstream = FakeUpstream::new();
        upstream.route("/app.css", HttpResponse::new(200, "body{}"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let v1 = proxy(upstream.clone(), storage.clone(), "v1");
        v1.handle(&get(&v1, "/app.css")).await.unwrap();

        let v2 = proxy(upstream.clone(), storage, "v2");
        let response = v2.handle(&get(&v2, "/app.css")).await.unwrap();
        assert_eq!(response.cache, CacheStatus::Miss);
    }

    fn proxy_under_base_path(upstream: Arc<FakeUpstream>) -> InterceptionProxy {
        InterceptionProxy::new(
            Arc::new(MemoryCacheStorage::new()),
            upstream,
            "v1",
            Url::parse("http://app.test/desk/").unwrap(),
        )
    }

    #[test]
    fn test_resolve_keeps_origin_path() {
        let proxy = proxy_under_base_path(FakeUpstream::new());
        let request = get(&proxy, "/api/tickets?x=1");
        assert_eq!(request.url.as_str(), "http://app.test/desk/api/tickets?x=1");
        assert_eq!(proxy.route_path(&request), "/api/tickets");
        assert_eq!(proxy.route_path(&get(&proxy, "/")), "/");
    }

    #[tokio::test]
    async fn test_strategy_ignores_origin_base_path() {
        let upstream = FakeUpstream::new();
        upstream.route("/desk/api/tickets", HttpResponse::new(200, "[1]"));
        upstream.route("/desk/app.js", HttpResponse::new(200, "console.log(1)"));
        let proxy = proxy_under_base_path(upstream.clone());

        let first = proxy.handle(&get(&proxy, "/api/tickets")).await.unwrap();
        assert_eq!(first.response.body, b"[1]".to_vec());

        upstream.route("/desk/api/tickets", HttpResponse::new(200, "[1,2]"));
        let second = proxy.handle(&get(&proxy, "/api/tickets")).await.unwrap();
        assert_eq!(second.cache, CacheStatus::Miss);
        assert_eq!(second.response.body, b"[1,2]".to_vec());

        upstream.set_offline(true);
        let fallback = proxy.handle(&get(&proxy, "/api/tickets")).await.unwrap();
        assert_eq!(fallback.cache, CacheStatus::Fallback);
        assert_eq!(fallback.response.body, b"[1,2]".to_vec());

        upstream.set_offline(false);
        proxy.handle(&get(&proxy, "/app.js")).await.unwrap();
        let asset = proxy.handle(&get(&proxy, "/app.js")).await.unwrap();
        assert_eq!(asset.cache, CacheStatus::Hit);
    }
}
