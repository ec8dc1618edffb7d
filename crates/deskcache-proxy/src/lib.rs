//! Caching interception proxy for deskcache.
//!
//! Sits between the application and its origin: static assets are served
//! cache-first from a versioned generation, API paths network-first with the
//! stored copy as fallback, and everything that is not a GET passes through.

pub mod config;
pub mod error;
pub mod server;
pub mod storage;
pub mod strategy;
pub mod types;
pub mod upstream;
pub mod worker;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use storage::{is_valid_generation_name, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use strategy::{RoutePolicy, Strategy};
pub use types::{CacheStatus, HttpResponse, ProxyRequest, ProxyResponse, RequestKey, StoredResponse};
pub use upstream::{HttpUpstream, Upstream};
pub use worker::InterceptionProxy;
