//! Offline-resilient data access for deskcache.
//!
//! Reads go through a `Dispatcher` that writes successful responses into a
//! persistent TTL cache and serves the cached copy when the network cannot be
//! reached. Error responses from a reachable server are never masked.

pub mod api;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod models;
pub mod resources;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiRequest, Dispatcher, Fetched, Source, Transport, TransportError};
pub use cache::{CacheKey, Payload, TtlCache};
pub use client::DeskCache;
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use connectivity::{ConnectivityEvent, ConnectivityProbe, ConnectivitySignal, ConnectivityState};
pub use resources::{Loaded, Resource, ResourceClient};
