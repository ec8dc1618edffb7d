//! Per-domain access objects over the dispatcher.
//!
//! Each record type names its collection path through `Resource`, and a
//! `ResourceClient<T>` offers `list`, `get`, `create`, `update`, `delete`
//! against it.

pub mod client;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use client::{Loaded, ResourceClient};

/// A record type served from a REST collection.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection path relative to the API base URL, e.g. `/tickets`.
    const PATH: &'static str;
}
