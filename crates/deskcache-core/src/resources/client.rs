use std::fmt::Display;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::Resource;
use crate::api::{ApiError, ApiRequest, Dispatcher, Source};
use crate::cache::{CacheKey, Payload};

/// A value together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub data: T,
    pub source: Source,
}

impl<T> Loaded<T> {
    pub fn is_from_cache(&self) -> bool {
        self.source == Source::Cache
    }
}

/// Access object for one resource domain.
///
/// `list` and `get` are cache-backed reads; `create`, `update` and `delete`
/// go straight to the network and surface every failure.
pub struct ResourceClient<T> {
    dispatcher: Dispatcher,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Resource> ResourceClient<T> {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            _marker: PhantomData,
        }
    }

    fn item_path(id: impl Display) -> String {
        format!("{}/{}", T::PATH, id)
    }

    // ===== Reads =====

    pub async fn list<F: Serialize + ?Sized>(&self, filters: &F) -> Result<Vec<T>, ApiError> {
        self.list_loaded(filters).await.map(|loaded| loaded.data)
    }

    pub async fn list_loaded<F: Serialize + ?Sized>(
        &self,
        filters: &F,
    ) -> Result<Loaded<Vec<T>>, ApiError> {
        let filters = serde_json::to_value(filters)
            .map_err(|e| ApiError::InvalidRequest(format!("Unserializable filters: {}", e)))?;
        let key = CacheKey::from_value(T::PATH, &filters);
        let request = ApiRequest::get(T::PATH).with_filters(&filters);
        self.read(&request, &key).await
    }

    pub async fn get(&self, id: impl Display) -> Result<T, ApiError> {
        self.get_loaded(id).await.map(|loaded| loaded.data)
    }

    pub async fn get_loaded(&self, id: impl Display) -> Result<Loaded<T>, ApiError> {
        let path = Self::item_path(id);
        let key = CacheKey::for_path(&path);
        self.read(&ApiRequest::get(path), &key).await
    }

    async fn read<R: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        key: &CacheKey,
    ) -> Result<Loaded<R>, ApiError> {
        let fetched = self.dispatcher.fetch_with_fallback(request, Some(key)).await?;
        debug!(key = %key, source = ?fetched.source, "Loaded resource");
        Ok(Loaded {
            data: decode(fetched.payload)?,
            source: fetched.source,
        })
    }

    // ===== Writes =====

    pub async fn create<B: Serialize + ?Sized>(&self, data: &B) -> Result<T, ApiError> {
        let request = ApiRequest::post(T::PATH, to_body(data)?);
        decode(self.dispatcher.send(&request).await?)
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: impl Display, data: &B) -> Result<T, ApiError> {
        let request = ApiRequest::put(Self::item_path(id), to_body(data)?);
        decode(self.dispatcher.send(&request).await?)
    }

    pub async fn delete(&self, id: impl Display) -> Result<(), ApiError> {
        self.dispatcher.send(&ApiRequest::delete(Self::item_path(id))).await?;
        Ok(())
    }
}

fn to_body<B: Serialize + ?Sized>(data: &B) -> Result<Value, ApiError> {
    serde_json::to_value(data).map_err(|e| ApiError::InvalidRequest(format!("Unserializable body: {}", e)))
}

fn decode<R: DeserializeOwned>(payload: Payload) -> Result<R, ApiError> {
    match payload {
        Payload::Json(value) => serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response shape: {}", e))),
        Payload::Text(_) => Err(ApiError::InvalidResponse("Expected a JSON response".to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
