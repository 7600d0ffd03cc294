//! Geospatial feature cache over a [`DocumentStore`].
//!
//! [`GeoCache`] is the handle hosts hold. Its operations are spread over the
//! submodules:
//!
//! - `datasets`: insert, select, count, info and removal of datasets
//! - `density`: adaptive-precision geohash aggregation
//! - `services`: the service registry
//!
//! `bulk` and `scroll` hold the ingest batch builder and the scroll reader
//! those operations are built on.

pub mod bulk;
pub mod datasets;
pub mod density;
pub mod hash;
pub mod scroll;
pub mod services;

use std::future::Future;
use std::sync::Arc;

pub use crate::Error;
use crate::config::CacheConfig;
use crate::store::{self, Collection, DocumentStore, schema};

pub use bulk::{IngestBatch, prepare_batch};
pub use density::GeohashCount;
pub use scroll::{ScrollOutcome, ScrollReader};

/// Cache handle.
///
/// Cheap to clone; clones share the store.
#[derive(Debug)]
pub struct GeoCache<S> {
    pub(crate) store: Arc<S>,
    pub(crate) config: CacheConfig,
}

impl<S> Clone for GeoCache<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), config: self.config.clone() }
    }
}

impl<S: DocumentStore> GeoCache<S> {
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<S>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Make sure every collection exists with its mapping.
    ///
    /// Failures are logged and skipped so a partially provisioned engine
    /// still serves what it can.
    pub async fn bootstrap(&self) {
        let shape_precision = self.config.shape_precision.as_deref();
        for collection in Collection::ALL {
            let index = collection.index_name(&self.config.index_name);
            if let Err(err) = self.call("ensure_collection", self.store.ensure_collection(collection)).await {
                tracing::error!(index = %index, error = %err, "failed to create collection");
                continue;
            }
            let mapping = schema::mapping(collection, shape_precision);
            match self.call("put_mapping", self.store.put_mapping(collection, &mapping)).await {
                Ok(()) => tracing::debug!(index = %index, "collection ready"),
                Err(err) => tracing::error!(index = %index, error = %err, "failed to put mapping"),
            }
        }
    }

    /// Run one store call under the configured deadline.
    pub(crate) async fn call<T, F>(&self, operation: &str, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        store::with_deadline(self.config.request_timeout, operation, call).await
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    use super::GeoCache;
    use crate::config::CacheConfig;
    use crate::dataset::Dataset;
    use crate::store::MemoryStore;

    pub fn cache() -> GeoCache<MemoryStore> {
        GeoCache::new(MemoryStore::new(), CacheConfig::default())
    }

    pub fn point(lon: f64, lat: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": { "lon": lon, "lat": lat },
            "geometry": { "type": "Point", "coordinates": [lon, lat] }
        })
    }

    /// `n` points on a 0.01 degree grid starting at `(lon, lat)`, ten per row.
    pub fn grid(n: usize, lon: f64, lat: f64) -> Vec<Value> {
        (0..n)
            .map(|i| point(lon + (i % 10) as f64 * 0.01, lat + (i / 10) as f64 * 0.01))
            .collect()
    }

    pub fn dataset(features: Vec<Value>) -> Dataset {
        Dataset { features, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bootstrap_declares_mappings() {
        let cache = fixtures::cache();
        cache.bootstrap().await;
        for collection in Collection::ALL {
            assert!(cache.store().mapping(collection).is_some());
        }
        let features = cache.store().mapping(Collection::Features).unwrap();
        assert_eq!(features["properties"]["geom"]["type"], "geo_shape");
    }

    #[tokio::test]
    async fn test_store_calls_time_out() {
        let config = CacheConfig { request_timeout: Duration::from_millis(10), ..CacheConfig::default() };
        let cache = GeoCache::new(MemoryStore::with_latency(Duration::from_millis(200)), config);
        let err = cache.get_info("test_0").await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
    }
}
