//! Command implementations.
//!
//! Each command is an `*_impl` function over any [`DocumentStore`] returning
//! the JSON printed on stdout.
//!
//! [`DocumentStore`]: geocache_core::DocumentStore

pub mod agg;
pub mod datasets;
pub mod services;

#[cfg(test)]
pub(crate) mod fixtures {
    use geocache_core::{CacheConfig, GeoCache, MemoryStore};

    pub fn cache() -> GeoCache<MemoryStore> {
        GeoCache::new(MemoryStore::new(), CacheConfig::default())
    }

    pub const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "name": "points.geojson",
        "features": [
            {"type": "Feature", "properties": {"n": 1}, "geometry": {"type": "Point", "coordinates": [-104.99, 39.74]}},
            {"type": "Feature", "properties": {"n": 2}, "geometry": {"type": "Point", "coordinates": [-105.27, 40.01]}},
            {"type": "Feature", "properties": {"n": 3}, "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}}
        ]
    }"#;
}
