//! Core types and shared functionality for geocache.
//!
//! This crate provides:
//! - Geometry normalization and geohash tagging
//! - Search request construction
//! - The `DocumentStore` abstraction and an in-memory store
//! - The `GeoCache` operations: ingest, select, density aggregation, services
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod query;
pub mod store;

pub use cache::{GeoCache, GeohashCount};
pub use config::{AppConfig, CacheConfig, ConfigError};
pub use dataset::{Dataset, FeatureCollection, InfoRecord, Selection, ServiceRegistration};
pub use error::Error;
pub use query::{GeometryPolicy, QueryOptions};
pub use store::{DocumentStore, MemoryStore};
