//! Client code for geocache.
//!
//! This crate provides the Elasticsearch REST implementation of the core
//! `DocumentStore` trait, shared by the CLI and any host embedding the cache.

pub mod elastic;

pub use elastic::{ElasticClient, ElasticConfig, ElasticError};
