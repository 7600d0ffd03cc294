//! Density aggregation command.

use anyhow::Result;
use serde_json::Value;

use geocache_core::{DocumentStore, GeoCache, QueryOptions};

pub async fn agg_impl<S: DocumentStore>(
    cache: &GeoCache<S>, key: &str, max_cells: usize, precision: Option<u8>, options: &QueryOptions,
) -> Result<Value> {
    let buckets = cache.geohash_agg(key, max_cells, precision, options).await?;
    Ok(serde_json::to_value(buckets)?)
}
