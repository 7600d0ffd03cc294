//! Adaptive-precision geohash density aggregation.
//!
//! The aggregation first looks for the finest geohash precision whose number
//! of distinct cells stays within the requested limit, then returns the
//! per-cell feature counts at that precision.

use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

use super::GeoCache;
use crate::Error;
use crate::geometry::geohash::{MAX_PRECISION, MIN_PRECISION, tag_field};
use crate::query::{self, Aggregation, CARDINALITY_AGG, QueryOptions, SearchRequest, TERMS_AGG};
use crate::store::{Collection, DocumentStore};

/// Precision tried first when the caller gives none.
pub const DEFAULT_START_PRECISION: u8 = 9;

/// Largest `precision_threshold` the engine accepts for cardinality.
const MAX_PRECISION_THRESHOLD: usize = 40_000;

/// Feature count of one geohash cell. Serializes as `{"<hash>": <count>}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeohashCount {
    pub hash: String,
    pub count: u64,
}

impl Serialize for GeohashCount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.hash, &self.count)?;
        map.end()
    }
}

/// The precision the search starts from: the requested one (or
/// [`DEFAULT_START_PRECISION`]) clamped to `3..=9`, then to the finest stored tag.
pub fn start_precision(requested: Option<u8>) -> u8 {
    requested
        .unwrap_or(DEFAULT_START_PRECISION)
        .clamp(MIN_PRECISION, DEFAULT_START_PRECISION)
        .min(MAX_PRECISION)
}

/// Turn a terms aggregation response into ordered cell counts.
pub fn reshape_buckets(aggregations: &Value) -> Result<Vec<GeohashCount>, Error> {
    let terms = aggregations
        .get(TERMS_AGG)
        .ok_or_else(|| Error::MalformedResponse(format!("missing `{TERMS_AGG}` aggregation")))?;
    let buckets = terms
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedResponse("terms aggregation without buckets".into()))?;

    if let Some(other) = terms.get("sum_other_doc_count").and_then(Value::as_u64).filter(|n| *n > 0) {
        tracing::warn!(sum_other_doc_count = other, buckets = buckets.len(), "geohash aggregation truncated");
    }

    buckets
        .iter()
        .map(|bucket| {
            let hash = bucket.get("key").and_then(Value::as_str);
            let count = bucket.get("doc_count").and_then(Value::as_u64);
            match (hash, count) {
                (Some(hash), Some(count)) => Ok(GeohashCount { hash: hash.to_string(), count }),
                _ => Err(Error::MalformedResponse(format!("unexpected bucket: {bucket}"))),
            }
        })
        .collect()
}

fn cardinality(aggregations: Option<&Value>) -> Result<u64, Error> {
    aggregations
        .and_then(|aggs| aggs.get(CARDINALITY_AGG))
        .and_then(|agg| agg.get("value"))
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MalformedResponse(format!("missing `{CARDINALITY_AGG}` aggregation value")))
}

impl<S: DocumentStore> GeoCache<S> {
    /// Per-geohash feature counts of a dataset at the finest precision whose
    /// cell count does not exceed `limit`.
    ///
    /// The search never goes below precision 3; at that floor the buckets are
    /// returned even when they outnumber `limit`.
    pub async fn geohash_agg(
        &self, key: &str, limit: usize, start: Option<u8>, options: &QueryOptions,
    ) -> Result<Vec<GeohashCount>, Error> {
        let table = self.resolve_table(key, options);
        let base = query::build_query(&table, options, self.config.default_size)?;

        let (precision, cells) = self.search_precision(&base, limit, start_precision(start)).await?;
        let buckets = self.fetch_buckets(&base, precision, cells).await?;
        tracing::debug!(table = %table, precision, buckets = buckets.len(), "geohash aggregation complete");
        Ok(buckets)
    }

    /// Walk precision down from `start` until the distinct count fits `limit`.
    pub async fn find_precision(&self, base: &SearchRequest, limit: usize, start: u8) -> Result<u8, Error> {
        Ok(self.search_precision(base, limit, start).await?.0)
    }

    /// The chosen precision with its distinct cell count.
    async fn search_precision(&self, base: &SearchRequest, limit: usize, start: u8) -> Result<(u8, u64), Error> {
        let mut precision = start;
        let mut count = self.distinct_cells(base, precision).await?;
        while count > limit as u64 && precision > MIN_PRECISION {
            precision -= 1;
            count = self.distinct_cells(base, precision).await?;
        }
        Ok((precision, count))
    }

    async fn distinct_cells(&self, base: &SearchRequest, precision: u8) -> Result<u64, Error> {
        let request = base.aggregate(Aggregation::Cardinality {
            field: tag_field(precision),
            precision_threshold: self.config.limit.min(MAX_PRECISION_THRESHOLD),
        });
        let response = self.call("search", self.store.search(Collection::Features, &request)).await?;
        let count = cardinality(response.aggregations.as_ref())?;
        tracing::debug!(precision, count, "geohash precision probe");
        Ok(count)
    }

    /// Terms over every distinct cell, sized from the cardinality estimate.
    async fn fetch_buckets(&self, base: &SearchRequest, precision: u8, cells: u64) -> Result<Vec<GeohashCount>, Error> {
        let size = usize::try_from(cells).unwrap_or(usize::MAX).min(self.config.max_buckets).max(1);
        let request = base.aggregate(Aggregation::Terms { field: tag_field(precision), size });
        let response = self.call("search", self.store.search(Collection::Features, &request)).await?;
        let aggregations = response
            .aggregations
            .ok_or_else(|| Error::MalformedResponse("search response without aggregations".into()))?;
        reshape_buckets(&aggregations)
    }
}
