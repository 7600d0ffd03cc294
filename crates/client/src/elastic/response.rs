//! Elasticsearch response types and normalization.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use geocache_core::store::{BulkSummary, Hit, SearchResponse};

/// Raw `_search` / `_search/scroll` response.
#[derive(Debug, Deserialize)]
pub struct RawSearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    pub hits: RawHits,
    #[serde(default)]
    pub aggregations: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawHits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

/// `hits.total`: a bare number on older engines, `{value, relation}` on newer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) | TotalHits::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl From<RawSearchResponse> for SearchResponse {
    fn from(raw: RawSearchResponse) -> Self {
        SearchResponse {
            scroll_id: raw.scroll_id,
            total: raw.hits.total.map_or(0, |t| t.value()),
            hits: raw.hits.hits.into_iter().map(|h| Hit { id: h.id, source: h.source }).collect(),
            aggregations: raw.aggregations,
        }
    }
}

/// Raw `GET /<index>/_doc/<id>` response.
#[derive(Debug, Deserialize)]
pub struct GetResponse {
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

impl GetResponse {
    pub fn into_source(self) -> Option<Value> {
        if self.found { self.source } else { None }
    }
}

/// Raw `_bulk` response.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkResponse {
    /// Count per-item outcomes. Deleting a missing document is not a failure.
    pub fn summary(&self) -> BulkSummary {
        let mut summary = BulkSummary::default();
        for (action, item) in self.items.iter().flat_map(|entry| entry.iter()) {
            let ok = (200..300).contains(&item.status) || (action == "delete" && item.status == 404);
            if ok {
                summary.succeeded += 1;
            } else {
                let reason = item.error.as_ref().map(ToString::to_string).unwrap_or_default();
                tracing::warn!(
                    action = %action,
                    id = item.id.as_deref().unwrap_or(""),
                    status = item.status,
                    error = %reason,
                    "bulk item failed"
                );
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Raw `_delete_by_query` response.
#[derive(Debug, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_response_with_object_total() {
        let raw: RawSearchResponse = serde_json::from_value(json!({
            "_scroll_id": "DXF1ZXJ5",
            "took": 3,
            "timed_out": false,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {"_index": "koop-features", "_id": "a", "_source": {"feature": "{}"}},
                    {"_index": "koop-features", "_id": "b", "_source": {"feature": "{}"}}
                ]
            }
        }))
        .unwrap();
        let response = SearchResponse::from(raw);
        assert_eq!(response.scroll_id.as_deref(), Some("DXF1ZXJ5"));
        assert_eq!(response.total, 2);
        assert_eq!(response.hits[1].id, "b");
        assert!(response.aggregations.is_none());
    }

    #[test]
    fn test_search_response_with_numeric_total_and_aggs() {
        let raw: RawSearchResponse = serde_json::from_value(json!({
            "hits": {"total": 1500, "hits": []},
            "aggregations": {"count": {"value": 42}}
        }))
        .unwrap();
        let response = SearchResponse::from(raw);
        assert_eq!(response.total, 1500);
        assert!(response.hits.is_empty());
        assert_eq!(response.aggregations.unwrap()["count"]["value"], 42);
    }

    #[test]
    fn test_get_response() {
        let found: GetResponse =
            serde_json::from_value(json!({"_id": "x", "found": true, "_source": {"name": "snow"}})).unwrap();
        assert_eq!(found.into_source(), Some(json!({"name": "snow"})));

        let missing: GetResponse = serde_json::from_value(json!({"_id": "x", "found": false})).unwrap();
        assert!(missing.into_source().is_none());
    }

    #[test]
    fn test_bulk_summary() {
        let raw: BulkResponse = serde_json::from_value(json!({
            "took": 30,
            "errors": true,
            "items": [
                {"delete": {"_index": "koop-info", "_id": "t", "status": 404, "result": "not_found"}},
                {"create": {"_index": "koop-info", "_id": "t", "status": 201}},
                {"index": {"_index": "koop-features", "_id": "f1", "status": 201}},
                {"index": {"_index": "koop-features", "_id": "f2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [geom]"}}}
            ]
        }))
        .unwrap();
        assert!(raw.errors);
        assert_eq!(raw.summary(), BulkSummary { succeeded: 3, failed: 1 });
    }

    #[test]
    fn test_delete_by_query_response() {
        let raw: DeleteByQueryResponse = serde_json::from_value(json!({"took": 5, "deleted": 12, "failures": []})).unwrap();
        assert_eq!(raw.deleted, 12);
    }
}
