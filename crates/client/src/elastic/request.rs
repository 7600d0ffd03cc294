//! Request bodies for the Elasticsearch REST API.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};

use geocache_core::store::{BulkOp, Collection};

use super::ElasticError;

/// Body of `POST /_search/scroll`.
#[derive(Debug, Clone, Serialize)]
pub struct ScrollBody<'a> {
    pub scroll: &'a str,
    pub scroll_id: &'a str,
}

/// Body of `DELETE /_search/scroll`.
#[derive(Debug, Clone, Serialize)]
pub struct ClearScrollBody<'a> {
    pub scroll_id: &'a str,
}

/// Body of `POST /<index>/_update/<id>`: a partial document merged into the
/// stored one.
pub fn update_body(patch: &Value) -> Value {
    json!({ "doc": patch })
}

/// Body of `POST /<index>/_delete_by_query` for `field == value`.
pub fn delete_by_query_body(field: &str, value: &str) -> Value {
    json!({ "query": { "term": { field: value } } })
}

/// Encode bulk operations as NDJSON against the collection indices of `prefix`.
///
/// Every line, including the last, ends with `\n`.
pub fn encode_bulk(ops: &[BulkOp], prefix: &str) -> Result<Bytes, ElasticError> {
    let mut buf = Vec::new();
    let index = |collection: &Collection| collection.index_name(prefix);
    for op in ops {
        let (action, doc) = match op {
            BulkOp::Delete { collection, id } => (json!({ "delete": { "_index": index(collection), "_id": id } }), None),
            BulkOp::Create { collection, id, doc } => {
                (json!({ "create": { "_index": index(collection), "_id": id } }), Some(doc))
            }
            BulkOp::Index { collection, doc } => (json!({ "index": { "_index": index(collection) } }), Some(doc)),
        };
        serde_json::to_writer(&mut buf, &action)?;
        buf.push(b'\n');
        if let Some(doc) = doc {
            serde_json::to_writer(&mut buf, doc)?;
            buf.push(b'\n');
        }
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(bytes: &Bytes) -> Vec<Value> {
        std::str::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_encode_bulk() {
        let ops = vec![
            BulkOp::Delete { collection: Collection::Info, id: "test_0".into() },
            BulkOp::Create { collection: Collection::Info, id: "test_0".into(), doc: json!({"name": "snow"}) },
            BulkOp::Index { collection: Collection::Features, doc: json!({"itemid": "test_0"}) },
        ];
        let bytes = encode_bulk(&ops, "koop").unwrap();
        assert!(bytes.ends_with(b"\n"));

        let lines = lines(&bytes);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], json!({"delete": {"_index": "koop-info", "_id": "test_0"}}));
        assert_eq!(lines[1], json!({"create": {"_index": "koop-info", "_id": "test_0"}}));
        assert_eq!(lines[2], json!({"name": "snow"}));
        assert_eq!(lines[3], json!({"index": {"_index": "koop-features"}}));
        assert_eq!(lines[4], json!({"itemid": "test_0"}));
    }

    #[test]
    fn test_encode_empty_bulk() {
        assert!(encode_bulk(&[], "koop").unwrap().is_empty());
    }

    #[test]
    fn test_bodies() {
        let scroll = serde_json::to_value(ScrollBody { scroll: "30s", scroll_id: "abc" }).unwrap();
        assert_eq!(scroll, json!({"scroll": "30s", "scroll_id": "abc"}));
        assert_eq!(update_body(&json!({"status": ""})), json!({"doc": {"status": ""}}));
        assert_eq!(delete_by_query_body("itemid", "test_0"), json!({"query": {"term": {"itemid": "test_0"}}}));
    }
}
