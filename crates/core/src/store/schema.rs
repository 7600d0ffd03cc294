//! Field mappings of the cache collections.

use serde_json::{Value, json};

use super::Collection;
use crate::geometry::geohash::{MAX_PRECISION, MIN_PRECISION, tag_field};
use crate::query::GEOMETRY_FIELD;

/// Mapping body for `collection`.
///
/// `shape_precision` switches the geometry field to the legacy geohash prefix
/// tree at that precision (e.g. `1000m`).
pub fn mapping(collection: Collection, shape_precision: Option<&str>) -> Value {
    match collection {
        Collection::Info => json!({
            "properties": {
                "info": { "type": "object", "enabled": false }
            }
        }),
        Collection::Features => {
            let mut properties = serde_json::Map::new();
            properties.insert("itemid".into(), json!({ "type": "keyword" }));
            properties.insert("type".into(), json!({ "type": "keyword" }));
            properties.insert("feature".into(), json!({ "type": "keyword", "index": false, "doc_values": false }));
            for precision in MIN_PRECISION..=MAX_PRECISION {
                properties.insert(tag_field(precision), json!({ "type": "keyword" }));
            }
            let geom = match shape_precision {
                Some(precision) => json!({ "type": "geo_shape", "tree": "geohash", "precision": precision }),
                None => json!({ "type": "geo_shape" }),
            };
            properties.insert(GEOMETRY_FIELD.into(), geom);
            json!({ "properties": properties })
        }
        Collection::Services => json!({
            "properties": {
                "id": { "type": "keyword" },
                "type": { "type": "keyword" },
                "host": { "type": "keyword" }
            }
        }),
    }
}
