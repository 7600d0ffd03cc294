//! Dataset keys, info records and the documents stored per feature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::GeohashTags;

/// Key selecting every dataset.
pub const ALL_KEY: &str = "all";

/// Info record status while a dataset is being (re)loaded.
pub const STATUS_PROCESSING: &str = "processing";

/// Replace the host's reserved `:` separators so the key can be a document id.
pub fn sanitize(key: &str) -> String {
    key.replace(':', "_")
}

/// Storage name of one layer of a dataset: `<key>_<layer>`.
pub fn table_name(key: &str, layer: u32) -> String {
    format!("{}_{layer}", sanitize(key))
}

/// Type facet of a table, the text before its first `_`.
pub fn type_facet(table: &str) -> &str {
    table.split('_').next().unwrap_or(table)
}

/// Per-dataset metadata record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// `""`, `"processing"`, or a host-defined completion marker.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,

    /// Content hash of the cached features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub retrieved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Opaque host metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl InfoRecord {
    pub fn is_processing(&self) -> bool {
        self.status == STATUS_PROCESSING
    }
}

/// A missing or `null` status reads as `""`.
fn null_as_empty<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A feature collection handed to the cache for ingest.
///
/// Metadata sits next to `features` on the collection object. Features stay
/// raw JSON so one bad geometry cannot reject the whole collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub info: InfoRecord,

    #[serde(default)]
    pub features: Vec<Value>,
}

impl Dataset {
    /// Decode a collection object, or the first element of an array of them.
    pub fn from_json_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Array(mut items) if !items.is_empty() => serde_json::from_value(items.swap_remove(0)),
            other => serde_json::from_value(other),
        }
    }
}

/// One feature as stored in the features collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    /// Owning table.
    pub itemid: String,

    /// Type facet derived from the table name.
    #[serde(rename = "type")]
    pub type_facet: String,

    /// The serialized GeoJSON feature.
    pub feature: String,

    /// Geometry used for spatial filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom: Option<Value>,

    #[serde(flatten)]
    pub tags: Option<GeohashTags>,
}

/// A live instance of a named service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    #[serde(rename = "type")]
    pub service_type: String,
    pub id: String,
    pub host: String,
}

/// Feature collection returned by a select.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub count: u64,
    /// Set instead of returning features when the count is over the limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exceeds_limit: bool,
}

impl FeatureCollection {
    /// A collection carrying the metadata of `info`, if any.
    pub fn new(features: Vec<Value>, info: Option<&InfoRecord>) -> Self {
        let count = features.len() as u64;
        let info = info.cloned().unwrap_or_default();
        Self {
            kind: "FeatureCollection",
            features,
            name: info.name,
            sha: info.sha,
            info: info.info,
            updated_at: info.updated_at,
            retrieved_at: info.retrieved_at,
            expires_at: info.expires_at,
            count,
            exceeds_limit: false,
        }
    }

    /// Placeholder returned when `count` exceeds the configured limit.
    pub fn over_limit(count: u64, info: Option<&InfoRecord>) -> Self {
        Self { count, exceeds_limit: true, ..Self::new(Vec::new(), info) }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Marker returned while a dataset is processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingMarker {
    pub status: &'static str,
}

/// Outcome of a select on an existing dataset (or the `all` key).
///
/// A missing dataset is a `NotFound` error; an existing dataset whose query
/// matched nothing is a `Collection` with no features. Hosts decide how to
/// present each.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    Processing(ProcessingMarker),
    Collection(FeatureCollection),
}

impl Selection {
    pub fn processing() -> Self {
        Selection::Processing(ProcessingMarker { status: STATUS_PROCESSING })
    }

    pub fn collection(&self) -> Option<&FeatureCollection> {
        match self {
            Selection::Collection(collection) => Some(collection),
            Selection::Processing(_) => None,
        }
    }
}

/// RFC 3339 timestamps, also accepting epoch milliseconds on input.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<Raw> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(Raw::Millis(ms)) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
            Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}
