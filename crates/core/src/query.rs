//! Search request construction.
//!
//! A [`SearchRequest`] is the engine-neutral description of one search:
//! result size, an optional match clause, an optional spatial filter and an
//! optional aggregation. [`SearchRequest::to_body`] renders it as the
//! engine's query DSL.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::dataset::{self, ALL_KEY};
use crate::geometry::{self, GeometryError, GeometryParam, Shape};

/// Result size when the request carries no explicit limit.
pub const DEFAULT_SIZE: usize = 10_000;

/// Name of the distinct-count aggregation in requests and responses.
pub const CARDINALITY_AGG: &str = "count";

/// Name of the terms aggregation in requests and responses.
pub const TERMS_AGG: &str = "geohash";

/// Field holding the spatial filter geometry of a feature document.
pub const GEOMETRY_FIELD: &str = "geom";

/// What to do when the request geometry cannot be turned into a filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryPolicy {
    /// Fail the request.
    #[default]
    Reject,
    /// Log the failure and run the query without a spatial filter.
    Ignore,
}

/// Options recognized by dataset operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Layer index appended to the dataset key (default 0).
    #[serde(default)]
    pub layer: Option<u32>,

    /// Free-form envelope, or polygon coordinates when `geometry_type` is `polygon`.
    #[serde(default)]
    pub geometry: Option<GeometryParam>,

    #[serde(default)]
    pub geometry_type: Option<String>,

    /// Type facet narrowing the `all` key.
    #[serde(default, rename = "type")]
    pub type_facet: Option<String>,

    /// Explicit result-size cap.
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default, rename = "enforce_limit")]
    pub enforce_limit: bool,

    #[serde(default)]
    pub bypass_processing: bool,

    #[serde(default)]
    pub geometry_policy: GeometryPolicy,
}

/// `field == value` selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchClause {
    pub field: String,
    pub value: String,
}

impl MatchClause {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

/// Aggregation attached to a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// Approximate distinct count of `field`.
    Cardinality { field: String, precision_threshold: usize },
    /// Per-value document counts of `field`, largest first.
    Terms { field: String, size: usize },
}

/// An engine-neutral search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub size: usize,
    pub query: Option<MatchClause>,
    pub filter: Option<Shape>,
    pub aggregation: Option<Aggregation>,
    /// Source fields to return; `None` returns the whole document.
    pub source_fields: Option<Vec<String>>,
    /// Scroll keep-alive; set to open a scroll cursor.
    pub scroll: Option<String>,
}

impl SearchRequest {
    /// Match-all request returning whole documents.
    pub fn new(size: usize) -> Self {
        Self { size, query: None, filter: None, aggregation: None, source_fields: None, scroll: None }
    }

    pub fn matching(mut self, clause: MatchClause) -> Self {
        self.query = Some(clause);
        self
    }

    /// The same query as a size-0 aggregation request.
    pub fn aggregate(&self, aggregation: Aggregation) -> Self {
        Self { size: 0, aggregation: Some(aggregation), scroll: None, ..self.clone() }
    }

    /// The same query as a scroll with the given page size.
    pub fn scrolling(&self, page_size: usize, keep_alive: &str) -> Self {
        Self { size: page_size, scroll: Some(keep_alive.to_string()), ..self.clone() }
    }

    /// Render the engine query DSL body.
    pub fn to_body(&self) -> Value {
        let must = match &self.query {
            Some(clause) => json!([{ "match": { clause.field.as_str(): clause.value } }]),
            None => json!([{ "match_all": {} }]),
        };

        let mut bool_query = Map::new();
        bool_query.insert("must".into(), must);
        if let Some(shape) = &self.filter {
            bool_query.insert(
                "filter".into(),
                json!([{ "geo_shape": { GEOMETRY_FIELD: { "shape": shape, "relation": "intersects" } } }]),
            );
        }

        let mut body = Map::new();
        body.insert("size".into(), json!(self.size));
        body.insert("track_total_hits".into(), json!(true));
        body.insert("query".into(), json!({ "bool": bool_query }));

        if let Some(fields) = &self.source_fields {
            body.insert("_source".into(), json!(fields));
        }

        match &self.aggregation {
            Some(Aggregation::Cardinality { field, precision_threshold }) => {
                body.insert(
                    "aggs".into(),
                    json!({ CARDINALITY_AGG: { "cardinality": { "field": field, "precision_threshold": precision_threshold } } }),
                );
            }
            Some(Aggregation::Terms { field, size }) => {
                body.insert("aggs".into(), json!({ TERMS_AGG: { "terms": { "field": field, "size": size } } }));
            }
            None => {}
        }

        Value::Object(body)
    }
}

/// Build the feature search for a table (or the `all` key) and its options.
///
/// Exactly one spatial filter path applies: a free-form geometry without a
/// `geometry_type` becomes a normalized envelope; `geometry_type == "polygon"`
/// takes the geometry as literal polygon coordinates.
pub fn build_query(
    table: &str, options: &QueryOptions, default_size: usize,
) -> Result<SearchRequest, GeometryError> {
    let mut request = SearchRequest::new(options.limit.unwrap_or(default_size));
    request.source_fields = Some(vec!["feature".to_string()]);

    if table != ALL_KEY {
        request.query = Some(MatchClause::new("itemid", dataset::sanitize(table)));
    } else if let Some(facet) = &options.type_facet {
        request.query = Some(MatchClause::new("type", facet.clone()));
    }

    let Some(geometry) = &options.geometry else {
        return Ok(request);
    };

    let filter = match options.geometry_type.as_deref() {
        None => geometry::create_extent(geometry),
        Some(kind) if kind.eq_ignore_ascii_case("polygon") => geometry::parse_polygon(geometry),
        Some(kind) => {
            tracing::warn!(geometry_type = kind, "unsupported geometry type, no spatial filter applied");
            return Ok(request);
        }
    };

    match (filter, options.geometry_policy) {
        (Ok(shape), _) => request.filter = Some(shape),
        (Err(err), GeometryPolicy::Reject) => return Err(err),
        (Err(err), GeometryPolicy::Ignore) => {
            tracing::warn!(table, error = %err, "ignoring unusable geometry, query runs unfiltered");
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with_geometry(geometry: &str) -> QueryOptions {
        QueryOptions { geometry: Some(geometry.into()), ..Default::default() }
    }

    #[test]
    fn test_default_size_and_match() {
        let request = build_query("test_0", &QueryOptions::default(), DEFAULT_SIZE).unwrap();
        assert_eq!(request.size, 10_000);
        assert_eq!(request.query, Some(MatchClause::new("itemid", "test_0")));
        assert!(request.filter.is_none());
    }

    #[test]
    fn test_limit_overrides_size() {
        let options = QueryOptions { limit: Some(25), ..Default::default() };
        let request = build_query("test_0", &options, DEFAULT_SIZE).unwrap();
        assert_eq!(request.size, 25);
    }

    #[test]
    fn test_colons_are_substituted() {
        let request = build_query("agol:abc:def_0", &QueryOptions::default(), DEFAULT_SIZE).unwrap();
        assert_eq!(request.query.unwrap().value, "agol_abc_def_0");
    }

    #[test]
    fn test_all_key_with_type() {
        let options = QueryOptions { type_facet: Some("agol".into()), ..Default::default() };
        let request = build_query(ALL_KEY, &options, DEFAULT_SIZE).unwrap();
        assert_eq!(request.query, Some(MatchClause::new("type", "agol")));

        let request = build_query(ALL_KEY, &QueryOptions::default(), DEFAULT_SIZE).unwrap();
        assert!(request.query.is_none());
    }

    #[test]
    fn test_bbox_becomes_envelope_filter() {
        let request = build_query("test_0", &options_with_geometry("-105.55,20.0,-7.12,60.73"), DEFAULT_SIZE).unwrap();
        assert_eq!(request.filter, Some(geometry::convert_extent([-105.55, 20.0, -7.12, 60.73])));
    }

    #[test]
    fn test_polygon_geometry_type() {
        let options = QueryOptions {
            geometry: Some("[[[0,0],[1,0],[1,1],[0,1],[0,0]]]".into()),
            geometry_type: Some("polygon".into()),
            ..Default::default()
        };
        let request = build_query("test_0", &options, DEFAULT_SIZE).unwrap();
        assert!(matches!(request.filter, Some(Shape::Polygon { .. })));
    }

    #[test]
    fn test_bbox_with_polygon_type_is_not_an_envelope() {
        let options = QueryOptions {
            geometry: Some("-105.55,20.0,-7.12,60.73".into()),
            geometry_type: Some("polygon".into()),
            ..Default::default()
        };
        assert!(build_query("test_0", &options, DEFAULT_SIZE).is_err());
    }

    #[test]
    fn test_unknown_geometry_type_skips_filter() {
        let options = QueryOptions {
            geometry: Some("-105.55,20.0,-7.12,60.73".into()),
            geometry_type: Some("esriGeometryPoint".into()),
            ..Default::default()
        };
        let request = build_query("test_0", &options, DEFAULT_SIZE).unwrap();
        assert!(request.filter.is_none());
    }

    #[test]
    fn test_geometry_policy() {
        let mut options = options_with_geometry("garbage");
        assert!(matches!(build_query("test_0", &options, DEFAULT_SIZE), Err(GeometryError::Unparseable(_))));

        options.geometry_policy = GeometryPolicy::Ignore;
        let request = build_query("test_0", &options, DEFAULT_SIZE).unwrap();
        assert!(request.filter.is_none());
        assert!(request.query.is_some());
    }

    #[test]
    fn test_body_rendering() {
        let request = build_query("test_0", &options_with_geometry("1,2,3,4"), DEFAULT_SIZE).unwrap();
        let body = request.to_body();
        assert_eq!(body["size"], 10_000);
        assert_eq!(body["_source"], json!(["feature"]));
        assert_eq!(body["query"]["bool"]["must"][0]["match"]["itemid"], "test_0");
        let shape = &body["query"]["bool"]["filter"][0]["geo_shape"]["geom"]["shape"];
        assert_eq!(shape["type"], "envelope");
        assert_eq!(shape["coordinates"], json!([[1.0, 4.0], [3.0, 2.0]]));
    }

    #[test]
    fn test_aggregation_rendering() {
        let base = build_query("test_0", &QueryOptions::default(), DEFAULT_SIZE).unwrap();

        let body = base
            .aggregate(Aggregation::Cardinality { field: "geohash5".into(), precision_threshold: 2000 })
            .to_body();
        assert_eq!(body["size"], 0);
        assert_eq!(body["aggs"]["count"]["cardinality"]["field"], "geohash5");
        assert_eq!(body["aggs"]["count"]["cardinality"]["precision_threshold"], 2000);

        let body = base.aggregate(Aggregation::Terms { field: "geohash4".into(), size: 100 }).to_body();
        assert_eq!(body["aggs"]["geohash"]["terms"]["field"], "geohash4");
        assert_eq!(body["aggs"]["geohash"]["terms"]["size"], 100);
    }

    #[test]
    fn test_match_all_rendering() {
        let body = SearchRequest::new(5).to_body();
        assert_eq!(body["query"]["bool"]["must"][0], json!({"match_all": {}}));
        assert!(body.get("_source").is_none());
        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn test_options_from_host_json() {
        let options: QueryOptions = serde_json::from_value(json!({
            "layer": 2,
            "geometry": {"xmin": 0, "ymin": 0, "xmax": 1, "ymax": 1},
            "geometryType": "polygon",
            "type": "agol",
            "limit": 10,
            "enforce_limit": true,
            "bypassProcessing": true
        }))
        .unwrap();
        assert_eq!(options.layer, Some(2));
        assert!(matches!(options.geometry, Some(GeometryParam::Object(_))));
        assert_eq!(options.geometry_type.as_deref(), Some("polygon"));
        assert_eq!(options.type_facet.as_deref(), Some("agol"));
        assert_eq!(options.limit, Some(10));
        assert!(options.enforce_limit);
        assert!(options.bypass_processing);
        assert_eq!(options.geometry_policy, GeometryPolicy::Reject);
    }
}
