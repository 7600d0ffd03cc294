//! In-process document store.
//!
//! Evaluates the same requests the engine receives: match clauses, envelope
//! and polygon intersection on `geom`, cardinality and terms aggregations, and
//! scroll cursors. Documents are kept in id order so results are stable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use geo::Intersects;
use serde_json::{Map, Value, json};

use super::{BulkOp, BulkSummary, Collection, DocumentStore, Hit, SearchResponse};
use crate::Error;
use crate::query::{Aggregation, CARDINALITY_AGG, GEOMETRY_FIELD, MatchClause, SearchRequest, TERMS_AGG};

#[derive(Debug, Default)]
struct State {
    docs: HashMap<Collection, BTreeMap<String, Value>>,
    mappings: HashMap<Collection, Value>,
    scrolls: HashMap<String, Cursor>,
    next_id: u64,
}

#[derive(Debug)]
struct Cursor {
    remaining: Vec<Hit>,
    page_size: usize,
    total: u64,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:012}", self.next_id)
    }

    fn collection(&mut self, collection: Collection) -> &mut BTreeMap<String, Value> {
        self.docs.entry(collection).or_default()
    }
}

/// Document store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that sleeps before answering each call.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.lock().docs.get(&collection).map_or(0, BTreeMap::len)
    }

    /// Mapping last declared for a collection.
    pub fn mapping(&self, collection: Collection) -> Option<Value> {
        self.lock().mappings.get(&collection).cloned()
    }

    /// Number of scroll contexts not yet cleared.
    pub fn open_scrolls(&self) -> usize {
        self.lock().scrolls.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn field_matches(doc: &Value, clause: &MatchClause) -> bool {
    match doc.get(&clause.field) {
        Some(Value::String(s)) => *s == clause.value,
        Some(Value::Number(n)) => n.to_string() == clause.value,
        Some(Value::Bool(b)) => b.to_string() == clause.value,
        _ => false,
    }
}

fn shape_matches(doc: &Value, filter: &geo::Geometry<f64>) -> bool {
    let Some(geom) = doc.get(GEOMETRY_FIELD) else {
        return false;
    };
    let Ok(geometry) = serde_json::from_value::<geojson::Geometry>(geom.clone()) else {
        return false;
    };
    geo::Geometry::<f64>::try_from(geometry.value).is_ok_and(|g| g.intersects(filter))
}

fn project(doc: &Value, fields: Option<&[String]>) -> Value {
    match fields {
        None => doc.clone(),
        Some(fields) => {
            let projected: Map<String, Value> = fields
                .iter()
                .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
                .collect();
            Value::Object(projected)
        }
    }
}

fn aggregate(aggregation: &Aggregation, docs: &[&Value]) -> Value {
    match aggregation {
        Aggregation::Cardinality { field, .. } => {
            let distinct: HashSet<&str> = docs.iter().filter_map(|d| d.get(field).and_then(Value::as_str)).collect();
            json!({ CARDINALITY_AGG: { "value": distinct.len() } })
        }
        Aggregation::Terms { field, size } => {
            let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
            for value in docs.iter().filter_map(|d| d.get(field).and_then(Value::as_str)) {
                *counts.entry(value).or_default() += 1;
            }
            let mut buckets: Vec<(&str, u64)> = counts.into_iter().collect();
            buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let other: u64 = buckets.iter().skip(*size).map(|(_, c)| c).sum();
            let buckets: Vec<Value> = buckets
                .into_iter()
                .take(*size)
                .map(|(key, count)| json!({ "key": key, "doc_count": count }))
                .collect();
            json!({ TERMS_AGG: { "doc_count_error_upper_bound": 0, "sum_other_doc_count": other, "buckets": buckets } })
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, Error> {
        self.delay().await;
        Ok(self.lock().docs.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn create(&self, collection: Collection, id: &str, body: &Value) -> Result<(), Error> {
        self.delay().await;
        let mut state = self.lock();
        let docs = state.collection(collection);
        if docs.contains_key(id) {
            return Err(Error::Upstream(format!("document {id} already exists in {}", collection.suffix())));
        }
        docs.insert(id.to_string(), body.clone());
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, patch: &Value) -> Result<(), Error> {
        self.delay().await;
        let mut state = self.lock();
        let doc = state
            .collection(collection)
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        match (doc, patch) {
            (Value::Object(target), Value::Object(fields)) => {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(Error::InvalidInput("update patch must be an object".into())),
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, Error> {
        self.delay().await;
        Ok(self.lock().collection(collection).remove(id).is_some())
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkSummary, Error> {
        self.delay().await;
        let mut state = self.lock();
        let mut summary = BulkSummary::default();
        for op in ops {
            match op {
                BulkOp::Delete { collection, id } => {
                    state.collection(*collection).remove(id);
                    summary.succeeded += 1;
                }
                BulkOp::Create { collection, id, doc } => {
                    let docs = state.collection(*collection);
                    if docs.contains_key(id) {
                        summary.failed += 1;
                    } else {
                        docs.insert(id.clone(), doc.clone());
                        summary.succeeded += 1;
                    }
                }
                BulkOp::Index { collection, doc } => {
                    let id = state.next_id();
                    state.collection(*collection).insert(id, doc.clone());
                    summary.succeeded += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn search(&self, collection: Collection, request: &SearchRequest) -> Result<SearchResponse, Error> {
        self.delay().await;
        let filter = request.filter.as_ref().map(|shape| shape.to_geo());
        let mut state = self.lock();

        let matching: Vec<(&String, &Value)> = state
            .docs
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| request.query.as_ref().is_none_or(|clause| field_matches(doc, clause)))
                    .filter(|(_, doc)| filter.as_ref().is_none_or(|shape| shape_matches(doc, shape)))
                    .collect()
            })
            .unwrap_or_default();

        let total = matching.len() as u64;
        let aggregations = request.aggregation.as_ref().map(|agg| {
            let docs: Vec<&Value> = matching.iter().map(|(_, doc)| *doc).collect();
            aggregate(agg, &docs)
        });
        let mut hits: Vec<Hit> = matching
            .iter()
            .map(|(id, doc)| Hit { id: (*id).clone(), source: project(doc, request.source_fields.as_deref()) })
            .collect();

        if request.scroll.is_none() {
            hits.truncate(request.size);
            return Ok(SearchResponse { scroll_id: None, total, hits, aggregations });
        }

        let page_size = request.size.max(1);
        let remaining = hits.split_off(page_size.min(hits.len()));
        let scroll_id = format!("scroll-{}", state.next_id());
        state.scrolls.insert(scroll_id.clone(), Cursor { remaining, page_size, total });
        Ok(SearchResponse { scroll_id: Some(scroll_id), total, hits, aggregations })
    }

    async fn scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<SearchResponse, Error> {
        self.delay().await;
        let mut state = self.lock();
        let cursor = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| Error::NotFound(format!("scroll {scroll_id}")))?;
        let rest = cursor.remaining.split_off(cursor.page_size.min(cursor.remaining.len()));
        let hits = std::mem::replace(&mut cursor.remaining, rest);
        Ok(SearchResponse { scroll_id: Some(scroll_id.to_string()), total: cursor.total, hits, aggregations: None })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), Error> {
        self.delay().await;
        self.lock().scrolls.remove(scroll_id);
        Ok(())
    }

    async fn delete_by_query(&self, collection: Collection, field: &str, value: &str) -> Result<u64, Error> {
        self.delay().await;
        let clause = MatchClause::new(field, value);
        let mut state = self.lock();
        let docs = state.collection(collection);
        let before = docs.len();
        docs.retain(|_, doc| !field_matches(doc, &clause));
        Ok((before - docs.len()) as u64)
    }

    async fn ensure_collection(&self, collection: Collection) -> Result<(), Error> {
        self.delay().await;
        self.lock().collection(collection);
        Ok(())
    }

    async fn put_mapping(&self, collection: Collection, mapping: &Value) -> Result<(), Error> {
        self.delay().await;
        self.lock().mappings.insert(collection, mapping.clone());
        Ok(())
    }
}
