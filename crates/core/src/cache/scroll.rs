//! Full-result retrieval over a scroll cursor.

use std::time::Duration;

use serde_json::Value;

use crate::Error;
use crate::query::SearchRequest;
use crate::store::{Collection, DocumentStore, Hit, with_deadline};

/// Features read by one scroll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollOutcome {
    pub features: Vec<Value>,
    /// Hits whose `feature` payload could not be decoded.
    pub parse_failures: usize,
    /// Total matches reported by the store.
    pub total: u64,
}

impl ScrollOutcome {
    fn consumed(&self) -> u64 {
        (self.features.len() + self.parse_failures) as u64
    }

    fn absorb(&mut self, hits: Vec<Hit>) {
        for hit in hits {
            match decode_feature(&hit) {
                Some(feature) => self.features.push(feature),
                None => {
                    tracing::error!(id = %hit.id, "failed to parse stored feature");
                    self.parse_failures += 1;
                }
            }
        }
    }
}

fn decode_feature(hit: &Hit) -> Option<Value> {
    let text = hit.source.get("feature")?.as_str()?;
    serde_json::from_str(text).ok()
}

/// Reads every feature matching a search, page by page.
#[derive(Debug)]
pub struct ScrollReader<'a, S> {
    store: &'a S,
    page_size: usize,
    keep_alive: &'a str,
    timeout: Duration,
}

impl<'a, S: DocumentStore> ScrollReader<'a, S> {
    pub fn new(store: &'a S, page_size: usize, keep_alive: &'a str, timeout: Duration) -> Self {
        Self { store, page_size: page_size.max(1), keep_alive, timeout }
    }

    /// Read all features matching `request`, or at most `cap` of them.
    ///
    /// Pages are fetched until decoded plus failed hits reach the total (or
    /// the cap). An empty page before that point ends the read with a warning.
    /// The scroll context is released afterwards; failing to release it is
    /// only logged.
    pub async fn read_all(&self, request: &SearchRequest, cap: Option<usize>) -> Result<ScrollOutcome, Error> {
        let page_size = cap.map_or(self.page_size, |cap| cap.clamp(1, self.page_size));
        let scroll = request.scrolling(page_size, self.keep_alive);

        let first = with_deadline(self.timeout, "search", self.store.search(Collection::Features, &scroll)).await?;
        let mut outcome = ScrollOutcome { total: first.total, ..Default::default() };
        let target = cap.map_or(first.total, |cap| first.total.min(cap as u64));
        let mut scroll_id = first.scroll_id;
        outcome.absorb(first.hits);

        while outcome.consumed() < target {
            let Some(id) = scroll_id.clone() else {
                tracing::warn!(read = outcome.consumed(), total = outcome.total, "store returned no scroll cursor");
                break;
            };
            let page = with_deadline(self.timeout, "scroll", self.store.scroll(&id, self.keep_alive)).await?;
            if page.hits.is_empty() {
                tracing::warn!(
                    read = outcome.consumed(),
                    total = outcome.total,
                    "scroll ended before reaching the reported total"
                );
                break;
            }
            outcome.absorb(page.hits);
            scroll_id = page.scroll_id.or(Some(id));
        }

        if let Some(id) = scroll_id {
            if let Err(err) = with_deadline(self.timeout, "clear_scroll", self.store.clear_scroll(&id)).await {
                tracing::warn!(error = %err, "failed to clear scroll");
            }
        }

        if let Some(cap) = cap {
            outcome.features.truncate(cap);
        }
        if outcome.parse_failures > 0 {
            tracing::error!(failures = outcome.parse_failures, total = outcome.total, "some features could not be parsed");
        }
        tracing::debug!(features = outcome.features.len(), total = outcome.total, "scroll complete");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fixtures;
    use crate::query::MatchClause;
    use crate::store::{BulkOp, MemoryStore};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn store_with(docs: Vec<Value>) -> MemoryStore {
        let store = MemoryStore::new();
        let ops: Vec<BulkOp> = docs
            .into_iter()
            .map(|doc| BulkOp::Index { collection: Collection::Features, doc })
            .collect();
        store.bulk(&ops).await.unwrap();
        store
    }

    fn doc(feature: &Value) -> Value {
        json!({ "itemid": "test_0", "type": "test", "feature": feature.to_string() })
    }

    fn request() -> SearchRequest {
        let mut request = SearchRequest::new(10_000).matching(MatchClause::new("itemid", "test_0"));
        request.source_fields = Some(vec!["feature".into()]);
        request
    }

    #[tokio::test]
    async fn test_reads_every_page() {
        let features = fixtures::grid(23, 0.0, 0.0);
        let store = store_with(features.iter().map(doc).collect()).await;

        let outcome = ScrollReader::new(&store, 5, "30s", TIMEOUT).read_all(&request(), None).await.unwrap();
        assert_eq!(outcome.total, 23);
        assert_eq!(outcome.features, features);
        assert_eq!(outcome.parse_failures, 0);
        assert_eq!(store.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_page_size_does_not_change_result() {
        let features = fixtures::grid(37, 10.0, 10.0);
        let store = store_with(features.iter().map(doc).collect()).await;

        let mut results = Vec::new();
        for page_size in [1, 7, 36, 37, 500] {
            let outcome = ScrollReader::new(&store, page_size, "30s", TIMEOUT).read_all(&request(), None).await.unwrap();
            results.push(outcome.features);
        }
        assert!(results.iter().all(|r| *r == features));
    }

    #[tokio::test]
    async fn test_parse_failures_are_counted() {
        let mut docs: Vec<Value> = fixtures::grid(4, 0.0, 0.0).iter().map(doc).collect();
        docs.push(json!({ "itemid": "test_0", "type": "test", "feature": "{not json" }));
        docs.push(json!({ "itemid": "test_0", "type": "test" }));
        let store = store_with(docs).await;

        let outcome = ScrollReader::new(&store, 2, "30s", TIMEOUT).read_all(&request(), None).await.unwrap();
        assert_eq!(outcome.features.len(), 4);
        assert_eq!(outcome.parse_failures, 2);
        assert_eq!(outcome.total, 6);
    }

    #[tokio::test]
    async fn test_zero_results() {
        let store = MemoryStore::new();
        let outcome = ScrollReader::new(&store, 10, "30s", TIMEOUT).read_all(&request(), None).await.unwrap();
        assert_eq!(outcome, ScrollOutcome::default());
        assert_eq!(store.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_cap_limits_features() {
        let store = store_with(fixtures::grid(30, 0.0, 0.0).iter().map(doc).collect()).await;
        let outcome = ScrollReader::new(&store, 4, "30s", TIMEOUT).read_all(&request(), Some(9)).await.unwrap();
        assert_eq!(outcome.features.len(), 9);
        assert_eq!(outcome.total, 30);
    }
}
