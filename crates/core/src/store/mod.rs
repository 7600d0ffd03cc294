//! Document store abstraction.
//!
//! The cache talks to its search engine only through [`DocumentStore`]. Two
//! implementations exist: the REST client in `geocache-client` and the
//! in-process [`MemoryStore`] used by tests and tooling.

pub mod memory;
pub mod schema;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Error;
use crate::query::SearchRequest;

pub use memory::MemoryStore;

/// Logical collections kept by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Info,
    Features,
    Services,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Info, Collection::Features, Collection::Services];

    pub fn suffix(&self) -> &'static str {
        match self {
            Collection::Info => "info",
            Collection::Features => "features",
            Collection::Services => "services",
        }
    }

    /// Engine index holding this collection: `<prefix>-<suffix>`.
    pub fn index_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.suffix())
    }
}

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    /// Delete a document; a missing document is not a failure.
    Delete { collection: Collection, id: String },
    /// Insert a document under a fixed id.
    Create { collection: Collection, id: String, doc: Value },
    /// Insert a document, letting the store assign the id.
    Index { collection: Collection, doc: Value },
}

impl BulkOp {
    pub fn collection(&self) -> Collection {
        match self {
            BulkOp::Delete { collection, .. } | BulkOp::Create { collection, .. } | BulkOp::Index { collection, .. } => {
                *collection
            }
        }
    }
}

/// Per-item outcome counts of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// One matching document.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

/// A search result page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Cursor for the next page, when the search opened a scroll.
    pub scroll_id: Option<String>,
    /// Total matching documents, across all pages.
    pub total: u64,
    pub hits: Vec<Hit>,
    /// Raw aggregation results keyed by aggregation name.
    pub aggregations: Option<Value>,
}

/// Operations the cache needs from its search engine.
#[async_trait]
pub trait DocumentStore: std::fmt::Debug + Send + Sync {
    /// Fetch a document source by id.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, Error>;

    /// Insert a document under `id`; fails if it already exists.
    async fn create(&self, collection: Collection, id: &str, body: &Value) -> Result<(), Error>;

    /// Merge `patch` into an existing document. `NotFound` if absent.
    async fn update(&self, collection: Collection, id: &str, patch: &Value) -> Result<(), Error>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, Error>;

    /// Apply a batch of writes in order.
    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkSummary, Error>;

    /// Run a search, opening a scroll when `request.scroll` is set.
    async fn search(&self, collection: Collection, request: &SearchRequest) -> Result<SearchResponse, Error>;

    /// Fetch the next page of an open scroll.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse, Error>;

    /// Release a scroll context.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), Error>;

    /// Delete every document whose `field` equals `value`. Returns the count.
    async fn delete_by_query(&self, collection: Collection, field: &str, value: &str) -> Result<u64, Error>;

    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, collection: Collection) -> Result<(), Error>;

    /// Declare field types for a collection.
    async fn put_mapping(&self, collection: Collection, mapping: &Value) -> Result<(), Error>;
}

/// Run a store call under a deadline.
pub async fn with_deadline<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::Timeout(format!("{operation} did not complete within {}ms", timeout.as_millis())))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        assert_eq!(Collection::Info.index_name("koop"), "koop-info");
        assert_eq!(Collection::Features.index_name("koop"), "koop-features");
        assert_eq!(Collection::Services.index_name("koop-tester"), "koop-tester-services");
    }

    #[test]
    fn test_bulk_op_collection() {
        let op = BulkOp::Delete { collection: Collection::Info, id: "a".into() };
        assert_eq!(op.collection(), Collection::Info);
        let op = BulkOp::Index { collection: Collection::Features, doc: Value::Null };
        assert_eq!(op.collection(), Collection::Features);
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), "get", async { Ok::<_, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let result = with_deadline(Duration::from_millis(10), "search", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(msg)) if msg.contains("search")));
    }
}
