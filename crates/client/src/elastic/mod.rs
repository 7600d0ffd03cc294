//! Elasticsearch REST client.
//!
//! Implements [`DocumentStore`] over the engine's REST API.
//!
//! ### Endpoints
//!
//! - Documents: `GET /<index>/_doc/<id>`, `PUT /<index>/_create/<id>`,
//!   `POST /<index>/_update/<id>`, `DELETE /<index>/_doc/<id>`
//! - Writes: `POST /_bulk` (NDJSON), `POST /<index>/_delete_by_query`
//! - Reads: `POST /<index>/_search[?scroll=<keep-alive>]`, `POST /_search/scroll`,
//!   `DELETE /_search/scroll`
//! - Schema: `HEAD /<index>`, `PUT /<index>`, `PUT /<index>/_mapping`
//!
//! Each collection lives in its own index, `<index_name>-<collection>`.
//! Writes ask for `refresh=wait_for` so a select right after an ingest sees it.

pub mod error;
pub mod request;
pub mod response;

pub use error::ElasticError;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde_json::Value;
use url::Url;

use geocache_core::config::AppConfig;
use geocache_core::query::SearchRequest;
use geocache_core::Error;
use geocache_core::store::{BulkOp, BulkSummary, Collection, DocumentStore, SearchResponse};

use request::{ClearScrollBody, ScrollBody};
use response::{BulkResponse, DeleteByQueryResponse, GetResponse, RawSearchResponse};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "geocache/0.1";

const NDJSON: &str = "application/x-ndjson";

/// Elasticsearch client configuration.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Engine base URL (default: http://localhost:9200).
    pub base_url: String,
    /// Prefix of the collection indices (default: koop).
    pub index_name: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            index_name: "koop".to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&AppConfig> for ElasticConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.es_url.clone(),
            index_name: config.index_name.clone(),
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Elasticsearch client.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base: Url,
    config: ElasticConfig,
}

/// A completed request: status and body.
struct Reply {
    status: StatusCode,
    body: Bytes,
}

impl Reply {
    fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ElasticError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Fail on any non-success status.
    fn ok(self) -> Result<Self, ElasticError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ElasticError::HttpError { status: self.status.as_u16(), reason: error::error_reason(&self.body) })
        }
    }
}

impl ElasticClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ElasticConfig) -> Result<Self, ElasticError> {
        let base = Url::parse(&config.base_url).map_err(|e| ElasticError::InvalidUrl(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ElasticError::InvalidUrl(config.base_url.clone()));
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()?;

        Ok(Self { http, base, config })
    }

    /// Create a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ElasticError> {
        Self::new(ElasticConfig::from(config))
    }

    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    /// Index holding `collection`.
    pub fn index(&self, collection: Collection) -> String {
        collection.index_name(&self.config.index_name)
    }

    /// URL of `segments` below the base URL, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ElasticError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ElasticError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Reply, ElasticError> {
        let response = builder.header(header::ACCEPT, "application/json").send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "elasticsearch response");
        Ok(Reply { status, body })
    }

    async fn send_json(&self, method: Method, url: Url, body: &impl serde::Serialize) -> Result<Reply, ElasticError> {
        tracing::debug!(method = %method, url = %url, "elasticsearch request");
        self.send(self.http.request(method, url).json(body)).await
    }
}

#[async_trait]
impl DocumentStore for ElasticClient {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, Error> {
        let url = self.endpoint(&[&self.index(collection), "_doc", id])?;
        let reply = self.send(self.http.get(url)).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(reply.ok()?.json::<GetResponse>()?.into_source())
    }

    async fn create(&self, collection: Collection, id: &str, body: &Value) -> Result<(), Error> {
        let mut url = self.endpoint(&[&self.index(collection), "_create", id])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");
        let reply = self.send_json(Method::PUT, url, body).await?;
        if reply.status == StatusCode::CONFLICT {
            return Err(ElasticError::Conflict(format!("{}/{id}", self.index(collection))).into());
        }
        reply.ok()?;
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, patch: &Value) -> Result<(), Error> {
        let mut url = self.endpoint(&[&self.index(collection), "_update", id])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");
        let reply = self.send_json(Method::POST, url, &request::update_body(patch)).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Err(ElasticError::NotFound(format!("{}/{id}", self.index(collection))).into());
        }
        reply.ok()?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, Error> {
        let mut url = self.endpoint(&[&self.index(collection), "_doc", id])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");
        let reply = self.send(self.http.delete(url)).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        reply.ok()?;
        Ok(true)
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<BulkSummary, Error> {
        if ops.is_empty() {
            return Ok(BulkSummary::default());
        }
        let body = request::encode_bulk(ops, &self.config.index_name)?;
        let mut url = self.endpoint(&["_bulk"])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");

        tracing::debug!(ops = ops.len(), bytes = body.len(), "bulk request");
        let reply = self
            .send(self.http.post(url).header(header::CONTENT_TYPE, NDJSON).body(body))
            .await?
            .ok()?;
        Ok(reply.json::<BulkResponse>()?.summary())
    }

    async fn search(&self, collection: Collection, request: &SearchRequest) -> Result<SearchResponse, Error> {
        let mut url = self.endpoint(&[&self.index(collection), "_search"])?;
        if let Some(keep_alive) = &request.scroll {
            url.query_pairs_mut().append_pair("scroll", keep_alive);
        }
        let reply = self.send_json(Method::POST, url, &request.to_body()).await?.ok()?;
        Ok(reply.json::<RawSearchResponse>()?.into())
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse, Error> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let body = ScrollBody { scroll: keep_alive, scroll_id };
        let reply = self.send_json(Method::POST, url, &body).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Err(ElasticError::NotFound(format!("scroll {scroll_id}")).into());
        }
        Ok(reply.ok()?.json::<RawSearchResponse>()?.into())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let reply = self.send_json(Method::DELETE, url, &ClearScrollBody { scroll_id }).await?;
        if reply.status != StatusCode::NOT_FOUND {
            reply.ok()?;
        }
        Ok(())
    }

    async fn delete_by_query(&self, collection: Collection, field: &str, value: &str) -> Result<u64, Error> {
        let mut url = self.endpoint(&[&self.index(collection), "_delete_by_query"])?;
        url.query_pairs_mut().append_pair("refresh", "true").append_pair("conflicts", "proceed");
        let reply = self
            .send_json(Method::POST, url, &request::delete_by_query_body(field, value))
            .await?
            .ok()?;
        Ok(reply.json::<DeleteByQueryResponse>()?.deleted)
    }

    async fn ensure_collection(&self, collection: Collection) -> Result<(), Error> {
        let index = self.index(collection);
        let url = self.endpoint(&[&index])?;
        let head = self.send(self.http.head(url.clone())).await?;
        if head.status.is_success() {
            return Ok(());
        }
        if head.status != StatusCode::NOT_FOUND {
            head.ok()?;
        }
        tracing::debug!(index = %index, "creating index");
        self.send(self.http.put(url)).await?.ok()?;
        Ok(())
    }

    async fn put_mapping(&self, collection: Collection, mapping: &Value) -> Result<(), Error> {
        let url = self.endpoint(&[&self.index(collection), "_mapping"])?;
        self.send_json(Method::PUT, url, mapping).await?.ok()?;
        Ok(())
    }
}
