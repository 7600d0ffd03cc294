//! Dataset operations: ingest, select, count, info and removal.

use serde_json::Value;

use super::GeoCache;
use super::bulk::prepare_batch;
use super::scroll::ScrollReader;
use crate::Error;
use crate::dataset::{self, ALL_KEY, Dataset, FeatureCollection, InfoRecord, Selection};
use crate::query::{self, QueryOptions, SearchRequest};
use crate::store::{BulkSummary, Collection, DocumentStore};

impl<S: DocumentStore> GeoCache<S> {
    /// Table addressed by `key` and the options' layer; `all` stays as is.
    pub(crate) fn resolve_table(&self, key: &str, options: &QueryOptions) -> String {
        if key == ALL_KEY { ALL_KEY.to_string() } else { dataset::table_name(key, options.layer.unwrap_or(0)) }
    }

    /// Replace the info record of `key`'s layer and index its features.
    pub async fn insert(&self, key: &str, layer: u32, dataset: &Dataset) -> Result<BulkSummary, Error> {
        let table = dataset::table_name(key, layer);
        let batch = prepare_batch(&table, dataset)?;
        tracing::debug!(table = %table, features = batch.features, tagged = batch.tagged, "inserting dataset");

        let summary = self.call("bulk", self.store.bulk(&batch.ops)).await?;
        if summary.failed > 0 {
            tracing::warn!(table = %table, failed = summary.failed, succeeded = summary.succeeded, "bulk insert had failures");
        }
        Ok(summary)
    }

    /// Select the features of `key` (or of every dataset for `all`).
    ///
    /// A missing info record is `NotFound`. A dataset still processing yields
    /// the processing marker unless `bypass_processing` is set. With
    /// `enforce_limit` and no explicit `limit`, a match count over the
    /// configured limit yields an `exceeds_limit` collection without features.
    pub async fn select(&self, key: &str, options: &QueryOptions) -> Result<Selection, Error> {
        let table = self.resolve_table(key, options);

        let info = if table == ALL_KEY { None } else { Some(self.get_info(&table).await?) };
        if info.as_ref().is_some_and(InfoRecord::is_processing) && !options.bypass_processing {
            tracing::debug!(table = %table, "dataset is processing");
            return Ok(Selection::processing());
        }

        let request = query::build_query(&table, options, self.config.default_size)?;

        if options.enforce_limit && options.limit.is_none() {
            let count = self.count_matches(&request).await?;
            if count > self.config.limit as u64 {
                tracing::debug!(table = %table, count, limit = self.config.limit, "select exceeds limit");
                return Ok(Selection::Collection(FeatureCollection::over_limit(count, info.as_ref())));
            }
        }

        let reader = ScrollReader::new(
            self.store.as_ref(),
            self.config.scroll_page_size,
            &self.config.scroll_keep_alive,
            self.config.request_timeout,
        );
        let outcome = reader.read_all(&request, options.limit).await?;
        Ok(Selection::Collection(FeatureCollection::new(outcome.features, info.as_ref())))
    }

    /// Number of features matching `key` and the options' filters.
    pub async fn get_count(&self, key: &str, options: &QueryOptions) -> Result<u64, Error> {
        let table = self.resolve_table(key, options);
        let request = query::build_query(&table, options, self.config.default_size)?;
        let count = self.count_matches(&request).await?;
        tracing::debug!(table = %table, count, "counted features");
        Ok(count)
    }

    async fn count_matches(&self, request: &SearchRequest) -> Result<u64, Error> {
        let counting = SearchRequest { size: 0, source_fields: None, ..request.clone() };
        Ok(self.call("search", self.store.search(Collection::Features, &counting)).await?.total)
    }

    /// Delete the info record and every feature of `table`.
    ///
    /// Returns the number of features removed.
    pub async fn remove(&self, table: &str) -> Result<u64, Error> {
        let table = dataset::sanitize(table);
        let existed = self.call("delete", self.store.delete(Collection::Info, &table)).await?;
        let removed = self
            .call("delete_by_query", self.store.delete_by_query(Collection::Features, "itemid", &table))
            .await?;
        tracing::debug!(table = %table, info_existed = existed, features = removed, "removed dataset");
        Ok(removed)
    }

    /// Info record of `table`.
    pub async fn get_info(&self, table: &str) -> Result<InfoRecord, Error> {
        let table = dataset::sanitize(table);
        let source = self
            .call("get", self.store.get(Collection::Info, &table))
            .await?
            .ok_or_else(|| Error::NotFound(table.clone()))?;
        Ok(serde_json::from_value(source)?)
    }

    /// Merge `info` into the existing record of `table`.
    ///
    /// Unset optional fields keep their stored values; `status` is always
    /// written and defaults to `""`.
    pub async fn update_info(&self, table: &str, info: &InfoRecord) -> Result<(), Error> {
        let table = dataset::sanitize(table);
        let patch: Value = serde_json::to_value(info)?;
        self.call("update", self.store.update(Collection::Info, &table, &patch)).await?;
        tracing::debug!(table = %table, status = %info.status, "updated info");
        Ok(())
    }
}
