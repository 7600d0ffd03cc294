//! Dataset commands: bootstrap, insert, select, count, info, remove.

use anyhow::{Context, Result};
use geojson::GeoJson;
use serde_json::{Value, json};

use geocache_core::{Dataset, DocumentStore, GeoCache, QueryOptions};

pub async fn bootstrap_impl<S: DocumentStore>(cache: &GeoCache<S>) -> Value {
    cache.bootstrap().await;
    json!({ "index": cache.config().index_name, "bootstrapped": true })
}

/// Load a GeoJSON document as `key`'s `layer`.
///
/// The text must be a GeoJSON `FeatureCollection`; metadata members next to
/// `features` (name, sha, timestamps, info) go to the info record.
pub async fn insert_impl<S: DocumentStore>(cache: &GeoCache<S>, key: &str, layer: u32, text: &str) -> Result<Value> {
    match text.parse::<GeoJson>().context("input is not GeoJSON")? {
        GeoJson::FeatureCollection(_) => {}
        _ => anyhow::bail!("input must be a FeatureCollection"),
    }
    let dataset = Dataset::from_json_value(serde_json::from_str(text)?).context("invalid dataset metadata")?;
    let features = dataset.features.len();

    let summary = cache.insert(key, layer, &dataset).await?;
    tracing::info!(key, layer, features, failed = summary.failed, "dataset inserted");
    Ok(json!({ "key": key, "layer": layer, "features": features, "succeeded": summary.succeeded, "failed": summary.failed }))
}

pub async fn select_impl<S: DocumentStore>(cache: &GeoCache<S>, key: &str, options: &QueryOptions) -> Result<Value> {
    Ok(serde_json::to_value(cache.select(key, options).await?)?)
}

pub async fn count_impl<S: DocumentStore>(cache: &GeoCache<S>, key: &str, options: &QueryOptions) -> Result<Value> {
    Ok(json!({ "count": cache.get_count(key, options).await? }))
}

pub async fn info_impl<S: DocumentStore>(cache: &GeoCache<S>, table: &str) -> Result<Value> {
    Ok(serde_json::to_value(cache.get_info(table).await?)?)
}

pub async fn remove_impl<S: DocumentStore>(cache: &GeoCache<S>, table: &str) -> Result<Value> {
    Ok(json!({ "table": table, "removed": cache.remove(table).await? }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;

    #[tokio::test]
    async fn test_insert_and_select() {
        let cache = fixtures::cache();
        let inserted = insert_impl(&cache, "test", 0, fixtures::POINTS).await.unwrap();
        assert_eq!(inserted["features"], 3);
        assert_eq!(inserted["failed"], 0);

        let selected = select_impl(&cache, "test", &QueryOptions::default()).await.unwrap();
        assert_eq!(selected["type"], "FeatureCollection");
        assert_eq!(selected["name"], "points.geojson");
        assert_eq!(selected["features"].as_array().unwrap().len(), 3);

        let bbox = QueryOptions { geometry: Some("-106,39,-104,41".into()), ..Default::default() };
        assert_eq!(count_impl(&cache, "test", &bbox).await.unwrap(), json!({"count": 2}));
    }

    #[tokio::test]
    async fn test_insert_rejects_non_collections() {
        let cache = fixtures::cache();
        let point = r#"{"type": "Point", "coordinates": [0, 0]}"#;
        assert!(insert_impl(&cache, "test", 0, point).await.is_err());
        assert!(insert_impl(&cache, "test", 0, "not json").await.is_err());
    }

    #[tokio::test]
    async fn test_info_and_remove() {
        let cache = fixtures::cache();
        insert_impl(&cache, "test", 0, fixtures::POINTS).await.unwrap();

        let info = info_impl(&cache, "test_0").await.unwrap();
        assert_eq!(info["name"], "points.geojson");

        let removed = remove_impl(&cache, "test_0").await.unwrap();
        assert_eq!(removed["removed"], 3);
        assert!(info_impl(&cache, "test_0").await.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap() {
        let cache = fixtures::cache();
        assert_eq!(bootstrap_impl(&cache).await["bootstrapped"], true);
    }
}
