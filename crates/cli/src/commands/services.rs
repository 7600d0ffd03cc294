//! Service registry commands.

use anyhow::Result;
use serde_json::{Value, json};

use geocache_core::{DocumentStore, GeoCache};

pub async fn register_impl<S: DocumentStore>(
    cache: &GeoCache<S>, service_type: &str, id: &str, host: &str,
) -> Result<Value> {
    Ok(serde_json::to_value(cache.service_register(service_type, id, host).await?)?)
}

pub async fn count_impl<S: DocumentStore>(cache: &GeoCache<S>, service_type: &str) -> Result<Value> {
    Ok(json!({ "type": service_type, "count": cache.service_count(service_type).await? }))
}

pub async fn remove_impl<S: DocumentStore>(cache: &GeoCache<S>, service_type: &str, id: &str) -> Result<Value> {
    Ok(json!({ "type": service_type, "id": id, "removed": cache.service_remove(service_type, id).await? }))
}

pub async fn get_impl<S: DocumentStore>(cache: &GeoCache<S>, service_type: &str, id: Option<&str>) -> Result<Value> {
    let registrations = cache.service_get(service_type, id).await?;
    match (id, registrations.as_slice()) {
        (Some(_), [single]) => Ok(serde_json::to_value(single)?),
        _ => Ok(serde_json::to_value(&registrations)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;

    #[tokio::test]
    async fn test_service_commands() {
        let cache = fixtures::cache();
        let registered = register_impl(&cache, "featureserver", "a", "10.0.0.1").await.unwrap();
        assert_eq!(registered, json!({"type": "featureserver", "id": "a", "host": "10.0.0.1"}));

        assert_eq!(count_impl(&cache, "featureserver").await.unwrap()["count"], 1);
        assert_eq!(get_impl(&cache, "featureserver", Some("a")).await.unwrap()["host"], "10.0.0.1");
        assert_eq!(get_impl(&cache, "featureserver", None).await.unwrap().as_array().unwrap().len(), 1);

        assert_eq!(remove_impl(&cache, "featureserver", "a").await.unwrap()["removed"], 1);
        assert!(get_impl(&cache, "featureserver", Some("a")).await.is_err());
    }
}
