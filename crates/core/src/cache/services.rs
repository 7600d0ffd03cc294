//! Registry of live service instances.

use super::GeoCache;
use crate::Error;
use crate::dataset::ServiceRegistration;
use crate::query::{MatchClause, SearchRequest};
use crate::store::{BulkOp, Collection, DocumentStore};

impl<S: DocumentStore> GeoCache<S> {
    /// Register `host` as instance `id` of `service_type`.
    ///
    /// Registering an existing id replaces it.
    pub async fn service_register(&self, service_type: &str, id: &str, host: &str) -> Result<ServiceRegistration, Error> {
        let registration =
            ServiceRegistration { service_type: service_type.to_string(), id: id.to_string(), host: host.to_string() };
        let ops = [
            BulkOp::Delete { collection: Collection::Services, id: id.to_string() },
            BulkOp::Create { collection: Collection::Services, id: id.to_string(), doc: serde_json::to_value(&registration)? },
        ];
        let summary = self.call("bulk", self.store.bulk(&ops)).await?;
        if summary.failed > 0 {
            return Err(Error::Upstream(format!("failed to register service {id}")));
        }
        tracing::debug!(service_type, id, host, "registered service");
        Ok(registration)
    }

    /// Number of registered instances of `service_type`.
    pub async fn service_count(&self, service_type: &str) -> Result<u64, Error> {
        let request = SearchRequest::new(0).matching(MatchClause::new("type", service_type));
        Ok(self.call("search", self.store.search(Collection::Services, &request)).await?.total)
    }

    /// Remove instance `id` of `service_type`. Returns the number removed.
    pub async fn service_remove(&self, service_type: &str, id: &str) -> Result<u64, Error> {
        match self.lookup_service(service_type, id).await? {
            Some(_) => {
                let removed = self
                    .call("delete_by_query", self.store.delete_by_query(Collection::Services, "id", id))
                    .await?;
                tracing::debug!(service_type, id, "removed service");
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// Instance `id` of `service_type`, or every instance when `id` is `None`.
    ///
    /// A missing `id` is `NotFound`.
    pub async fn service_get(&self, service_type: &str, id: Option<&str>) -> Result<Vec<ServiceRegistration>, Error> {
        if let Some(id) = id {
            return self
                .lookup_service(service_type, id)
                .await?
                .map(|registration| vec![registration])
                .ok_or_else(|| Error::NotFound(format!("{service_type}/{id}")));
        }

        let request = SearchRequest::new(self.config.default_size).matching(MatchClause::new("type", service_type));
        let response = self.call("search", self.store.search(Collection::Services, &request)).await?;
        response
            .hits
            .into_iter()
            .map(|hit| serde_json::from_value(hit.source).map_err(Error::from))
            .collect()
    }

    async fn lookup_service(&self, service_type: &str, id: &str) -> Result<Option<ServiceRegistration>, Error> {
        let Some(source) = self.call("get", self.store.get(Collection::Services, id)).await? else {
            return Ok(None);
        };
        let registration: ServiceRegistration = serde_json::from_value(source)?;
        Ok((registration.service_type == service_type).then_some(registration))
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::fixtures;

    #[tokio::test]
    async fn test_register_and_list() {
        let cache = fixtures::cache();
        cache.service_register("featureserver", "a", "10.0.0.1").await.unwrap();
        cache.service_register("featureserver", "b", "10.0.0.2").await.unwrap();
        cache.service_register("tiles", "c", "10.0.0.3").await.unwrap();

        assert_eq!(cache.service_count("featureserver").await.unwrap(), 2);
        let listed = cache.service_get("featureserver", None).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_get_single() {
        let cache = fixtures::cache();
        cache.service_register("featureserver", "a", "10.0.0.1").await.unwrap();

        let found = cache.service_get("featureserver", Some("a")).await.unwrap();
        assert_eq!(found[0].host, "10.0.0.1");
        assert!(cache.service_get("featureserver", Some("zzz")).await.unwrap_err().is_not_found());
        assert!(cache.service_get("tiles", Some("a")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let cache = fixtures::cache();
        cache.service_register("featureserver", "a", "10.0.0.1").await.unwrap();
        cache.service_register("featureserver", "a", "10.0.0.9").await.unwrap();

        assert_eq!(cache.service_count("featureserver").await.unwrap(), 1);
        let found = cache.service_get("featureserver", Some("a")).await.unwrap();
        assert_eq!(found[0].host, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = fixtures::cache();
        cache.service_register("featureserver", "a", "10.0.0.1").await.unwrap();

        assert_eq!(cache.service_remove("tiles", "a").await.unwrap(), 0);
        assert_eq!(cache.service_remove("featureserver", "a").await.unwrap(), 1);
        assert_eq!(cache.service_count("featureserver").await.unwrap(), 0);
    }
}
