//! Ingest batch preparation.
//!
//! A dataset is written as one bulk request: the old info record is deleted,
//! the new one created, then every feature is indexed with its spatial tags.

use serde_json::Value;

use super::hash::compute_content_hash;
use crate::Error;
use crate::dataset::{self, Dataset, FeatureDocument};
use crate::geometry::GeohashTags;
use crate::store::{BulkOp, Collection};

/// Ordered bulk operations for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestBatch {
    pub ops: Vec<BulkOp>,
    /// Features carried by the batch.
    pub features: usize,
    /// Features that received geohash tags.
    pub tagged: usize,
}

/// Build the feature document for one raw GeoJSON feature.
pub fn feature_document(table: &str, feature: &Value) -> FeatureDocument {
    let geom = feature
        .get("geometry")
        .filter(|g| !g.is_null())
        .and_then(|g| match serde_json::from_value::<geojson::Geometry>(g.clone()) {
            Ok(geometry) => Some((g.clone(), geometry)),
            Err(err) => {
                tracing::warn!(table, error = %err, "feature geometry is not valid GeoJSON, stored without geom");
                None
            }
        });

    let tags = geom.as_ref().and_then(|(_, geometry)| GeohashTags::from_geometry(geometry));

    FeatureDocument {
        itemid: table.to_string(),
        type_facet: dataset::type_facet(table).to_string(),
        feature: feature.to_string(),
        geom: geom.map(|(raw, _)| raw),
        tags,
    }
}

/// Build `[delete info, create info, index feature*]` for `table`.
///
/// The info record is the dataset's metadata without its features. When no
/// `sha` is given, a content hash of the features is recorded.
pub fn prepare_batch(table: &str, dataset: &Dataset) -> Result<IngestBatch, Error> {
    let mut info = dataset.info.clone();
    if info.sha.is_none() {
        info.sha = Some(compute_content_hash(&dataset.features));
    }

    let mut ops = Vec::with_capacity(dataset.features.len() + 2);
    ops.push(BulkOp::Delete { collection: Collection::Info, id: table.to_string() });
    ops.push(BulkOp::Create { collection: Collection::Info, id: table.to_string(), doc: serde_json::to_value(&info)? });

    let mut tagged = 0;
    for feature in &dataset.features {
        let doc = feature_document(table, feature);
        if doc.tags.is_some() {
            tagged += 1;
        }
        ops.push(BulkOp::Index { collection: Collection::Features, doc: serde_json::to_value(&doc)? });
    }

    Ok(IngestBatch { ops, features: dataset.features.len(), tagged })
}
