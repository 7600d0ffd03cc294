//! Content hash of a dataset's features.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over the serialized features, one per line, hex encoded.
///
/// Stored as the info record `sha` when the host supplies none, so two
/// ingests of identical features carry the same hash.
pub fn compute_content_hash(features: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for feature in features {
        hasher.update(feature.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
