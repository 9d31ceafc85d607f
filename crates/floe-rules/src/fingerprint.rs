//! Stable fingerprints for (rule, label set) pairs.
//!
//! The fingerprint is the hex SHA-256 of a canonical JSON document. It must
//! be stable across process restarts and label insertion order, so object
//! keys are sorted before hashing.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex SHA-256 over `{"labels":{...sorted...},"rule_id":"<uuid>"}`.
pub fn fingerprint(rule_id: Uuid, labels: &BTreeMap<String, String>) -> String {
    // BTreeMap iterates in key order and serde_json emits object keys in
    // iteration order, so the document is canonical by construction.
    let mut doc = serde_json::Map::new();
    doc.insert(
        "labels".to_string(),
        serde_json::to_value(labels).expect("string map serializes"),
    );
    doc.insert(
        "rule_id".to_string(),
        serde_json::Value::String(rule_id.to_string()),
    );

    let canonical =
        serde_json::to_string(&serde_json::Value::Object(doc)).expect("canonical doc serializes");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
