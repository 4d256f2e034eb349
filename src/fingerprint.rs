use blake3::Hasher;
use serde_json::Value;

use crate::{catalog::Resources, loader::PersistedFlow};

/// Canonicalize a JSON value by sorting object keys recursively.
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut ordered = serde_json::Map::with_capacity(map.len());
            for key in keys {
                ordered.insert(key.clone(), canonicalize_json(&map[key]));
            }
            Value::Object(ordered)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        _ => value.clone(),
    }
}

/// Lowercase hex BLAKE3 digest of `bytes`.
pub fn blake3_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Hasher::new();
    hasher.update(bytes.as_ref());
    hasher.finalize().to_hex().to_string()
}

fn feed_json(hasher: &mut Hasher, label: &str, value: Option<Value>) {
    hasher.update(label.as_bytes());
    hasher.update(&[0]);
    match value {
        Some(value) => {
            let canonical = canonicalize_json(&value);
            hasher.update(canonical.to_string().as_bytes());
        }
        None => {
            hasher.update(b"-");
        }
    }
    hasher.update(&[0]);
}

/// Digest identifying one combination of flow id, persisted payload and catalog.
///
/// Two inputs with equal content hash the same regardless of object key order.
pub fn inputs_fingerprint(
    flow_id: Option<&str>,
    persisted: Option<&PersistedFlow>,
    resources: &Resources,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"flow_id");
    hasher.update(&[0]);
    match flow_id {
        Some(id) => {
            hasher.update(&[1]);
            hasher.update(id.as_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
    hasher.update(&[0]);
    feed_json(
        &mut hasher,
        "persisted",
        persisted.and_then(|p| serde_json::to_value(p).ok()),
    );
    feed_json(&mut hasher, "resources", serde_json::to_value(resources).ok());
    hasher.finalize().to_hex().to_string()
}
