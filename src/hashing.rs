//! Hashing - SHA-256 digests for applied patterns
//!
//! Equal inputs give equal digests, so a stored job hash is enough to
//! re-derive and audit an output set.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Digest of one serialized pattern piece.
pub fn document_digest(text: &str) -> String {
    sha256_hex(text.as_bytes())
}

/// job_hash = sha256(family + schema_version + canonical_rules + engine_version)
pub fn compute_job_hash(
    family: &str,
    schema_version: &str,
    rules: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical_rules = canonical_json(rules)?;
    let combined = format!("{}:{}:{}:{}", family, schema_version, canonical_rules, engine_version);
    Ok(sha256_hex(combined.as_bytes()))
}
