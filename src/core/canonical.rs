//! Canonical JSON codec.
//!
//! Every digest in shadowgate is anchored on one serialization: object keys
//! sorted by Unicode code point, arrays in order, numbers and strings in
//! serde_json's minimal rendering. Reports are additionally projected to a
//! fixed key set before replay comparison so that volatile fields
//! (`timestamp`, `policyPath`, `generatedReports`) can never cause drift.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Key set of the replay-comparable projection. Order here is cosmetic; the
/// canonical stringify sorts keys anyway.
const REPLAY_KEYS: [&str; 13] = [
    "schemaVersion",
    "provider",
    "eventName",
    "policyVersion",
    "enforcement",
    "decision",
    "targetsScanned",
    "highestAiScore",
    "humanApprovals",
    "findings",
    "targets",
    "evidenceHashes",
    "accessibilitySummary",
];

/// Serialize a JSON value with object keys sorted by code point ascending.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(out, &map[*key]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // serde_json already renders null/bool/number/string minimally.
        other => out.push_str(&other.to_string()),
    }
}

/// Lowercase-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lowercase-hex SHA-256 of the canonical stringification of a value.
pub fn hash_json(value: &Value) -> String {
    sha256_hex(stable_stringify(value).as_bytes())
}

/// Project a report to the replay-comparable key set and return the
/// canonical stringification of the projection.
///
/// Fields outside the key set (notably `timestamp`, `policyPath`,
/// `generatedReports`) are dropped; absent keys are simply absent.
pub fn to_replay_comparable(report: &Value) -> String {
    let mut projected = serde_json::Map::new();
    if let Some(map) = report.as_object() {
        for key in REPLAY_KEYS {
            if let Some(v) = map.get(key) {
                projected.insert(key.to_string(), v.clone());
            }
        }
    }
    stable_stringify(&Value::Object(projected))
}
