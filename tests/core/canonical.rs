use serde_json::json;
use shadowgate::core::canonical::{hash_json, stable_stringify, to_replay_comparable};

#[test]
fn test_stable_stringify_is_key_order_insensitive() {
    let a: serde_json::Value =
        serde_json::from_str(r#"{"z": 1, "a": {"k": [1, 2, 3], "b": "x"}}"#).unwrap();
    let b: serde_json::Value =
        serde_json::from_str(r#"{"a": {"b": "x", "k": [1, 2, 3]}, "z": 1}"#).unwrap();
    assert_eq!(stable_stringify(&a), stable_stringify(&b));
    assert_eq!(hash_json(&a), hash_json(&b));
}

#[test]
fn test_hash_json_is_sixty_four_hex_chars() {
    let digest = hash_json(&json!({"version": 1}));
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_hash_tracks_content() {
    let a = json!({"enforcement": "block"});
    let b = json!({"enforcement": "warn"});
    assert_ne!(hash_json(&a), hash_json(&b));
}

#[test]
fn test_numbers_render_minimally() {
    let v = json!({"score": 0.25, "count": 3});
    assert_eq!(stable_stringify(&v), r#"{"count":3,"score":0.25}"#);
}

fn sample_report() -> serde_json::Value {
    json!({
        "schemaVersion": 2,
        "timestamp": "2026-02-01T08:00:00Z",
        "provider": "github",
        "eventName": "pull_request_review",
        "policyVersion": 2,
        "enforcement": "block",
        "decision": "pass",
        "targetsScanned": 2,
        "highestAiScore": 0.25,
        "humanApprovals": 1,
        "findings": [],
        "targets": [{"referenceId": "review:9"}],
        "evidenceHashes": {"event": "ab"},
        "accessibilitySummary": {"cognitiveLoad": "low"},
        "policyPath": "/tmp/policy.json",
        "generatedReports": ["out.json"]
    })
}

#[test]
fn test_replay_projection_is_timestamp_independent() {
    let base = sample_report();
    let mut shifted = base.clone();
    shifted["timestamp"] = json!("2027-12-31T23:59:59Z");
    shifted["policyPath"] = json!("/srv/policies/other.json");
    shifted["generatedReports"] = json!([]);
    assert_eq!(to_replay_comparable(&base), to_replay_comparable(&shifted));
}

#[test]
fn test_replay_projection_detects_semantic_drift() {
    let base = sample_report();
    for (key, value) in [
        ("decision", json!("block")),
        ("highestAiScore", json!(0.5)),
        ("humanApprovals", json!(0)),
        ("targetsScanned", json!(3)),
    ] {
        let mut mutated = base.clone();
        mutated[key] = value;
        assert_ne!(
            to_replay_comparable(&base),
            to_replay_comparable(&mutated),
            "mutating {} must change the projection",
            key
        );
    }
}

#[test]
fn test_projection_never_contains_volatile_keys() {
    let projected = to_replay_comparable(&sample_report());
    assert!(!projected.contains("timestamp"));
    assert!(!projected.contains("policyPath"));
    assert!(!projected.contains("generatedReports"));
}
