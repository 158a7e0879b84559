use serde_json::json;
use shadowgate::core::merge::{
    OverrideConstraints, collect_diff_paths, default_constraints, is_path_match,
    merge_policies_with_constraints, normalize_path,
};

fn org_policy() -> serde_json::Value {
    json!({
        "version": 2,
        "enforcement": "block",
        "blockBotAuthors": true,
        "allowedAuthors": ["release-bot"],
        "disclosureTag": "[ai-assisted]",
        "rules": [{"name": "llm", "pattern": "generated by", "action": "score"}],
        "runtime": {"maxBodyChars": 16384, "maxTargets": 25, "maxEventBytes": 1048576}
    })
}

#[test]
fn test_merging_identical_policies_is_idempotent() {
    let org = org_policy();
    let merged = merge_policies_with_constraints(&org, &org, &default_constraints()).unwrap();
    assert_eq!(merged, org);
}

#[test]
fn test_allowed_runtime_limit_override() {
    let org = org_policy();
    let mut local = org.clone();
    local["runtime"]["maxTargets"] = json!(50);
    let merged = merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap();
    assert_eq!(merged["runtime"]["maxTargets"], json!(50));
    assert_eq!(merged["runtime"]["maxBodyChars"], json!(16384));
}

#[test]
fn test_forbidden_runtime_gate_override_rejected() {
    let org = org_policy();
    let mut local = org.clone();
    local["runtime"]["failOnMalformedPayload"] = json!(false);
    let err =
        merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap_err();
    assert_eq!(err.code(), Some("E_POLICY_OVERRIDE_FORBIDDEN"));
    assert!(format!("{}", err).contains("runtime.failOnMalformedPayload"));
}

#[test]
fn test_enforcement_override_rejected() {
    let org = org_policy();
    let mut local = org.clone();
    local["enforcement"] = json!("warn");
    let err =
        merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap_err();
    assert!(format!("{}", err).contains("enforcement"));
}

#[test]
fn test_violating_paths_listed_sorted_and_deduplicated() {
    let org = org_policy();
    let mut local = org.clone();
    local["maxAiScore"] = json!(0.9);
    local["enforcement"] = json!("warn");
    local["disclosureTag"] = json!("[bot]");
    let err =
        merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap_err();
    let message = format!("{}", err);
    let disclosure = message.find("disclosureTag").unwrap();
    let enforcement = message.find("enforcement").unwrap();
    let max_score = message.find("maxAiScore").unwrap();
    assert!(disclosure < enforcement && enforcement < max_score);
}

#[test]
fn test_rules_replace_wholesale() {
    let org = org_policy();
    let mut local = org.clone();
    local["rules"] = json!([
        {"name": "local-rule", "pattern": "ai-written", "action": "block"}
    ]);
    let merged = merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap();
    assert_eq!(merged["rules"].as_array().unwrap().len(), 1);
    assert_eq!(merged["rules"][0]["name"], json!("local-rule"));
}

#[test]
fn test_custom_constraints_govern_matching() {
    let constraints = OverrideConstraints {
        allowed_override_paths: vec!["minHumanApprovals".to_string()],
        forbidden_override_paths: vec![],
    };
    let org = json!({"minHumanApprovals": 1});
    let local = json!({"minHumanApprovals": 2});
    let merged = merge_policies_with_constraints(&org, &local, &constraints).unwrap();
    assert_eq!(merged["minHumanApprovals"], json!(2));
}

#[test]
fn test_added_and_removed_keys_are_diff_paths() {
    let org = json!({"scan": {"prBody": true}});
    let local = json!({"scan": {"prBody": true, "reviews": false}});
    assert_eq!(collect_diff_paths(&org, &local), vec!["scan.reviews"]);
    let local = json!({"scan": {}});
    assert_eq!(collect_diff_paths(&org, &local), vec!["scan.prBody"]);
}

#[test]
fn test_array_index_paths_normalize() {
    assert_eq!(normalize_path("rules[10].weight"), "rules.10.weight");
    assert!(is_path_match(
        &normalize_path("rules[10].weight"),
        "rules.*"
    ));
}

#[test]
fn test_root_type_divergence_is_filtered_not_fatal() {
    // Non-object roots diverge at `<root>`, which is filtered rather than
    // reported as an override violation.
    let org = json!(5);
    let local = json!(6);
    assert_eq!(collect_diff_paths(&org, &local), vec!["<root>"]);
    let merged = merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap();
    assert_eq!(merged, json!(6));
}
