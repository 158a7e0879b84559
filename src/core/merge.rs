//! Org + local policy merge under path-scoped override constraints.
//!
//! The local policy may only diverge from the org policy on allowlisted
//! paths. Paths are dot-joined segments with array indices normalized from
//! `[n]` to `.n`; a `.*` suffix matches the prefix itself or anything
//! deeper.

use crate::core::error::GateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Marker for a divergence at the document root (non-object policy files).
const ROOT_PATH: &str = "<root>";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConstraints {
    #[serde(default)]
    pub allowed_override_paths: Vec<String>,
    #[serde(default)]
    pub forbidden_override_paths: Vec<String>,
}

impl OverrideConstraints {
    pub fn from_value(value: &Value) -> Result<OverrideConstraints, GateError> {
        if !value.is_object() {
            return Err(GateError::OverrideConstraintsInvalid(
                "constraints must be an object".to_string(),
            ));
        }
        let constraints: OverrideConstraints =
            serde_json::from_value(value.clone()).map_err(|e| {
                GateError::OverrideConstraintsInvalid(format!("constraints do not parse: {}", e))
            })?;
        for (field, patterns) in [
            ("allowedOverridePaths", &constraints.allowed_override_paths),
            ("forbiddenOverridePaths", &constraints.forbidden_override_paths),
        ] {
            for pattern in patterns {
                if pattern.trim().is_empty() {
                    return Err(GateError::OverrideConstraintsInvalid(format!(
                        "{} contains an empty pattern",
                        field
                    )));
                }
            }
        }
        Ok(constraints)
    }
}

/// Constraints applied when the caller supplies none: author lists, scan
/// toggles, runtime limits, report knobs, approvals settings and rules may
/// be overridden; enforcement identity and the fail-closed runtime gates
/// may not.
pub fn default_constraints() -> OverrideConstraints {
    OverrideConstraints {
        allowed_override_paths: vec![
            "allowedAuthors".to_string(),
            "blockedAuthors".to_string(),
            "scan.*".to_string(),
            "runtime.maxBodyChars".to_string(),
            "runtime.maxTargets".to_string(),
            "runtime.maxEventBytes".to_string(),
            "report.*".to_string(),
            "approvals.*".to_string(),
            "rules.*".to_string(),
        ],
        forbidden_override_paths: vec![
            "version".to_string(),
            "enforcement".to_string(),
            "blockBotAuthors".to_string(),
            "maxAiScore".to_string(),
            "disclosureTag".to_string(),
            "disclosureRequiredScore".to_string(),
            "runtime.failOnUnsupportedEvent".to_string(),
            "runtime.failOnMalformedPayload".to_string(),
        ],
    }
}

/// Normalize `[n]` array-index segments to `.n`.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '[' {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&']') && !digits.is_empty() {
                chars.next();
                out.push('.');
                out.push_str(&digits);
                continue;
            }
            out.push('[');
            out.push_str(&digits);
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether a normalized path matches a constraint pattern.
///
/// A plain pattern matches itself and its subtree; a `.*`-suffixed pattern
/// matches the prefix itself or anything deeper.
pub fn is_path_match(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return path == prefix || path.starts_with(&format!("{}.", prefix));
    }
    path == pattern || path.starts_with(&format!("{}.", pattern))
}

/// Collect the set of paths where `org` and `local` differ. Arrays compare
/// wholesale (they are replaced, not merged). Root-level divergence between
/// non-objects maps to `<root>`.
pub fn collect_diff_paths(org: &Value, local: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    diff_into(org, local, String::new(), &mut paths);
    paths
}

fn diff_into(org: &Value, local: &Value, prefix: String, paths: &mut Vec<String>) {
    match (org, local) {
        (Value::Object(org_map), Value::Object(local_map)) => {
            let keys: BTreeSet<&String> = org_map.keys().chain(local_map.keys()).collect();
            for key in keys {
                let child = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                match (org_map.get(key), local_map.get(key)) {
                    (Some(o), Some(l)) => diff_into(o, l, child, paths),
                    (None, Some(_)) | (Some(_), None) => paths.push(child),
                    (None, None) => unreachable!("key is from the union of org_map and local_map keys"),
                }
            }
        }
        (o, l) => {
            if o != l {
                paths.push(if prefix.is_empty() {
                    ROOT_PATH.to_string()
                } else {
                    prefix
                });
            }
        }
    }
}

fn deep_merge(org: &Value, local: &Value) -> Value {
    match (org, local) {
        (Value::Object(org_map), Value::Object(local_map)) => {
            let mut merged = org_map.clone();
            for (key, local_value) in local_map {
                let value = match org_map.get(key) {
                    Some(org_value) => deep_merge(org_value, local_value),
                    None => local_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        // Leaves and arrays: the override wins wholesale.
        (_, other) => other.clone(),
    }
}

/// Merge a local policy over the org policy, rejecting divergences outside
/// the allowed override paths.
pub fn merge_policies_with_constraints(
    org: &Value,
    local: &Value,
    constraints: &OverrideConstraints,
) -> Result<Value, GateError> {
    let diff_paths: Vec<String> = collect_diff_paths(org, local)
        .into_iter()
        .map(|p| normalize_path(&p))
        .filter(|p| p != ROOT_PATH)
        .collect();

    let mut violations = BTreeSet::new();
    for path in &diff_paths {
        let forbidden = constraints
            .forbidden_override_paths
            .iter()
            .any(|pattern| is_path_match(path, pattern));
        if forbidden {
            violations.insert(path.clone());
            continue;
        }
        let allowed = constraints
            .allowed_override_paths
            .iter()
            .any(|pattern| is_path_match(path, pattern));
        if !allowed {
            violations.insert(path.clone());
        }
    }
    if !violations.is_empty() {
        let listed: Vec<String> = violations.into_iter().collect();
        return Err(GateError::OverrideForbidden(listed.join(", ")));
    }

    Ok(deep_merge(org, local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_path_rewrites_indices() {
        assert_eq!(normalize_path("rules[2].pattern"), "rules.2.pattern");
        assert_eq!(normalize_path("scan.prBody"), "scan.prBody");
    }

    #[test]
    fn test_path_match_star_suffix() {
        assert!(is_path_match("scan", "scan.*"));
        assert!(is_path_match("scan.prBody", "scan.*"));
        assert!(!is_path_match("scanner.prBody", "scan.*"));
    }

    #[test]
    fn test_path_match_plain_pattern_covers_subtree() {
        assert!(is_path_match("rules", "rules"));
        assert!(is_path_match("rules.0.weight", "rules"));
        assert!(!is_path_match("ruleset", "rules"));
    }

    #[test]
    fn test_collect_diff_paths_walks_nested_objects() {
        let org = json!({"runtime": {"maxTargets": 25}, "enforcement": "block"});
        let local = json!({"runtime": {"maxTargets": 50}, "enforcement": "block"});
        assert_eq!(collect_diff_paths(&org, &local), vec!["runtime.maxTargets"]);
    }

    #[test]
    fn test_merge_is_idempotent_on_identical_policies() {
        let org = json!({"enforcement": "block", "rules": [{"name": "a"}]});
        let merged =
            merge_policies_with_constraints(&org, &org, &default_constraints()).unwrap();
        assert_eq!(merged, org);
    }

    #[test]
    fn test_allowed_override_wins() {
        let org = json!({"runtime": {"maxTargets": 25}});
        let local = json!({"runtime": {"maxTargets": 50}});
        let merged =
            merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap();
        assert_eq!(merged["runtime"]["maxTargets"], json!(50));
    }

    #[test]
    fn test_forbidden_override_rejected_with_sorted_paths() {
        let org = json!({"runtime": {"failOnMalformedPayload": true, "maxTargets": 25}});
        let local = json!({"runtime": {"failOnMalformedPayload": false, "maxTargets": 50}});
        let err = merge_policies_with_constraints(&org, &local, &default_constraints())
            .unwrap_err();
        assert_eq!(err.code(), Some("E_POLICY_OVERRIDE_FORBIDDEN"));
        assert!(format!("{}", err).contains("runtime.failOnMalformedPayload"));
        assert!(!format!("{}", err).contains("maxTargets"));
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let org = json!({"rules": [{"name": "a"}, {"name": "b"}]});
        let local = json!({"rules": [{"name": "c"}]});
        let merged =
            merge_policies_with_constraints(&org, &local, &default_constraints()).unwrap();
        assert_eq!(merged["rules"], json!([{"name": "c"}]));
    }

    #[test]
    fn test_unlisted_divergence_rejected() {
        let org = json!({"minHumanApprovals": 1});
        let local = json!({"minHumanApprovals": 0});
        let err = merge_policies_with_constraints(&org, &local, &default_constraints())
            .unwrap_err();
        assert!(format!("{}", err).contains("minHumanApprovals"));
    }
}
