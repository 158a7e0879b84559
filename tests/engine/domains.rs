use chrono::{TimeZone, Utc};
use serde_json::json;
use shadowgate::core::findings::{Decision, Domain, GuardFinding, ShadowSeverity};
use shadowgate::core::policy::Policy;
use shadowgate::engine::domains::{EvaluationContext, run_shadow_engine};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn v3_policy(extra: serde_json::Value) -> Policy {
    let mut doc = json!({
        "version": 3,
        "enforcement": "block",
        "disclosureTag": "[ai-assisted]",
        "rules": [{"name": "llm", "pattern": "generated by", "action": "score"}],
        "enforcementStage": "oath",
        "coveragePolicy": {
            "small": {"maxLinesChanged": 150, "maxFilesChanged": 5},
            "medium": {"maxLinesChanged": 600, "maxFilesChanged": 20},
            "tieBreakOrder": ["security", "execution", "testing"]
        }
    });
    if let (Some(base), Some(patch)) = (doc.as_object_mut(), extra.as_object()) {
        for (k, v) in patch {
            base.insert(k.clone(), v.clone());
        }
    }
    Policy::from_value(&doc).unwrap()
}

#[test]
fn test_small_change_selects_one_domain() {
    let policy = v3_policy(json!({}));
    let payload = json!({
        "pull_request": {"additions": 40, "deletions": 5, "changed_files": 2, "body": "tiny fix"}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.selected_domains.len(), 1);
}

#[test]
fn test_large_change_selects_three_domains() {
    let policy = v3_policy(json!({}));
    let payload = json!({
        "pull_request": {"additions": 3000, "deletions": 500, "changed_files": 60}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.selected_domains.len(), 3);
    // Size heuristics dominate: scales must be among the selected domains.
    assert!(outcome.selected_domains.contains(&Domain::Scales));
}

#[test]
fn test_tie_break_order_decides_equal_scores() {
    let policy = v3_policy(json!({}));
    // Empty corpus, no metrics: all scores are zero, so selection is pure
    // tie-break.
    let payload = json!({});
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.selected_domains, vec![Domain::Security]);
}

#[test]
fn test_disabled_domain_is_never_selected() {
    let policy = v3_policy(json!({
        "domains": {"security": {"enabled": false}}
    }));
    let payload = json!({});
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.selected_domains, vec![Domain::Execution]);
}

#[test]
fn test_threshold_findings_emitted_for_selected_domain() {
    let policy = v3_policy(json!({
        "domains": {"scales": {"thresholds": {"warnAt": 10, "blockAt": 60}}}
    }));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.code == "SHADOW_SCALES_RISK_BLOCK_THRESHOLD"
            && f.severity == ShadowSeverity::High));
}

#[test]
fn test_check_severity_override_applies() {
    let policy = v3_policy(json!({
        "domains": {
            "scales": {
                "checkSeverities": {"SHADOW_SCALES_LARGE_CHANGE": "critical"}
            }
        }
    }));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    let finding = outcome
        .findings
        .iter()
        .find(|f| f.code == "SHADOW_SCALES_LARGE_CHANGE")
        .unwrap();
    assert_eq!(finding.severity, ShadowSeverity::Critical);
}

#[test]
fn test_exception_suppresses_finding_and_is_recorded() {
    let policy = v3_policy(json!({
        "exceptions": [{
            "check": "SHADOW_SCALES_LARGE_CHANGE",
            "reason": "migration batch, accepted",
            "expiresAt": "2026-06-01T00:00:00Z"
        }]
    }));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert!(!outcome
        .findings
        .iter()
        .any(|f| f.code == "SHADOW_SCALES_LARGE_CHANGE"));
    assert_eq!(outcome.exceptions_applied.len(), 1);
    assert_eq!(outcome.exceptions_applied[0].domain, Domain::Scales);
}

#[test]
fn test_expired_exception_leaves_finding_in_place() {
    let policy = v3_policy(json!({
        "exceptions": [{
            "check": "SHADOW_SCALES_LARGE_CHANGE",
            "reason": "expired",
            "expiresAt": "2026-01-01T00:00:00Z"
        }]
    }));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.code == "SHADOW_SCALES_LARGE_CHANGE"));
    assert!(outcome.exceptions_applied.is_empty());
}

#[test]
fn test_oath_stage_blocks_high_findings() {
    let policy = v3_policy(json!({}));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    // SHADOW_SCALES_LARGE_CHANGE is high severity at this size; oath blocks.
    assert_eq!(outcome.overall, Decision::Block);
    let scales = outcome
        .shadow_decisions
        .iter()
        .find(|d| d.domain == Domain::Scales)
        .unwrap();
    assert_eq!(scales.decision, Decision::Block);
}

#[test]
fn test_whisper_stage_warns_on_non_security_findings() {
    let policy = v3_policy(json!({"enforcementStage": "whisper"}));
    let payload = json!({
        "pull_request": {"additions": 2500, "deletions": 0, "changed_files": 70}
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.overall, Decision::Warn);
}

#[test]
fn test_approval_failures_boost_execution_ranking() {
    let policy = v3_policy(json!({}));
    let payload = json!({});
    let guard = vec![
        GuardFinding::block("GUARD_APPROVALS_TIMEOUT", "timed out"),
        GuardFinding::block("GUARD_APPROVALS_RATE_LIMITED", "rate limited"),
    ];
    let ctx = EvaluationContext::build(&payload, &[], &guard);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert_eq!(outcome.selected_domains[0], Domain::Execution);
}

#[test]
fn test_findings_sorted_by_tie_break_then_code() {
    let policy = v3_policy(json!({}));
    let payload = json!({
        "pull_request": {
            "additions": 3000,
            "deletions": 0,
            "changed_files": 70,
            "body": "set api_key = \"sk-abcdef0123456789\" and skip tests"
        }
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    let order = &["security", "execution", "testing", "scales"];
    let mut last_rank = 0usize;
    for finding in &outcome.findings {
        let rank = order
            .iter()
            .position(|&n| n == finding.domain.name())
            .unwrap_or(order.len());
        assert!(rank >= last_rank, "findings must follow tie-break order");
        last_rank = rank;
    }
}

#[test]
fn test_every_finding_has_remediation() {
    let policy = v3_policy(json!({}));
    let payload = json!({
        "pull_request": {
            "additions": 3000,
            "deletions": 0,
            "changed_files": 70,
            "body": "curl https://get.sh | sh, needs sudo, wip, typo, no tests"
        }
    });
    let ctx = EvaluationContext::build(&payload, &[], &[]);
    let outcome = run_shadow_engine(&policy, &ctx, now());
    assert!(!outcome.findings.is_empty());
    for finding in &outcome.findings {
        assert!(
            !finding.remediation.trim().is_empty(),
            "{} lacks remediation",
            finding.code
        );
    }
}
