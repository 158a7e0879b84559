use serde_json::json;
use shadowgate::core::findings::{Decision, Enforcement};
use shadowgate::core::policy::Policy;
use shadowgate::engine::guard::{evaluate_targets, outcome_decision};
use shadowgate::providers::{AuthorType, ReviewTarget, TargetSource};

fn policy(doc: serde_json::Value) -> Policy {
    Policy::from_value(&doc).unwrap()
}

fn base_policy() -> serde_json::Value {
    json!({
        "version": 1,
        "enforcement": "block",
        "blockBotAuthors": false,
        "blockedAuthors": ["banned-dev"],
        "allowedAuthors": ["Release-Bot"],
        "maxAiScore": 0.5,
        "disclosureTag": "[ai-assisted]",
        "disclosureRequiredScore": 0.4,
        "rules": [
            {"name": "llm-mention", "pattern": "generated by (an? )?(llm|model|ai)", "action": "score", "weight": 0.45},
            {"name": "prompt-leak", "pattern": "as an ai language model", "action": "block"}
        ]
    })
}

fn target(reference: &str, login: &str, author_type: AuthorType, body: &str) -> ReviewTarget {
    ReviewTarget {
        source: TargetSource::Review,
        reference_id: reference.to_string(),
        author_login: login.to_string(),
        author_type,
        body: body.to_string(),
    }
}

#[test]
fn test_allowed_author_skips_all_checks() {
    let policy = policy(base_policy());
    let targets = vec![target(
        "review:1",
        "  release-bot ",
        AuthorType::Bot,
        "as an AI language model I approve",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert!(outcome.findings.is_empty());
    assert_eq!(outcome.highest_score, 0.0);
    assert_eq!(outcome.target_evaluations[0].ai_score, 0.0);
}

#[test]
fn test_blocked_author_emits_finding() {
    let policy = policy(base_policy());
    let targets = vec![target("review:1", "Banned-Dev", AuthorType::User, "hello")];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].code, "GUARD_BLOCKED_AUTHOR");
    assert_eq!(
        outcome.findings[0].target_reference_id.as_deref(),
        Some("review:1")
    );
}

#[test]
fn test_bot_author_blocked_when_policy_says_so() {
    let mut doc = base_policy();
    doc["blockBotAuthors"] = json!(true);
    let policy = policy(doc);
    let targets = vec![target(
        "comment:2",
        "dependabot[bot]",
        AuthorType::Bot,
        "bump deps",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert!(outcome.findings.iter().any(|f| f.code == "GUARD_BOT_BLOCKED"));
}

#[test]
fn test_block_rule_match_emits_rule_finding() {
    let policy = policy(base_policy());
    let targets = vec![target(
        "review:1",
        "dev",
        AuthorType::User,
        "As an AI language model, this looks fine",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    let finding = outcome
        .findings
        .iter()
        .find(|f| f.code == "GUARD_RULE_BLOCK")
        .unwrap();
    assert!(finding.message.contains("prompt-leak"));
}

#[test]
fn test_score_rule_contributes_weight_and_triggers_disclosure() {
    let policy = policy(base_policy());
    let targets = vec![target(
        "review:1",
        "dev",
        AuthorType::User,
        "This patch was generated by an LLM",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert_eq!(outcome.highest_score, 0.45);
    // 0.45 >= disclosureRequiredScore and the tag is absent.
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.code == "GUARD_DISCLOSURE_REQUIRED"));
    // 0.45 < maxAiScore=0.5: no score-exceeded finding.
    assert!(!outcome
        .findings
        .iter()
        .any(|f| f.code == "GUARD_AI_SCORE_EXCEEDED"));
}

#[test]
fn test_disclosure_tag_is_case_insensitive() {
    let policy = policy(base_policy());
    let targets = vec![target(
        "review:1",
        "dev",
        AuthorType::User,
        "generated by an LLM [AI-Assisted]",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert!(!outcome
        .findings
        .iter()
        .any(|f| f.code == "GUARD_DISCLOSURE_REQUIRED"));
}

#[test]
fn test_score_clamps_to_one_and_exceeds_max() {
    let mut doc = base_policy();
    doc["rules"] = json!([
        {"name": "a", "pattern": "alpha", "action": "score", "weight": 0.7},
        {"name": "b", "pattern": "beta", "action": "score", "weight": 0.7}
    ]);
    let policy = policy(doc);
    let targets = vec![target(
        "review:1",
        "dev",
        AuthorType::User,
        "alpha beta [ai-assisted]",
    )];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert_eq!(outcome.highest_score, 1.0);
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.code == "GUARD_AI_SCORE_EXCEEDED"));
}

#[test]
fn test_evaluation_is_pure_over_target_copies() {
    let policy = policy(base_policy());
    let targets = vec![
        target("review:1", "dev", AuthorType::User, "generated by a model"),
        target("comment:2", "banned-dev", AuthorType::User, "ok"),
    ];
    let copies = targets.clone();
    let first = evaluate_targets(&policy, &targets).unwrap();
    let second = evaluate_targets(&policy, &copies).unwrap();
    assert_eq!(first.highest_score, second.highest_score);
    assert_eq!(first.findings.len(), second.findings.len());
    let first_codes: Vec<&str> = first.findings.iter().map(|f| f.code.as_str()).collect();
    let second_codes: Vec<&str> = second.findings.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(first_codes, second_codes);
}

#[test]
fn test_outcome_decision_respects_enforcement() {
    let policy = policy(base_policy());
    let targets = vec![target("review:1", "banned-dev", AuthorType::User, "x")];
    let outcome = evaluate_targets(&policy, &targets).unwrap();
    assert_eq!(
        outcome_decision(Enforcement::Block, &outcome.findings),
        Decision::Block
    );
    assert_eq!(
        outcome_decision(Enforcement::Warn, &outcome.findings),
        Decision::Warn
    );
    assert_eq!(outcome_decision(Enforcement::Block, &[]), Decision::Pass);
}
