//! Guard evaluator: author rules, regex rules, disclosure tag and AI score.
//!
//! Rule patterns compile once per evaluation, case-insensitively. Patterns
//! with nested unbounded quantifiers are rejected before any target is
//! evaluated; the `regex` crate is linear-time, but the rejection is part
//! of the wire contract, so the screen runs regardless of engine.

use crate::core::error::GateError;
use crate::core::findings::{Decision, Enforcement, GuardFinding, GuardSeverity};
use crate::core::policy::{GuardRule, Policy, RuleAction, normalize_login};
use crate::providers::{AuthorType, ReviewTarget};
use regex::RegexBuilder;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{Map, Value, json};

#[derive(Debug)]
pub struct CompiledRule {
    pub name: String,
    pub action: RuleAction,
    pub weight: f64,
    pub regex: regex::Regex,
}

/// Per-target evaluation record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEvaluation {
    pub reference_id: String,
    pub ai_score: f64,
    pub matched_rules: Vec<String>,
    pub findings: Vec<GuardFinding>,
}

#[derive(Debug)]
pub struct GuardOutcome {
    pub target_evaluations: Vec<TargetEvaluation>,
    pub findings: Vec<GuardFinding>,
    /// Highest per-target AI score, clamped to [0,1].
    pub highest_score: f64,
}

/// Detect nested unbounded quantifiers: an unbounded quantifier applied to
/// a group whose interior already contains one (`(a+)+`, `([a-z]*)*`,
/// `(a{2,})+`). Escapes and character classes are skipped.
fn has_nested_unbounded_quantifier(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut open_groups: Vec<bool> = Vec::new();
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 2;
            continue;
        }
        if in_class {
            if c == ']' {
                in_class = false;
            }
            i += 1;
            continue;
        }
        match c {
            '[' => in_class = true,
            '(' => open_groups.push(false),
            ')' => {
                let interior_unbounded = open_groups.pop().unwrap_or(false);
                let quantified = matches!(chars.get(i + 1), Some('+') | Some('*'))
                    || unbounded_brace_at(&chars, i + 1);
                if interior_unbounded && quantified {
                    return true;
                }
                if interior_unbounded {
                    if let Some(parent) = open_groups.last_mut() {
                        *parent = true;
                    }
                }
            }
            '+' | '*' => {
                for flag in open_groups.iter_mut() {
                    *flag = true;
                }
            }
            '{' => {
                if let Some(close) = chars[i..].iter().position(|&c| c == '}') {
                    if unbounded_brace_at(&chars, i) {
                        for flag in open_groups.iter_mut() {
                            *flag = true;
                        }
                    }
                    i += close;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Whether `chars[at..]` starts a `{m,}`-style unbounded repetition.
fn unbounded_brace_at(chars: &[char], at: usize) -> bool {
    if chars.get(at) != Some(&'{') {
        return false;
    }
    let Some(close) = chars[at..].iter().position(|&c| c == '}') else {
        return false;
    };
    let body: String = chars[at + 1..at + close].iter().collect();
    let Some((min, max)) = body.split_once(',') else {
        return false;
    };
    !min.is_empty() && min.chars().all(|c| c.is_ascii_digit()) && max.is_empty()
}

/// Compile all rules case-insensitively, rejecting unsafe patterns before
/// any compilation and malformed patterns per rule.
pub fn compile_rules(rules: &[GuardRule]) -> Result<Vec<CompiledRule>, GateError> {
    for rule in rules {
        if has_nested_unbounded_quantifier(&rule.pattern) {
            return Err(GateError::UnsafeRuleRegex(format!(
                "rule '{}' pattern is catastrophic-backtracking-prone: {}",
                rule.name, rule.pattern
            )));
        }
    }
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        let regex = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                GateError::InvalidRuleRegex(format!(
                    "rule '{}' pattern does not compile: {}",
                    rule.name, e
                ))
            })?;
        compiled.push(CompiledRule {
            name: rule.name.clone(),
            action: rule.action,
            weight: rule.weight,
            regex,
        });
    }
    Ok(compiled)
}

fn details(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Evaluate all targets against the policy.
pub fn evaluate_targets(
    policy: &Policy,
    targets: &[ReviewTarget],
) -> Result<GuardOutcome, GateError> {
    let rules = compile_rules(&policy.rules)?;
    let allowed: FxHashSet<String> = policy.normalized_allowed_authors().into_iter().collect();
    let blocked: FxHashSet<String> = policy.normalized_blocked_authors().into_iter().collect();
    let disclosure_tag = policy.disclosure_tag.to_lowercase();

    let mut outcome = GuardOutcome {
        target_evaluations: Vec::with_capacity(targets.len()),
        findings: Vec::new(),
        highest_score: 0.0,
    };

    for target in targets {
        let login = normalize_login(&target.author_login);

        // Allowlisted authors skip every check.
        if allowed.contains(&login) {
            outcome.target_evaluations.push(TargetEvaluation {
                reference_id: target.reference_id.clone(),
                ai_score: 0.0,
                matched_rules: Vec::new(),
                findings: Vec::new(),
            });
            continue;
        }

        let mut findings = Vec::new();
        if blocked.contains(&login) {
            findings.push(
                GuardFinding::block(
                    "GUARD_BLOCKED_AUTHOR",
                    format!("author '{}' is on the blocked-authors list", login),
                )
                .for_target(&target.reference_id),
            );
        }
        if policy.block_bot_authors && target.author_type == AuthorType::Bot {
            findings.push(
                GuardFinding::block(
                    "GUARD_BOT_BLOCKED",
                    format!("bot author '{}' is blocked by policy", login),
                )
                .for_target(&target.reference_id),
            );
        }

        let mut ai_score = 0.0f64;
        let mut matched_rules = Vec::new();
        for rule in &rules {
            if !rule.regex.is_match(&target.body) {
                continue;
            }
            matched_rules.push(rule.name.clone());
            match rule.action {
                RuleAction::Block => findings.push(
                    GuardFinding::block(
                        "GUARD_RULE_BLOCK",
                        format!("rule '{}' matched", rule.name),
                    )
                    .for_target(&target.reference_id)
                    .with_details(details(&[("rule", json!(rule.name))])),
                ),
                RuleAction::Score => ai_score += rule.weight,
            }
        }
        let ai_score = ai_score.min(1.0);

        if ai_score >= policy.disclosure_required_score
            && !target.body.to_lowercase().contains(&disclosure_tag)
        {
            findings.push(
                GuardFinding::block(
                    "GUARD_DISCLOSURE_REQUIRED",
                    format!(
                        "AI score {:.2} requires the disclosure tag '{}'",
                        ai_score, policy.disclosure_tag
                    ),
                )
                .for_target(&target.reference_id)
                .with_details(details(&[
                    ("aiScore", json!(ai_score)),
                    ("disclosureTag", json!(policy.disclosure_tag)),
                ])),
            );
        }
        if ai_score > policy.max_ai_score {
            findings.push(
                GuardFinding::block(
                    "GUARD_AI_SCORE_EXCEEDED",
                    format!(
                        "AI score {:.2} exceeds maximum {:.2}",
                        ai_score, policy.max_ai_score
                    ),
                )
                .for_target(&target.reference_id)
                .with_details(details(&[
                    ("aiScore", json!(ai_score)),
                    ("maxAiScore", json!(policy.max_ai_score)),
                ])),
            );
        }

        outcome.highest_score = outcome.highest_score.max(ai_score);
        outcome.findings.extend(findings.iter().cloned());
        outcome.target_evaluations.push(TargetEvaluation {
            reference_id: target.reference_id.clone(),
            ai_score,
            matched_rules,
            findings,
        });
    }
    Ok(outcome)
}

/// Policy-level outcome decision over a set of guard findings.
pub fn outcome_decision(enforcement: Enforcement, findings: &[GuardFinding]) -> Decision {
    let any_block = findings
        .iter()
        .any(|f| f.severity == GuardSeverity::Block);
    if any_block && enforcement == Enforcement::Block {
        Decision::Block
    } else if !findings.is_empty() {
        Decision::Warn
    } else {
        Decision::Pass
    }
}
