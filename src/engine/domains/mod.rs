//! Seven-domain risk engine.
//!
//! Each domain evaluator scores one concern over a shared context built
//! from the event payload, the extracted targets and the guard findings.
//! Ranking bonuses, size-band coverage selection, threshold findings,
//! severity overrides and stage mapping then turn raw evaluations into
//! effective per-domain decisions.

pub mod access;
pub mod aesthetics;
pub mod execution;
pub mod scales;
pub mod security;
pub mod testing;
pub mod value;

use crate::core::exceptions::{AppliedException, apply_exceptions};
use crate::core::findings::{
    Decision, Domain, DomainEvaluation, EnforcementStage, GuardFinding, GuardSeverity,
    ShadowFinding, ShadowSeverity,
};
use crate::core::policy::{CoveragePolicy, Policy};
use crate::providers::ReviewTarget;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::Serialize;
use serde_json::Value;

/// Shared input of all domain evaluators.
pub struct EvaluationContext<'a> {
    pub payload: &'a Value,
    pub targets: &'a [ReviewTarget],
    pub guard_findings: &'a [GuardFinding],
    /// Target bodies plus PR title/body, review body and comment body,
    /// joined by newline.
    pub corpus: String,
    pub changed_files: u64,
    pub lines_changed: u64,
}

fn non_negative(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

impl<'a> EvaluationContext<'a> {
    pub fn build(
        payload: &'a Value,
        targets: &'a [ReviewTarget],
        guard_findings: &'a [GuardFinding],
    ) -> Self {
        let mut pieces: Vec<String> = targets.iter().map(|t| t.body.clone()).collect();
        for pointer in [
            "/pull_request/title",
            "/pull_request/body",
            "/review/body",
            "/comment/body",
        ] {
            if let Some(text) = payload.pointer(pointer).and_then(Value::as_str) {
                pieces.push(text.to_string());
            }
        }
        let additions = non_negative(payload.pointer("/pull_request/additions").and_then(Value::as_i64));
        let deletions = non_negative(payload.pointer("/pull_request/deletions").and_then(Value::as_i64));
        EvaluationContext {
            payload,
            targets,
            guard_findings,
            corpus: pieces.join("\n"),
            changed_files: non_negative(
                payload
                    .pointer("/pull_request/changed_files")
                    .and_then(Value::as_i64),
            ),
            lines_changed: additions + deletions,
        }
    }
}

/// One keyword/regex probe over the corpus.
pub(crate) struct Probe {
    pub code: &'static str,
    pub pattern: &'static str,
    pub severity: ShadowSeverity,
    pub weight: u32,
    pub message: &'static str,
    pub remediation: &'static str,
}

/// Run a probe table over the corpus. Returns the weighted hit score and
/// one finding per matched probe.
pub(crate) fn run_probes(
    domain: Domain,
    corpus: &str,
    probes: &[Probe],
) -> (u32, Vec<ShadowFinding>) {
    let mut score = 0u32;
    let mut findings = Vec::new();
    for probe in probes {
        let Ok(regex) = RegexBuilder::new(probe.pattern).case_insensitive(true).build() else {
            continue;
        };
        let hits = regex.find_iter(corpus).count() as u32;
        if hits == 0 {
            continue;
        }
        score = score.saturating_add(probe.weight.saturating_mul(hits.min(5)));
        let mut details = serde_json::Map::new();
        details.insert("hits".to_string(), serde_json::json!(hits));
        findings.push(ShadowFinding {
            code: probe.code.to_string(),
            domain,
            severity: probe.severity,
            message: probe.message.to_string(),
            remediation: probe.remediation.to_string(),
            details: Some(details),
        });
    }
    (score.min(100), findings)
}

/// Run every evaluator in canonical domain order.
pub fn run_all(ctx: &EvaluationContext) -> Vec<DomainEvaluation> {
    vec![
        security::evaluate(ctx),
        access::evaluate(ctx),
        testing::evaluate(ctx),
        execution::evaluate(ctx),
        scales::evaluate(ctx),
        value::evaluate(ctx),
        aesthetics::evaluate(ctx),
    ]
}

/// Ranking bonuses applied on top of evaluator scores before selection.
pub fn apply_ranking_bonuses(evaluations: &mut [DomainEvaluation], ctx: &EvaluationContext) {
    let blocking_guard = ctx
        .guard_findings
        .iter()
        .filter(|f| f.severity == GuardSeverity::Block)
        .count() as u32;
    let approval_findings = ctx
        .guard_findings
        .iter()
        .filter(|f| f.code.starts_with("GUARD_APPROVALS_"))
        .count() as u32;
    let scales_bonus = (((ctx.lines_changed + 75) / 150) as u32).min(20);

    for evaluation in evaluations {
        let bonus = match evaluation.domain {
            Domain::Security => 6 * blocking_guard,
            Domain::Execution => 8 * approval_findings,
            Domain::Scales => scales_bonus,
            Domain::Testing if ctx.lines_changed >= 300 => 10,
            _ => 0,
        };
        evaluation.score = evaluation.score.saturating_add(bonus).min(100);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBand {
    Small,
    Medium,
    Large,
}

impl SizeBand {
    pub fn target_domain_count(self) -> usize {
        match self {
            SizeBand::Small => 1,
            SizeBand::Medium => 2,
            SizeBand::Large => 3,
        }
    }
}

/// Classify the change into a coverage band.
pub fn size_band(coverage: &CoveragePolicy, ctx: &EvaluationContext) -> SizeBand {
    if ctx.lines_changed <= coverage.small.max_lines_changed
        && ctx.changed_files <= coverage.small.max_files_changed
    {
        SizeBand::Small
    } else if ctx.lines_changed <= coverage.medium.max_lines_changed
        && ctx.changed_files <= coverage.medium.max_files_changed
    {
        SizeBand::Medium
    } else {
        SizeBand::Large
    }
}

/// Select the top-N enabled domains by descending ranking score, ties
/// broken by the coverage tie-break order.
pub fn select_domains(
    evaluations: &[DomainEvaluation],
    policy: &Policy,
    ctx: &EvaluationContext,
) -> Vec<Domain> {
    let coverage = policy.coverage();
    let order = coverage.complete_tie_break_order();
    let tie_index = |domain: Domain| order.iter().position(|&d| d == domain).unwrap_or(order.len());

    let mut ranked: Vec<(&DomainEvaluation, usize)> = evaluations
        .iter()
        .filter(|e| policy.domain_config(e.domain).enabled)
        .map(|e| (e, tie_index(e.domain)))
        .collect();
    ranked.sort_by(|a, b| b.0.score.cmp(&a.0.score).then(a.1.cmp(&b.1)));

    let count = size_band(&coverage, ctx).target_domain_count();
    ranked
        .into_iter()
        .take(count)
        .map(|(e, _)| e.domain)
        .collect()
}

/// Threshold finding for a selected domain, if its score crosses a bound.
pub fn threshold_finding(evaluation: &DomainEvaluation, policy: &Policy) -> Option<ShadowFinding> {
    let thresholds = policy.domain_config(evaluation.domain).thresholds?;
    let token = evaluation.domain.code_token();
    let (code, severity, bound) = if evaluation.score >= thresholds.block_at {
        (
            format!("SHADOW_{}_RISK_BLOCK_THRESHOLD", token),
            ShadowSeverity::High,
            thresholds.block_at,
        )
    } else if evaluation.score >= thresholds.warn_at {
        (
            format!("SHADOW_{}_RISK_WARN_THRESHOLD", token),
            ShadowSeverity::Medium,
            thresholds.warn_at,
        )
    } else {
        return None;
    };
    let mut details = serde_json::Map::new();
    details.insert("score".to_string(), serde_json::json!(evaluation.score));
    details.insert("threshold".to_string(), serde_json::json!(bound));
    Some(ShadowFinding {
        code,
        domain: evaluation.domain,
        severity,
        message: format!(
            "{} risk score {} crossed the {} threshold",
            evaluation.domain.name(),
            evaluation.score,
            bound
        ),
        remediation: format!(
            "Review the {} findings and reduce the change's risk surface",
            evaluation.domain.name()
        ),
        details: Some(details),
    })
}

/// Replace severities the policy overrides by finding code.
pub fn apply_severity_overrides(findings: &mut [ShadowFinding], policy: &Policy) {
    for finding in findings {
        let config = policy.domain_config(finding.domain);
        if let Some(severity) = config.check_severities.get(&finding.code) {
            finding.severity = *severity;
        }
    }
}

/// Effective decision of a single finding under the enforcement stage.
pub fn effective_decision(stage: EnforcementStage, finding: &ShadowFinding) -> Decision {
    let blocks = match stage {
        EnforcementStage::Whisper => {
            finding.severity == ShadowSeverity::Critical
                && (finding.domain == Domain::Security
                    || finding.code.starts_with("SHADOW_RUNTIME_"))
        }
        EnforcementStage::Oath => finding.severity >= ShadowSeverity::High,
        EnforcementStage::Throne => finding.severity != ShadowSeverity::Low,
    };
    if blocks { Decision::Block } else { Decision::Warn }
}

fn decision_over(stage: EnforcementStage, findings: &[&ShadowFinding]) -> Decision {
    let mut decision = Decision::Pass;
    for finding in findings {
        decision = decision.worst(effective_decision(stage, finding));
    }
    decision
}

/// Per-domain effective decision recorded in v3 reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowDecision {
    pub domain: Domain,
    pub score: u32,
    pub decision: Decision,
}

/// Full output of the shadow engine.
#[derive(Debug)]
pub struct ShadowOutcome {
    pub selected_domains: Vec<Domain>,
    /// Retained findings, stable-sorted by (tie-break index, code).
    pub findings: Vec<ShadowFinding>,
    pub shadow_decisions: Vec<ShadowDecision>,
    pub exceptions_applied: Vec<AppliedException>,
    pub overall: Decision,
}

/// Run the complete shadow pipeline: evaluate, rank, select, threshold,
/// override severities, filter exceptions, map stages.
pub fn run_shadow_engine(
    policy: &Policy,
    ctx: &EvaluationContext,
    now: DateTime<Utc>,
) -> ShadowOutcome {
    let mut evaluations = run_all(ctx);
    apply_ranking_bonuses(&mut evaluations, ctx);
    let selected = select_domains(&evaluations, policy, ctx);

    let mut findings: Vec<ShadowFinding> = Vec::new();
    for evaluation in &evaluations {
        if !selected.contains(&evaluation.domain) {
            continue;
        }
        findings.extend(evaluation.findings.iter().cloned());
        if let Some(threshold) = threshold_finding(evaluation, policy) {
            findings.push(threshold);
        }
    }
    apply_severity_overrides(&mut findings, policy);

    let (mut retained, exceptions_applied) =
        apply_exceptions(findings, &policy.exceptions, now);

    let order = policy.coverage().complete_tie_break_order();
    let tie_index = |domain: Domain| order.iter().position(|&d| d == domain).unwrap_or(order.len());
    retained.sort_by(|a, b| {
        (tie_index(a.domain), a.code.as_str()).cmp(&(tie_index(b.domain), b.code.as_str()))
    });

    let stage = policy.stage();
    let shadow_decisions = selected
        .iter()
        .map(|&domain| {
            let domain_findings: Vec<&ShadowFinding> =
                retained.iter().filter(|f| f.domain == domain).collect();
            let score = evaluations
                .iter()
                .find(|e| e.domain == domain)
                .map(|e| e.score)
                .unwrap_or(0);
            ShadowDecision {
                domain,
                score,
                decision: decision_over(stage, &domain_findings),
            }
        })
        .collect();
    let overall = decision_over(stage, &retained.iter().collect::<Vec<_>>());

    ShadowOutcome {
        selected_domains: selected,
        findings: retained,
        shadow_decisions,
        exceptions_applied,
        overall,
    }
}
