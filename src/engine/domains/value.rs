//! Value domain: unfinished work markers and missing change rationale.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowFinding, ShadowSeverity};
use crate::providers::TargetSource;

/// A PR body shorter than this carries no usable rationale.
const MIN_RATIONALE_CHARS: usize = 10;

const PROBES: [Probe; 2] = [
    Probe {
        code: "SHADOW_VALUE_UNFINISHED_WORK",
        pattern: r"\b(todo|fixme|hack|wip|work\s+in\s+progress)\b",
        severity: ShadowSeverity::Low,
        weight: 8,
        message: "change carries unfinished-work markers",
        remediation: "Finish the marked work or file follow-up issues for it",
    },
    Probe {
        code: "SHADOW_VALUE_TEMPORARY_FIX",
        pattern: r"(temporary\s+(fix|workaround|solution)|quick\s+fix|band-?aid)",
        severity: ShadowSeverity::Low,
        weight: 8,
        message: "change describes itself as temporary",
        remediation: "Record the permanent fix and when it lands",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (mut score, mut findings) = run_probes(Domain::Value, &ctx.corpus, &PROBES);

    let pr_body = ctx
        .targets
        .iter()
        .find(|t| t.source == TargetSource::PrBody)
        .map(|t| t.body.trim());
    if let Some(body) = pr_body {
        if body.chars().count() < MIN_RATIONALE_CHARS {
            score = score.saturating_add(12).min(100);
            findings.push(ShadowFinding {
                code: "SHADOW_VALUE_MISSING_RATIONALE".to_string(),
                domain: Domain::Value,
                severity: ShadowSeverity::Low,
                message: "pull request body gives no rationale for the change".to_string(),
                remediation: "Explain what the change does and why it is needed".to_string(),
                details: None,
            });
        }
    }

    DomainEvaluation {
        domain: Domain::Value,
        score,
        rationale: format!("{} value signal(s)", findings.len()),
        findings,
    }
}
