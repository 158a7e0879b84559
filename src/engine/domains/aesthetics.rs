//! Aesthetics domain: formatting churn and mixed-concern changes.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowSeverity};

const PROBES: [Probe; 3] = [
    Probe {
        code: "SHADOW_AESTHETICS_FORMAT_CHURN",
        pattern: r"(reformat|whitespace[- ]only|prettier|rustfmt|gofmt|clang-format)",
        severity: ShadowSeverity::Low,
        weight: 6,
        message: "change is dominated by formatting churn",
        remediation: "Land formatting-only changes separately from behavior changes",
    },
    Probe {
        code: "SHADOW_AESTHETICS_TYPO_ONLY",
        pattern: r"\btypo(s)?\b",
        severity: ShadowSeverity::Low,
        weight: 4,
        message: "change is described as typo fixes",
        remediation: "Batch typo fixes so review attention stays on behavior",
    },
    Probe {
        code: "SHADOW_AESTHETICS_MIXED_CONCERNS",
        pattern: r"(unrelated\s+change|drive-by|while\s+(i|we)\s+was|also\s+sneak)",
        severity: ShadowSeverity::Low,
        weight: 8,
        message: "change bundles unrelated concerns",
        remediation: "Split unrelated edits into their own pull requests",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (score, findings) = run_probes(Domain::Aesthetics, &ctx.corpus, &PROBES);
    DomainEvaluation {
        domain: Domain::Aesthetics,
        score,
        rationale: format!("{} aesthetics signal(s)", findings.len()),
        findings,
    }
}
