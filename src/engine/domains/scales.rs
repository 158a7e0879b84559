//! Scales domain: change-size heuristics. No corpus probes; the size
//! metrics are the signal.

use super::EvaluationContext;
use crate::core::findings::{Domain, DomainEvaluation, ShadowFinding, ShadowSeverity};

const LARGE_CHANGE_LINES: u64 = 1000;
const NOTABLE_CHANGE_LINES: u64 = 300;
const WIDE_FANOUT_FILES: u64 = 40;

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let mut findings = Vec::new();

    if ctx.lines_changed >= LARGE_CHANGE_LINES {
        findings.push(ShadowFinding {
            code: "SHADOW_SCALES_LARGE_CHANGE".to_string(),
            domain: Domain::Scales,
            severity: ShadowSeverity::High,
            message: format!("{} changed lines in one review unit", ctx.lines_changed),
            remediation: "Split the change into independently reviewable pieces".to_string(),
            details: None,
        });
    } else if ctx.lines_changed >= NOTABLE_CHANGE_LINES {
        findings.push(ShadowFinding {
            code: "SHADOW_SCALES_LARGE_CHANGE".to_string(),
            domain: Domain::Scales,
            severity: ShadowSeverity::Medium,
            message: format!("{} changed lines in one review unit", ctx.lines_changed),
            remediation: "Consider splitting the change or staging the rollout".to_string(),
            details: None,
        });
    }
    if ctx.changed_files >= WIDE_FANOUT_FILES {
        findings.push(ShadowFinding {
            code: "SHADOW_SCALES_WIDE_FANOUT".to_string(),
            domain: Domain::Scales,
            severity: ShadowSeverity::Medium,
            message: format!("{} files touched by one change", ctx.changed_files),
            remediation: "Group the file changes by subsystem across several reviews"
                .to_string(),
            details: None,
        });
    }

    // Linear in size, clamped: lines dominate, fan-out contributes.
    let score = ((ctx.lines_changed / 25) + ctx.changed_files.saturating_mul(2)).min(100) as u32;

    DomainEvaluation {
        domain: Domain::Scales,
        score,
        rationale: format!(
            "{} lines across {} files",
            ctx.lines_changed, ctx.changed_files
        ),
        findings,
    }
}
