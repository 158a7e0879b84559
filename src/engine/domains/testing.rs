//! Testing domain: skipped or disabled tests, and coverage gaps on large
//! changes.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowFinding, ShadowSeverity};

/// Above this many changed lines, a corpus that never mentions tests is a
/// coverage-gap signal.
const COVERAGE_GAP_LINES: u64 = 400;

const PROBES: [Probe; 2] = [
    Probe {
        code: "SHADOW_TESTING_SKIPPED",
        pattern: r"(skip(ped|s)?\s+tests?|#\[ignore\]|\.only\(|xdescribe|xit\()",
        severity: ShadowSeverity::Medium,
        weight: 15,
        message: "change skips or focuses tests",
        remediation: "Re-enable the skipped tests before merging",
    },
    Probe {
        code: "SHADOW_TESTING_DISABLED",
        pattern: r"(tests?\s+(are\s+)?disabled|no\s+tests|without\s+tests|remove[sd]?\s+assert)",
        severity: ShadowSeverity::Medium,
        weight: 12,
        message: "change ships without test coverage",
        remediation: "Add tests covering the changed behavior",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (mut score, mut findings) = run_probes(Domain::Testing, &ctx.corpus, &PROBES);

    let mentions_tests = ctx.corpus.to_lowercase().contains("test");
    if ctx.lines_changed >= COVERAGE_GAP_LINES && !mentions_tests {
        score = score.saturating_add(20).min(100);
        findings.push(ShadowFinding {
            code: "SHADOW_TESTING_COVERAGE_GAP".to_string(),
            domain: Domain::Testing,
            severity: ShadowSeverity::Medium,
            message: format!(
                "{} changed lines with no mention of tests",
                ctx.lines_changed
            ),
            remediation: "Describe how the change is tested, or add tests".to_string(),
            details: None,
        });
    }

    DomainEvaluation {
        domain: Domain::Testing,
        score,
        rationale: format!(
            "{} testing signal(s), {} lines changed",
            findings.len(),
            ctx.lines_changed
        ),
        findings,
    }
}
