//! Execution domain: pipeline edits, remote scripts, destructive commands,
//! and unverified approval state.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowFinding, ShadowSeverity};

const PROBES: [Probe; 3] = [
    Probe {
        code: "SHADOW_EXECUTION_REMOTE_SCRIPT",
        pattern: r"(curl|wget)[^\n]{0,80}\|\s*(sh|bash)",
        severity: ShadowSeverity::High,
        weight: 22,
        message: "change pipes a remote script into a shell",
        remediation: "Vendor the script and verify its checksum instead",
    },
    Probe {
        code: "SHADOW_EXECUTION_PIPELINE_TOUCHED",
        pattern: r"(\.github/workflows|\.gitlab-ci\.yml|bitbucket-pipelines\.yml|Jenkinsfile)",
        severity: ShadowSeverity::Medium,
        weight: 14,
        message: "change touches CI pipeline configuration",
        remediation: "Have a pipeline owner review the workflow delta",
    },
    Probe {
        code: "SHADOW_EXECUTION_DESTRUCTIVE_COMMAND",
        pattern: r"rm\s+-rf?\s+\S",
        severity: ShadowSeverity::Medium,
        weight: 12,
        message: "change contains a destructive filesystem command",
        remediation: "Constrain the deletion to an explicit, reviewed path",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (mut score, mut findings) = run_probes(Domain::Execution, &ctx.corpus, &PROBES);

    // Unverifiable approval state is an execution-trust problem.
    let approval_failures = ctx
        .guard_findings
        .iter()
        .filter(|f| f.code.starts_with("GUARD_APPROVALS_"))
        .count();
    if approval_failures > 0 {
        score = score.saturating_add(24).min(100);
        findings.push(ShadowFinding {
            code: "SHADOW_EXECUTION_APPROVALS_UNVERIFIED".to_string(),
            domain: Domain::Execution,
            severity: ShadowSeverity::High,
            message: format!(
                "{} approval verification failure(s) in this run",
                approval_failures
            ),
            remediation: "Restore API access so approvals can be verified".to_string(),
            details: None,
        });
    }

    DomainEvaluation {
        domain: Domain::Execution,
        score,
        rationale: format!("{} execution signal(s)", findings.len()),
        findings,
    }
}
