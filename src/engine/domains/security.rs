//! Security domain: secret literals, disabled protections, injection
//! vectors, and malformed-event escalation.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowFinding, ShadowSeverity};

const PROBES: [Probe; 3] = [
    Probe {
        code: "SHADOW_SECURITY_SECRET_LITERAL",
        pattern: r#"(api[_-]?key|secret|token|password)\s*[:=]\s*["'][^"']{8,}["']"#,
        severity: ShadowSeverity::High,
        weight: 25,
        message: "corpus contains what looks like a hardcoded credential",
        remediation: "Move the credential into a secret store and rotate it",
    },
    Probe {
        code: "SHADOW_SECURITY_PROTECTION_DISABLED",
        pattern: r"(disable|bypass|skip)[a-z]*\s+(\w+\s+)?(auth|tls|ssl|verification|validation|signature)",
        severity: ShadowSeverity::High,
        weight: 20,
        message: "change discusses disabling a security protection",
        remediation: "Keep the protection enabled or document a compensating control",
    },
    Probe {
        code: "SHADOW_SECURITY_INJECTION_SURFACE",
        pattern: r"(eval\(|exec\(|child_process|subprocess\.|os\.system)",
        severity: ShadowSeverity::Medium,
        weight: 12,
        message: "change touches a dynamic-execution surface",
        remediation: "Prefer static call paths; sanitize any interpolated input",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (mut score, mut findings) = run_probes(Domain::Security, &ctx.corpus, &PROBES);

    // A malformed event is itself a security signal: the gate cannot see
    // what it is being asked to approve.
    let malformed = ctx
        .guard_findings
        .iter()
        .any(|f| f.code == "GUARD_MALFORMED_EVENT");
    if malformed {
        score = score.saturating_add(35).min(100);
        findings.push(ShadowFinding {
            code: "SHADOW_SECURITY_MALFORMED_EVENT".to_string(),
            domain: Domain::Security,
            severity: ShadowSeverity::Critical,
            message: "event payload was malformed; review content is unverifiable".to_string(),
            remediation: "Re-deliver the webhook event with the required objects present"
                .to_string(),
            details: None,
        });
    }

    DomainEvaluation {
        domain: Domain::Security,
        score,
        rationale: format!(
            "{} security signal(s) over {} corpus chars{}",
            findings.len(),
            ctx.corpus.chars().count(),
            if malformed { ", malformed event" } else { "" }
        ),
        findings,
    }
}
