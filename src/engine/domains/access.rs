//! Access domain: privilege escalation language and permission-surface
//! edits.

use super::{EvaluationContext, Probe, run_probes};
use crate::core::findings::{Domain, DomainEvaluation, ShadowSeverity};

const PROBES: [Probe; 3] = [
    Probe {
        code: "SHADOW_ACCESS_PRIVILEGE_KEYWORD",
        pattern: r"\b(sudo|chmod\s+777|run\s+as\s+root|privilege\s+escalat\w*)\b",
        severity: ShadowSeverity::High,
        weight: 18,
        message: "change discusses elevated privileges",
        remediation: "Scope the change to the least privilege that still works",
    },
    Probe {
        code: "SHADOW_ACCESS_PERMISSION_GRANT",
        pattern: r"(grant(s|ed)?\s+(admin|write|owner)|add(s|ed)?\s+permission|widen(s|ed)?\s+scope)",
        severity: ShadowSeverity::Medium,
        weight: 14,
        message: "change grants or widens a permission",
        remediation: "Confirm the grant with the resource owner and time-bound it",
    },
    Probe {
        code: "SHADOW_ACCESS_LIST_EDITED",
        pattern: r"\b(allowlist|whitelist|blocklist|denylist|access\s+list)\b",
        severity: ShadowSeverity::Medium,
        weight: 10,
        message: "change edits an access control list",
        remediation: "Have a second maintainer review the list delta",
    },
];

pub fn evaluate(ctx: &EvaluationContext) -> DomainEvaluation {
    let (score, findings) = run_probes(Domain::Access, &ctx.corpus, &PROBES);
    DomainEvaluation {
        domain: Domain::Access,
        score,
        rationale: format!("{} access-control signal(s)", findings.len()),
        findings,
    }
}
