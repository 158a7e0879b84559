//! Finding vocabulary shared by the guard evaluator, the domain engine and
//! the report assembler.
//!
//! Codes are stable strings and part of the wire contract: `GUARD_*` for
//! policy-level findings, `SHADOW_*` for domain-level findings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Final verdict of an invocation, and of each domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Pass,
    Warn,
    Block,
}

impl Decision {
    /// Plain status word used by the accessibility summary and renderers.
    pub fn status_word(self) -> &'static str {
        match self {
            Decision::Pass => "Pass",
            Decision::Warn => "Warn",
            Decision::Block => "Block",
        }
    }

    pub fn worst(self, other: Decision) -> Decision {
        self.max(other)
    }
}

/// Policy enforcement mode: whether blocking findings actually block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Block,
    Warn,
}

/// v3 enforcement stage: maps shadow-finding severity to effective decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementStage {
    Whisper,
    Oath,
    Throne,
}

/// Severity of a policy-level guard finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardSeverity {
    Block,
    Warn,
}

/// A policy-level finding (author rules, regex rules, runtime conditions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardFinding {
    pub code: String,
    pub severity: GuardSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl GuardFinding {
    pub fn block(code: &str, message: impl Into<String>) -> Self {
        GuardFinding {
            code: code.to_string(),
            severity: GuardSeverity::Block,
            message: message.into(),
            target_reference_id: None,
            details: None,
        }
    }

    pub fn for_target(mut self, reference_id: &str) -> Self {
        self.target_reference_id = Some(reference_id.to_string());
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }
}

/// The seven risk domains, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Security,
    Access,
    Testing,
    Execution,
    Scales,
    Value,
    Aesthetics,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Security,
        Domain::Access,
        Domain::Testing,
        Domain::Execution,
        Domain::Scales,
        Domain::Value,
        Domain::Aesthetics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Security => "security",
            Domain::Access => "access",
            Domain::Testing => "testing",
            Domain::Execution => "execution",
            Domain::Scales => "scales",
            Domain::Value => "value",
            Domain::Aesthetics => "aesthetics",
        }
    }

    /// Uppercase token used inside finding codes (`SHADOW_<TOKEN>_...`).
    pub fn code_token(self) -> &'static str {
        match self {
            Domain::Security => "SECURITY",
            Domain::Access => "ACCESS",
            Domain::Testing => "TESTING",
            Domain::Execution => "EXECUTION",
            Domain::Scales => "SCALES",
            Domain::Value => "VALUE",
            Domain::Aesthetics => "AESTHETICS",
        }
    }

    pub fn parse(raw: &str) -> Option<Domain> {
        match raw.trim().to_lowercase().as_str() {
            "security" => Some(Domain::Security),
            "access" => Some(Domain::Access),
            "testing" => Some(Domain::Testing),
            "execution" => Some(Domain::Execution),
            "scales" => Some(Domain::Scales),
            "value" => Some(Domain::Value),
            "aesthetics" => Some(Domain::Aesthetics),
            _ => None,
        }
    }
}

/// Severity of a domain-level shadow finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A domain-level finding. Every shadow finding carries a non-empty
/// remediation string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowFinding {
    pub code: String,
    pub domain: Domain,
    pub severity: ShadowSeverity,
    pub message: String,
    pub remediation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// Output of one domain evaluator: bounded score plus findings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvaluation {
    pub domain: Domain,
    pub score: u32,
    pub rationale: String,
    pub findings: Vec<ShadowFinding>,
}
