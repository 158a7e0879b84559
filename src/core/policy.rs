//! Policy document model (v1/v2/v3).
//!
//! The policy is the authenticated input to the whole pipeline. Parsing is
//! serde; structural validation is a separate pass so that every rejection
//! names the failing field.
//!
//! - v1: enforcement, author lists, scan toggles, regex rules, AI-score and
//!   disclosure knobs, minimum human approvals.
//! - v2: adds `runtime` limits, `report` knobs and `approvals` settings.
//! - v3: adds `enforcementStage`, `coveragePolicy`, per-domain `domains`
//!   configuration and time-bounded `exceptions`.

use crate::core::error::GateError;
use crate::core::exceptions::ExceptionRecord;
use crate::core::findings::{Domain, Enforcement, EnforcementStage, ShadowSeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub version: u8,
    pub enforcement: Enforcement,
    #[serde(default)]
    pub block_bot_authors: bool,
    #[serde(default)]
    pub blocked_authors: Vec<String>,
    #[serde(default)]
    pub allowed_authors: Vec<String>,
    #[serde(default)]
    pub scan: ScanToggles,
    #[serde(default = "default_max_ai_score")]
    pub max_ai_score: f64,
    #[serde(default)]
    pub disclosure_tag: String,
    #[serde(default = "default_disclosure_required_score")]
    pub disclosure_required_score: f64,
    #[serde(default)]
    pub min_human_approvals: u32,
    #[serde(default)]
    pub rules: Vec<GuardRule>,
    #[serde(default)]
    pub runtime: RuntimeLimits,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub approvals: ApprovalSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_stage: Option<EnforcementStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_policy: Option<CoveragePolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub domains: BTreeMap<Domain, DomainPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<ExceptionRecord>,
}

/// Which review-visible texts the extractor is allowed to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanToggles {
    #[serde(default = "default_true")]
    pub pr_body: bool,
    #[serde(default = "default_true")]
    pub reviews: bool,
    #[serde(default = "default_true")]
    pub comments: bool,
    #[serde(default = "default_true")]
    pub issue_comments: bool,
}

impl Default for ScanToggles {
    fn default() -> Self {
        ScanToggles {
            pr_body: true,
            reviews: true,
            comments: true,
            issue_comments: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Score,
}

/// One guard rule: a case-insensitive pattern that either blocks outright or
/// contributes its weight to the AI score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardRule {
    pub name: String,
    pub pattern: String,
    pub action: RuleAction,
    #[serde(default = "default_rule_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeLimits {
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
    #[serde(default = "default_max_event_bytes")]
    pub max_event_bytes: usize,
    #[serde(default)]
    pub fail_on_unsupported_event: bool,
    #[serde(default = "default_true")]
    pub fail_on_malformed_payload: bool,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        RuntimeLimits {
            max_body_chars: default_max_body_chars(),
            max_targets: default_max_targets(),
            max_event_bytes: default_max_event_bytes(),
            fail_on_unsupported_event: false,
            fail_on_malformed_payload: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    #[default]
    None,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    #[serde(default)]
    pub redaction_mode: RedactionMode,
    /// When false, targets carry a bounded `bodyExcerpt` instead of the
    /// full body.
    #[serde(default)]
    pub include_bodies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSettings {
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        ApprovalSettings {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_pages: default_max_pages(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            enabled: true,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

/// Size-band limits plus the tie-break order used by coverage selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoveragePolicy {
    #[serde(default = "default_small_band")]
    pub small: SizeBand,
    #[serde(default = "default_medium_band")]
    pub medium: SizeBand,
    #[serde(default)]
    pub tie_break_order: Vec<Domain>,
}

impl Default for CoveragePolicy {
    fn default() -> Self {
        CoveragePolicy {
            small: default_small_band(),
            medium: default_medium_band(),
            tie_break_order: Vec::new(),
        }
    }
}

impl CoveragePolicy {
    /// Tie-break order completed with any missing domains in canonical order.
    pub fn complete_tie_break_order(&self) -> Vec<Domain> {
        let mut order = self.tie_break_order.clone();
        for domain in Domain::ALL {
            if !order.contains(&domain) {
                order.push(domain);
            }
        }
        order
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeBand {
    pub max_lines_changed: u64,
    pub max_files_changed: u64,
}

/// Per-domain v3 configuration: enable/disable, warn/block thresholds, and
/// severity overrides keyed by finding code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<DomainThresholds>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub check_severities: BTreeMap<String, ShadowSeverity>,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        DomainPolicy {
            enabled: true,
            thresholds: None,
            check_severities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainThresholds {
    pub warn_at: u32,
    pub block_at: u32,
}

impl Policy {
    /// Parse and validate a policy document.
    pub fn from_value(value: &serde_json::Value) -> Result<Policy, GateError> {
        let policy: Policy = serde_json::from_value(value.clone())
            .map_err(|e| GateError::PolicyInvalid(format!("policy does not parse: {}", e)))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Structural validation. Every rejection names the failing field.
    pub fn validate(&self) -> Result<(), GateError> {
        if !(1..=3).contains(&self.version) {
            return Err(GateError::PolicyInvalid(format!(
                "version must be 1, 2 or 3 (got {})",
                self.version
            )));
        }
        if !(0.0..=1.0).contains(&self.max_ai_score) {
            return Err(GateError::PolicyInvalid(format!(
                "maxAiScore must be within [0,1] (got {})",
                self.max_ai_score
            )));
        }
        if self.disclosure_tag.trim().is_empty() {
            return Err(GateError::PolicyInvalid(
                "disclosureTag must be non-empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.disclosure_required_score) {
            return Err(GateError::PolicyInvalid(format!(
                "disclosureRequiredScore must be within [0,1] (got {})",
                self.disclosure_required_score
            )));
        }
        if self.rules.is_empty() {
            return Err(GateError::PolicyInvalid(
                "rules must contain at least one rule".to_string(),
            ));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(GateError::PolicyInvalid(format!(
                    "rules[{}].name must be non-empty",
                    i
                )));
            }
            if rule.pattern.is_empty() {
                return Err(GateError::PolicyInvalid(format!(
                    "rules[{}].pattern must be non-empty",
                    i
                )));
            }
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(GateError::PolicyInvalid(format!(
                    "rules[{}].weight must be within [0,1] (got {})",
                    i, rule.weight
                )));
            }
        }
        if let Some(coverage) = &self.coverage_policy {
            let mut seen = Vec::new();
            for domain in &coverage.tie_break_order {
                if seen.contains(domain) {
                    return Err(GateError::PolicyInvalid(format!(
                        "coveragePolicy.tieBreakOrder repeats domain '{}'",
                        domain.name()
                    )));
                }
                seen.push(*domain);
            }
        }
        for (domain, config) in &self.domains {
            if let Some(thresholds) = &config.thresholds {
                if thresholds.warn_at > 100 || thresholds.block_at > 100 {
                    return Err(GateError::PolicyInvalid(format!(
                        "domains.{}.thresholds must be within [0,100]",
                        domain.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Normalized (trimmed, lowercased) allowed-author logins.
    pub fn normalized_allowed_authors(&self) -> Vec<String> {
        self.allowed_authors
            .iter()
            .map(|a| normalize_login(a))
            .collect()
    }

    /// Normalized (trimmed, lowercased) blocked-author logins.
    pub fn normalized_blocked_authors(&self) -> Vec<String> {
        self.blocked_authors
            .iter()
            .map(|a| normalize_login(a))
            .collect()
    }

    /// Whether the v3 domain engine runs for this policy.
    pub fn shadow_enabled(&self) -> bool {
        self.version >= 3
    }

    pub fn stage(&self) -> EnforcementStage {
        self.enforcement_stage.unwrap_or(EnforcementStage::Whisper)
    }

    pub fn coverage(&self) -> CoveragePolicy {
        self.coverage_policy.clone().unwrap_or_default()
    }

    pub fn domain_config(&self, domain: Domain) -> DomainPolicy {
        self.domains.get(&domain).cloned().unwrap_or_default()
    }
}

/// Author logins compare case-insensitively after trimming.
pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

fn default_true() -> bool {
    true
}

fn default_max_ai_score() -> f64 {
    1.0
}

fn default_disclosure_required_score() -> f64 {
    1.0
}

fn default_rule_weight() -> f64 {
    0.25
}

fn default_max_body_chars() -> usize {
    16_384
}

fn default_max_targets() -> usize {
    25
}

fn default_max_event_bytes() -> usize {
    1_048_576
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_pages() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_small_band() -> SizeBand {
    SizeBand {
        max_lines_changed: 150,
        max_files_changed: 5,
    }
}

fn default_medium_band() -> SizeBand {
    SizeBand {
        max_lines_changed: 600,
        max_files_changed: 20,
    }
}
