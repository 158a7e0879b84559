//! Report assembly and rendering.
//!
//! The report is the machine-readable artifact of an invocation. JSON is
//! written with 2-space indent and a trailing newline; Markdown uses
//! `[PASS]/[WARN]/[BLOCK]` status words (ANSI color only on opt-in); SARIF
//! is a minimal 2.1.0 envelope. Replay comparison goes through the
//! canonical projection, never the pretty form.

use crate::core::canonical::{sha256_hex, to_replay_comparable};
use crate::core::error::GateError;
use crate::core::exceptions::AppliedException;
use crate::core::findings::{Decision, Domain, Enforcement, EnforcementStage};
use crate::engine::domains::ShadowDecision;
use crate::providers::{AuthorType, TargetSource};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Characters of body text kept in `bodyExcerpt` entries.
const EXCERPT_CHARS: usize = 160;

/// Finding count above which the summary declares medium cognitive load.
const LOW_COGNITIVE_LOAD_FINDINGS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusWords {
    pub pass: &'static str,
    pub warn: &'static str,
    pub block: &'static str,
}

/// Constant-shaped accessibility summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilitySummary {
    pub decision_plain_language: String,
    pub status_words: StatusWords,
    pub non_color_status_signals: bool,
    pub screen_reader_friendly: bool,
    pub cognitive_load: &'static str,
}

impl AccessibilitySummary {
    pub fn new(decision: Decision, finding_count: usize, targets_scanned: usize) -> Self {
        let plain = match decision {
            Decision::Pass => format!(
                "Pass: no blocking findings across {} scanned target(s)",
                targets_scanned
            ),
            Decision::Warn => format!(
                "Warn: {} finding(s) need attention but do not block",
                finding_count
            ),
            Decision::Block => format!(
                "Block: {} finding(s) prevent this change from proceeding",
                finding_count
            ),
        };
        AccessibilitySummary {
            decision_plain_language: plain,
            status_words: StatusWords {
                pass: "Pass",
                warn: "Warn",
                block: "Block",
            },
            non_color_status_signals: true,
            screen_reader_friendly: true,
            cognitive_load: if finding_count <= LOW_COGNITIVE_LOAD_FINDINGS {
                "low"
            } else {
                "medium"
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTarget {
    pub reference_id: String,
    pub source: TargetSource,
    pub author_login: String,
    pub author_type: AuthorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_excerpt: Option<String>,
}

/// The report wire shape (schema v2 for v1/v2 policies, v3 adds the shadow
/// fields).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub schema_version: u8,
    pub timestamp: String,
    pub provider: String,
    pub event_name: String,
    pub policy_version: u8,
    pub enforcement: Enforcement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforcement_stage: Option<EnforcementStage>,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_domains: Option<Vec<Domain>>,
    pub targets_scanned: usize,
    pub highest_ai_score: f64,
    pub human_approvals: Option<u32>,
    /// Guard findings first (sorted by code), then shadow findings in
    /// tie-break order.
    pub findings: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_decisions: Option<Vec<ShadowDecision>>,
    pub exceptions_applied: Vec<AppliedException>,
    pub targets: Vec<ReportTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hashes: Option<BTreeMap<String, String>>,
    pub evidence_hashes: BTreeMap<String, String>,
    pub accessibility_summary: AccessibilitySummary,
}

/// Excerpt helper used when full bodies are not included.
pub fn body_excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let excerpt: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", excerpt)
    } else {
        excerpt
    }
}

/// Digest used for replay comparison.
pub fn replay_digest(report: &Value) -> String {
    sha256_hex(to_replay_comparable(report).as_bytes())
}

fn finding_level(finding: &Value) -> &'static str {
    if finding.get("domain").is_some() {
        match finding.get("severity").and_then(Value::as_str) {
            Some("critical") | Some("high") => "error",
            Some("medium") => "warning",
            _ => "note",
        }
    } else {
        match finding.get("severity").and_then(Value::as_str) {
            Some("block") => "error",
            _ => "warning",
        }
    }
}

/// Minimal valid SARIF 2.1.0 envelope with one run and one result per
/// finding.
pub fn render_sarif(report: &Report) -> Value {
    let results: Vec<Value> = report
        .findings
        .iter()
        .map(|finding| {
            serde_json::json!({
                "ruleId": finding.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN"),
                "level": finding_level(finding),
                "message": {
                    "text": finding.get("message").and_then(Value::as_str).unwrap_or("")
                }
            })
        })
        .collect();
    serde_json::json!({
        "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "shadowgate",
                    "informationUri": "https://github.com/shadowgate-dev/shadowgate",
                    "version": env!("CARGO_PKG_VERSION")
                }
            },
            "results": results
        }]
    })
}

fn status_tag(decision: Decision, color: bool) -> String {
    let tag = match decision {
        Decision::Pass => "[PASS]",
        Decision::Warn => "[WARN]",
        Decision::Block => "[BLOCK]",
    };
    if !color {
        return tag.to_string();
    }
    match decision {
        Decision::Pass => tag.green().to_string(),
        Decision::Warn => tag.yellow().to_string(),
        Decision::Block => tag.red().to_string(),
    }
}

/// Human-readable Markdown rendering.
pub fn render_markdown(report: &Report, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Shadowgate Report {}\n\n",
        status_tag(report.decision, color)
    ));
    out.push_str(&format!(
        "- Provider: `{}` event `{}`\n- Policy: v{} ({:?} enforcement)\n- Targets scanned: {}\n- Highest AI score: {:.2}\n",
        report.provider,
        report.event_name,
        report.policy_version,
        report.enforcement,
        report.targets_scanned,
        report.highest_ai_score,
    ));
    if let Some(approvals) = report.human_approvals {
        out.push_str(&format!("- Human approvals: {}\n", approvals));
    }
    if let Some(domains) = &report.selected_domains {
        let names: Vec<&str> = domains.iter().map(|d| d.name()).collect();
        out.push_str(&format!("- Selected domains: {}\n", names.join(", ")));
    }
    out.push('\n');

    if report.findings.is_empty() {
        out.push_str("No findings.\n");
    } else {
        out.push_str("## Findings\n\n");
        for finding in &report.findings {
            let code = finding.get("code").and_then(Value::as_str).unwrap_or("?");
            let message = finding.get("message").and_then(Value::as_str).unwrap_or("");
            let severity = finding
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("?");
            out.push_str(&format!("- `{}` ({}): {}\n", code, severity, message));
        }
    }
    if !report.exceptions_applied.is_empty() {
        out.push_str("\n## Exceptions applied\n\n");
        for exception in &report.exceptions_applied {
            out.push_str(&format!(
                "- `{}` suppressed until {}: {}\n",
                exception.check, exception.expires_at, exception.reason
            ));
        }
    }
    out.push_str(&format!(
        "\n> {}\n",
        report.accessibility_summary.decision_plain_language
    ));
    out
}

/// Requested report output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Md,
    Sarif,
    All,
}

impl ReportFormat {
    pub fn parse(raw: &str) -> Result<ReportFormat, GateError> {
        match raw {
            "json" => Ok(ReportFormat::Json),
            "md" => Ok(ReportFormat::Md),
            "sarif" => Ok(ReportFormat::Sarif),
            "all" => Ok(ReportFormat::All),
            other => Err(GateError::ArgInvalid(format!(
                "unknown report format '{}'",
                other
            ))),
        }
    }

    fn includes(self, format: ReportFormat) -> bool {
        self == ReportFormat::All || self == format
    }
}

fn pretty_json(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    text.push('\n');
    text
}

/// Write the report artifacts next to `path`, creating parent directories.
/// Returns the written paths.
pub fn write_report_files(
    report: &Report,
    report_value: &Value,
    path: &Path,
    format: ReportFormat,
) -> Result<Vec<PathBuf>, GateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut written = Vec::new();
    if format.includes(ReportFormat::Json) {
        fs::write(path, pretty_json(report_value))?;
        written.push(path.to_path_buf());
    }
    if format.includes(ReportFormat::Md) {
        let md_path = path.with_extension("md");
        fs::write(&md_path, render_markdown(report, false))?;
        written.push(md_path);
    }
    if format.includes(ReportFormat::Sarif) {
        let sarif_path = path.with_extension("sarif");
        fs::write(&sarif_path, pretty_json(&render_sarif(report)))?;
        written.push(sarif_path);
    }
    Ok(written)
}
