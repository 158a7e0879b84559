//! Runtime driver: orchestrates policy resolution, event evaluation, the
//! approval stage, the domain engine and report emission.
//!
//! Failure semantics follow two tiers. Governance input errors (bundle,
//! trust store, override merge, unsafe rule regex) abort before any report
//! is written. Runtime event errors always surface as blocking findings in
//! a report the caller can consume.

use crate::core::bundle::{self, PolicyBundle};
use crate::core::canonical::{hash_json, sha256_hex};
use crate::core::error::GateError;
use crate::core::findings::{Decision, GuardFinding};
use crate::core::merge::{self, OverrideConstraints};
use crate::core::policy::{Policy, RedactionMode};
use crate::core::report::{
    AccessibilitySummary, Report, ReportFormat, ReportTarget, body_excerpt, replay_digest,
    write_report_files,
};
use crate::core::sigstore::SigstoreAdapter;
use crate::core::truststore::TrustStore;
use crate::engine::approvals::run_approval_stage;
use crate::engine::domains::{EvaluationContext, ShadowOutcome, run_shadow_engine};
use crate::engine::guard::{evaluate_targets, outcome_decision};
use crate::providers::http::HttpClient;
use crate::providers::{Provider, ReviewTarget, provider_for};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything the driver needs from the outside world. Env vars, HTTP, the
/// sigstore backend and the clock are injected so invocations stay pure.
pub struct DriverDeps<'a> {
    pub env: &'a BTreeMap<String, String>,
    pub http: &'a dyn HttpClient,
    pub sigstore: &'a dyn SigstoreAdapter,
    pub now: DateTime<Utc>,
}

/// Parsed invocation options (one policy-source group required).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub policy: Option<PathBuf>,
    pub policy_bundle: Option<PathBuf>,
    pub policy_schema: Option<PathBuf>,
    /// `keyId=path` entries.
    pub policy_public_keys: Vec<String>,
    pub policy_trust_store: Option<PathBuf>,
    pub org_policy: Option<PathBuf>,
    pub local_policy: Option<PathBuf>,
    pub override_constraints: Option<PathBuf>,
    pub event: Option<PathBuf>,
    pub event_name: Option<String>,
    pub provider: String,
    pub report: Option<PathBuf>,
    pub report_format: Option<ReportFormat>,
    pub replay_report: Option<PathBuf>,
    pub redact: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub report_value: Value,
    pub decision: Decision,
    pub exit_code: i32,
    pub written: Vec<PathBuf>,
}

fn read_text(path: &Path) -> Result<String, GateError> {
    fs::read_to_string(path).map_err(GateError::Io)
}

fn read_json(path: &Path, describe: &str) -> Result<Value, GateError> {
    let text = read_text(path)?;
    serde_json::from_str(&text)
        .map_err(|e| GateError::ArgInvalid(format!("{} at {} is not JSON: {}", describe, path.display(), e)))
}

/// Resolve the effective policy from exactly one source group. Returns the
/// validated policy plus the raw policy document (for evidence hashing).
fn resolve_policy(
    options: &RunOptions,
    deps: &DriverDeps,
) -> Result<(Policy, Value), GateError> {
    let bundled = options.policy_bundle.is_some()
        || options.policy_schema.is_some()
        || !options.policy_public_keys.is_empty()
        || options.policy_trust_store.is_some();
    let merged = options.org_policy.is_some()
        || options.local_policy.is_some()
        || options.override_constraints.is_some();

    match (&options.policy, bundled, merged) {
        (Some(path), false, false) => {
            let doc = read_json(path, "policy")?;
            let policy = Policy::from_value(&doc)?;
            Ok((policy, doc))
        }
        (None, true, false) => resolve_bundle_policy(options, deps),
        (None, false, true) => resolve_merged_policy(options),
        (None, false, false) => Err(GateError::ArgRequired(
            "one of --policy, --policy-bundle or --org-policy is required".to_string(),
        )),
        _ => Err(GateError::ArgConflict(
            "policy source groups are mutually exclusive".to_string(),
        )),
    }
}

fn resolve_bundle_policy(
    options: &RunOptions,
    deps: &DriverDeps,
) -> Result<(Policy, Value), GateError> {
    let bundle_path = options.policy_bundle.as_ref().ok_or_else(|| {
        GateError::ArgRequired("--policy-bundle is required with bundle verification".to_string())
    })?;
    let schema_path = options.policy_schema.as_ref().ok_or_else(|| {
        GateError::ArgRequired("--policy-schema is required with --policy-bundle".to_string())
    })?;
    if !options.policy_public_keys.is_empty() && options.policy_trust_store.is_some() {
        return Err(GateError::ArgConflict(
            "--policy-public-key conflicts with --policy-trust-store".to_string(),
        ));
    }

    let bundle_doc = read_text(bundle_path)?;
    let bundle_doc: Value = serde_json::from_str(&bundle_doc)
        .map_err(|e| GateError::BundleInvalid(format!("bundle is not JSON: {}", e)))?;
    let policy_bundle = PolicyBundle::from_value(&bundle_doc)?;
    let expected_schema_sha = sha256_hex(read_text(schema_path)?.as_bytes());

    let outcome = if let Some(store_path) = &options.policy_trust_store {
        let store_doc = read_text(store_path)?;
        let store_doc: Value = serde_json::from_str(&store_doc)
            .map_err(|e| GateError::TrustStoreInvalid(format!("store is not JSON: {}", e)))?;
        let store = TrustStore::from_value(&store_doc)?;
        bundle::verify_with_trust_store(&policy_bundle, &store, &expected_schema_sha, deps.sigstore)?
    } else {
        if options.policy_public_keys.is_empty() {
            return Err(GateError::ArgRequired(
                "either --policy-public-key or --policy-trust-store is required".to_string(),
            ));
        }
        let mut keys = BTreeMap::new();
        for entry in &options.policy_public_keys {
            let Some((key_id, path)) = entry.split_once('=') else {
                return Err(GateError::ArgInvalid(format!(
                    "--policy-public-key expects keyId=path (got '{}')",
                    entry
                )));
            };
            keys.insert(key_id.to_string(), read_text(Path::new(path))?);
        }
        bundle::verify(&policy_bundle, &keys, &expected_schema_sha)?
    };
    info!(
        valid = outcome.valid_signatures.len(),
        required = outcome.required_signatures,
        "policy bundle verified"
    );

    let policy = Policy::from_value(&policy_bundle.policy)?;
    Ok((policy, policy_bundle.policy))
}

fn resolve_merged_policy(options: &RunOptions) -> Result<(Policy, Value), GateError> {
    let org_path = options.org_policy.as_ref().ok_or_else(|| {
        GateError::ArgRequired("--org-policy is required with --local-policy".to_string())
    })?;
    let local_path = options.local_policy.as_ref().ok_or_else(|| {
        GateError::ArgRequired("--local-policy is required with --org-policy".to_string())
    })?;
    let org = read_json(org_path, "org policy")?;
    let local = read_json(local_path, "local policy")?;
    let constraints = match &options.override_constraints {
        Some(path) => OverrideConstraints::from_value(&read_json(path, "override constraints")?)?,
        None => merge::default_constraints(),
    };
    let merged = merge::merge_policies_with_constraints(&org, &local, &constraints)?;
    let policy = Policy::from_value(&merged)?;
    Ok((policy, merged))
}

fn env_value<'a>(env: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Truncate target bodies to the runtime limit; returns the reference ids
/// that lost content.
fn truncate_bodies(targets: &mut [ReviewTarget], max_body_chars: usize) -> BTreeSet<String> {
    let mut truncated = BTreeSet::new();
    for target in targets {
        if target.body.chars().count() > max_body_chars {
            target.body = target.body.chars().take(max_body_chars).collect();
            truncated.insert(target.reference_id.clone());
        }
    }
    truncated
}

struct EventInput {
    payload: Value,
    findings: Vec<GuardFinding>,
    oversized: bool,
}

fn load_event(path: &Path, policy: &Policy) -> Result<EventInput, GateError> {
    let bytes = fs::read(path)?;
    if bytes.len() > policy.runtime.max_event_bytes {
        let mut details = serde_json::Map::new();
        details.insert("eventBytes".to_string(), json!(bytes.len()));
        details.insert(
            "maxEventBytes".to_string(),
            json!(policy.runtime.max_event_bytes),
        );
        let mut finding = GuardFinding::block(
            "GUARD_EVENT_TOO_LARGE",
            format!(
                "event is {} bytes, limit is {}",
                bytes.len(),
                policy.runtime.max_event_bytes
            ),
        );
        finding.details = Some(details);
        return Ok(EventInput {
            payload: json!({}),
            findings: vec![finding],
            oversized: true,
        });
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(payload) => Ok(EventInput {
            payload,
            findings: Vec::new(),
            oversized: false,
        }),
        Err(e) => {
            let mut findings = Vec::new();
            if policy.runtime.fail_on_malformed_payload {
                findings.push(GuardFinding::block(
                    "GUARD_MALFORMED_EVENT",
                    format!("event JSON does not parse: {}", e),
                ));
            }
            Ok(EventInput {
                payload: json!({}),
                findings,
                oversized: false,
            })
        }
    }
}

fn build_report_targets(
    targets: &[ReviewTarget],
    policy: &Policy,
    redact: bool,
    truncated: &BTreeSet<String>,
) -> (Vec<ReportTarget>, Option<BTreeMap<String, String>>) {
    let hash_bodies = redact || policy.report.redaction_mode == RedactionMode::Hash;
    let mut body_hashes = BTreeMap::new();
    let mut out = Vec::with_capacity(targets.len());
    for target in targets {
        let mut entry = ReportTarget {
            reference_id: target.reference_id.clone(),
            source: target.source,
            author_login: target.author_login.clone(),
            author_type: target.author_type,
            body: None,
            body_excerpt: None,
        };
        if hash_bodies {
            body_hashes.insert(
                target.reference_id.clone(),
                sha256_hex(target.body.as_bytes()),
            );
        } else if !truncated.contains(&target.reference_id) {
            // Truncated bodies are withheld entirely.
            if policy.report.include_bodies {
                entry.body = Some(target.body.clone());
            } else {
                entry.body_excerpt = Some(body_excerpt(&target.body));
            }
        }
        out.push(entry);
    }
    (out, if hash_bodies { Some(body_hashes) } else { None })
}

fn findings_json(guard: &[GuardFinding], shadow: Option<&ShadowOutcome>) -> Vec<Value> {
    let mut guard_sorted: Vec<&GuardFinding> = guard.iter().collect();
    guard_sorted.sort_by(|a, b| a.code.cmp(&b.code));
    let mut out: Vec<Value> = guard_sorted
        .iter()
        .filter_map(|f| serde_json::to_value(f).ok())
        .collect();
    if let Some(shadow) = shadow {
        out.extend(
            shadow
                .findings
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok()),
        );
    }
    out
}

/// Run one complete gate invocation.
pub fn run_gate(options: &RunOptions, deps: &DriverDeps) -> Result<RunOutcome, GateError> {
    let (policy, policy_doc) = resolve_policy(options, deps)?;

    let provider: &dyn Provider = provider_for(&options.provider).ok_or_else(|| {
        GateError::ArgInvalid(format!("unknown provider '{}'", options.provider))
    })?;

    let event_path = options
        .event
        .clone()
        .or_else(|| env_value(deps.env, "GITHUB_EVENT_PATH").map(PathBuf::from))
        .ok_or_else(|| {
            GateError::EventPathRequired(
                "--event is required (or GITHUB_EVENT_PATH must be set)".to_string(),
            )
        })?;
    let event_name = options
        .event_name
        .clone()
        .or_else(|| env_value(deps.env, "GITHUB_EVENT_NAME").map(String::from))
        .ok_or_else(|| {
            GateError::ArgRequired(
                "--event-name is required (or GITHUB_EVENT_NAME must be set)".to_string(),
            )
        })?;

    // Rule regexes are validated before any event content is touched.
    crate::engine::guard::compile_rules(&policy.rules)?;

    let mut event = load_event(&event_path, &policy)?;
    let mut guard_findings = std::mem::take(&mut event.findings);

    let supported = provider.supported_events().contains(&event_name.as_str());
    let mut skip_extraction = event.oversized;
    if !supported && policy.runtime.fail_on_unsupported_event {
        guard_findings.push(GuardFinding::block(
            "GUARD_UNSUPPORTED_EVENT",
            format!(
                "event '{}' is not supported by provider '{}'",
                event_name, options.provider
            ),
        ));
        skip_extraction = true;
    }

    let mut targets = Vec::new();
    if !skip_extraction {
        let extraction = provider.extract_targets(&event_name, &event.payload, &policy.scan);
        if policy.runtime.fail_on_malformed_payload && !extraction.malformed_reasons.is_empty() {
            let mut details = serde_json::Map::new();
            details.insert(
                "reasons".to_string(),
                json!(extraction.malformed_reasons),
            );
            let mut finding = GuardFinding::block(
                "GUARD_MALFORMED_EVENT",
                format!(
                    "event payload is malformed: {}",
                    extraction.malformed_reasons.join("; ")
                ),
            );
            finding.details = Some(details);
            guard_findings.push(finding);
        }
        targets = extraction.targets;
        targets.truncate(policy.runtime.max_targets);
    }

    let truncated = truncate_bodies(&mut targets, policy.runtime.max_body_chars);
    for reference_id in &truncated {
        guard_findings.push(
            GuardFinding::block(
                "GUARD_BODY_TRUNCATED",
                format!(
                    "target body exceeded maxBodyChars={} and was truncated",
                    policy.runtime.max_body_chars
                ),
            )
            .for_target(reference_id),
        );
    }

    let guard_outcome = evaluate_targets(&policy, &targets)?;
    guard_findings.extend(guard_outcome.findings.iter().cloned());

    let pull_context = provider.extract_pull_context(&event_name, &event.payload);
    let approval_outcome = run_approval_stage(
        &policy,
        provider,
        pull_context.as_ref(),
        deps.env,
        deps.http,
    );
    guard_findings.extend(approval_outcome.findings.iter().cloned());

    let shadow_outcome = if policy.shadow_enabled() {
        let ctx = EvaluationContext::build(&event.payload, &targets, &guard_findings);
        Some(run_shadow_engine(&policy, &ctx, deps.now))
    } else {
        None
    };

    let mut decision = outcome_decision(policy.enforcement, &guard_findings);
    if let Some(shadow) = &shadow_outcome {
        decision = decision.worst(shadow.overall);
    }
    debug!(?decision, findings = guard_findings.len(), "evaluation complete");

    let (report_targets, body_hashes) =
        build_report_targets(&targets, &policy, options.redact, &truncated);
    let mut evidence_hashes = BTreeMap::new();
    evidence_hashes.insert("event".to_string(), hash_json(&event.payload));
    evidence_hashes.insert("policy".to_string(), hash_json(&policy_doc));
    evidence_hashes.insert(
        "targets".to_string(),
        hash_json(&serde_json::to_value(&targets)?),
    );

    let findings = findings_json(&guard_findings, shadow_outcome.as_ref());
    let finding_count = findings.len();
    let mut report = Report {
        schema_version: if policy.shadow_enabled() { 3 } else { 2 },
        timestamp: deps.now.to_rfc3339_opts(SecondsFormat::Secs, true),
        provider: options.provider.clone(),
        event_name,
        policy_version: policy.version,
        enforcement: policy.enforcement,
        enforcement_stage: policy.shadow_enabled().then(|| policy.stage()),
        decision,
        selected_domains: shadow_outcome
            .as_ref()
            .map(|s| s.selected_domains.clone()),
        targets_scanned: targets.len(),
        highest_ai_score: guard_outcome.highest_score,
        human_approvals: approval_outcome.human_approvals,
        findings,
        shadow_decisions: shadow_outcome
            .as_ref()
            .map(|s| s.shadow_decisions.clone()),
        exceptions_applied: shadow_outcome
            .as_ref()
            .map(|s| s.exceptions_applied.clone())
            .unwrap_or_default(),
        targets: report_targets,
        body_hashes,
        evidence_hashes,
        accessibility_summary: AccessibilitySummary::new(decision, finding_count, targets.len()),
    };
    let mut report_value = serde_json::to_value(&report)?;

    // Replay comparison runs over the report as assembled; a mismatch
    // becomes one more blocking finding.
    if let Some(baseline_path) = &options.replay_report {
        let baseline = read_json(baseline_path, "replay baseline")?;
        let current_digest = replay_digest(&report_value);
        let baseline_digest = replay_digest(&baseline);
        if current_digest != baseline_digest {
            let mut details = serde_json::Map::new();
            details.insert("currentDigest".to_string(), json!(current_digest));
            details.insert("baselineDigest".to_string(), json!(baseline_digest));
            let mut finding = GuardFinding::block(
                "GUARD_REPLAY_MISMATCH",
                format!(
                    "replay digest {} does not match baseline {}",
                    current_digest, baseline_digest
                ),
            );
            finding.details = Some(details);
            guard_findings.push(finding);

            decision = outcome_decision(policy.enforcement, &guard_findings);
            if let Some(shadow) = &shadow_outcome {
                decision = decision.worst(shadow.overall);
            }
            report.findings = findings_json(&guard_findings, shadow_outcome.as_ref());
            report.decision = decision;
            report.accessibility_summary =
                AccessibilitySummary::new(decision, report.findings.len(), report.targets_scanned);
            report_value = serde_json::to_value(&report)?;
        }
    }

    let mut written = Vec::new();
    if let Some(report_path) = &options.report {
        let format = options.report_format.unwrap_or(ReportFormat::Json);
        written = write_report_files(&report, &report_value, report_path, format)?;
    }

    Ok(RunOutcome {
        exit_code: if decision == Decision::Block { 1 } else { 0 },
        decision,
        report,
        report_value,
        written,
    })
}
