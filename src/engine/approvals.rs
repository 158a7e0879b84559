//! Approval-verification stage.
//!
//! Runs after the guard evaluator when the policy demands human approvals.
//! Every failure mode surfaces as a blocking finding; nothing in this stage
//! aborts the pipeline.

use crate::core::findings::GuardFinding;
use crate::core::policy::{ApprovalSettings, Policy};
use crate::providers::http::{ApprovalErrorKind, HttpClient};
use crate::providers::{ApprovalFetchOptions, Provider, PullContext};
use rustc_hash::FxHashSet;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Outcome of the approval stage: the verified count (when the fetch
/// succeeded) plus any findings it produced.
#[derive(Debug, Default)]
pub struct ApprovalOutcome {
    pub human_approvals: Option<u32>,
    pub findings: Vec<GuardFinding>,
}

fn finding_code(kind: ApprovalErrorKind) -> &'static str {
    match kind {
        ApprovalErrorKind::Timeout => "GUARD_APPROVALS_TIMEOUT",
        ApprovalErrorKind::RateLimited => "GUARD_APPROVALS_RATE_LIMITED",
        ApprovalErrorKind::RetryExhausted => "GUARD_APPROVALS_RETRY_EXHAUSTED",
        ApprovalErrorKind::FetchError | ApprovalErrorKind::HttpError => {
            "GUARD_APPROVALS_FETCH_ERROR"
        }
    }
}

/// Verify the minimum-human-approvals requirement.
pub fn run_approval_stage(
    policy: &Policy,
    provider: &dyn Provider,
    pull: Option<&PullContext>,
    env: &BTreeMap<String, String>,
    http: &dyn HttpClient,
) -> ApprovalOutcome {
    let mut outcome = ApprovalOutcome::default();
    if policy.min_human_approvals == 0 {
        return outcome;
    }

    let Some(pull) = pull else {
        outcome.findings.push(GuardFinding::block(
            "GUARD_PULL_CONTEXT_MISSING",
            "approvals required but the event carries no pull context",
        ));
        return outcome;
    };

    let env_var = provider.approval_token_env_var();
    let token = env.get(env_var).map(String::as_str).unwrap_or("");
    if token.is_empty() {
        outcome.findings.push(GuardFinding::block(
            "GUARD_APPROVALS_UNVERIFIED",
            format!("approvals cannot be verified: {} unavailable", env_var),
        ));
        return outcome;
    }

    let options = ApprovalFetchOptions {
        token: token.to_string(),
        allowed_authors: policy
            .normalized_allowed_authors()
            .into_iter()
            .collect::<FxHashSet<String>>(),
        settings: ApprovalSettings {
            fetch_timeout_ms: policy.approvals.fetch_timeout_ms,
            max_pages: policy.approvals.max_pages,
            retry: policy.approvals.retry.clone(),
        },
    };

    match provider.fetch_human_approval_count(http, pull, &options) {
        Ok(count) => {
            debug!(provider = provider.name(), count, "approval count fetched");
            outcome.human_approvals = Some(count);
            if count < policy.min_human_approvals {
                let mut finding = GuardFinding::block(
                    "GUARD_HUMAN_APPROVALS",
                    format!(
                        "{} human approval(s) found, {} required",
                        count, policy.min_human_approvals
                    ),
                );
                let mut details = serde_json::Map::new();
                details.insert("actual".to_string(), json!(count));
                details.insert("required".to_string(), json!(policy.min_human_approvals));
                finding.details = Some(details);
                outcome.findings.push(finding);
            }
        }
        Err(error) => {
            let mut finding = GuardFinding::block(finding_code(error.kind), error.message.clone());
            let mut details = serde_json::Map::new();
            details.insert("kind".to_string(), json!(error.kind));
            if !error.attempts.is_empty() {
                details.insert(
                    "attempts".to_string(),
                    serde_json::to_value(&error.attempts).unwrap_or(json!([])),
                );
            }
            finding.details = Some(details);
            outcome.findings.push(finding);
        }
    }
    outcome
}
