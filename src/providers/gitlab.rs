//! GitLab-style provider adapter.
//!
//! Events: `Merge Request Hook`, `Note Hook`. The namespace path may have
//! multiple segments; the owner is everything before the final one.

use super::http::{
    ApprovalErrorKind, FetchConfig, HttpClient, ProviderApprovalError, get_json_with_retry,
};
use super::{
    ApprovalFetchOptions, AuthorType, ExtractOutcome, Provider, PullContext, ReviewTarget,
    TargetSource, author_identity, split_full_name_last,
};
use crate::core::policy::{ScanToggles, normalize_login};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

const API_BASE: &str = "https://gitlab.com/api/v4";
const PER_PAGE: usize = 100;

pub struct GitlabProvider;

const SUPPORTED_EVENTS: [&str; 2] = ["Merge Request Hook", "Note Hook"];

/// Percent-encode a project path for use as a URL path segment.
fn url_encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn hook_author(payload: &Value) -> (String, AuthorType) {
    let (login, mut author_type) = author_identity(
        payload.pointer("/user/username").and_then(Value::as_str),
        None,
    );
    // Webhook user objects have no declared type; humans are the default.
    if author_type == AuthorType::Unknown && !login.is_empty() {
        author_type = AuthorType::User;
    }
    if payload.pointer("/user/bot").and_then(Value::as_bool) == Some(true) {
        author_type = AuthorType::Bot;
    }
    (login, author_type)
}

/// The merge-request iid a note hook refers to, if it is an MR note.
fn note_merge_request_iid(payload: &Value) -> Option<u64> {
    let noteable_type = payload
        .pointer("/object_attributes/noteable_type")
        .and_then(Value::as_str)?;
    if noteable_type != "MergeRequest" {
        return None;
    }
    payload
        .pointer("/object_attributes/noteable_iid")
        .and_then(Value::as_u64)
        .or_else(|| payload.pointer("/merge_request/iid").and_then(Value::as_u64))
}

impl Provider for GitlabProvider {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn supported_events(&self) -> &'static [&'static str] {
        &SUPPORTED_EVENTS
    }

    fn approval_token_env_var(&self) -> &'static str {
        "GITLAB_TOKEN"
    }

    fn extract_targets(
        &self,
        event_name: &str,
        payload: &Value,
        scan: &ScanToggles,
    ) -> ExtractOutcome {
        let mut outcome = ExtractOutcome::default();
        if payload
            .pointer("/project/path_with_namespace")
            .and_then(Value::as_str)
            .is_none()
        {
            outcome
                .malformed_reasons
                .push("missing project.path_with_namespace".to_string());
        }
        let Some(attributes) = payload.get("object_attributes") else {
            outcome
                .malformed_reasons
                .push("missing object_attributes".to_string());
            return outcome;
        };

        match event_name {
            "Merge Request Hook" => {
                if scan.pr_body {
                    let (login, author_type) = hook_author(payload);
                    let iid = attributes.get("iid").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::PrBody,
                        reference_id: format!("pr_body:{}", iid),
                        author_login: login,
                        author_type,
                        body: attributes
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            "Note Hook" => {
                if scan.comments {
                    let (login, author_type) = hook_author(payload);
                    let id = attributes.get("id").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::Comment,
                        reference_id: format!("comment:{}", id),
                        author_login: login,
                        author_type,
                        body: attributes
                            .get("note")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            _ => {}
        }
        outcome
    }

    fn extract_pull_context(&self, event_name: &str, payload: &Value) -> Option<PullContext> {
        let path = payload
            .pointer("/project/path_with_namespace")
            .and_then(Value::as_str)?;
        let (owner, repo) = split_full_name_last(path)?;
        let iid = match event_name {
            "Merge Request Hook" => payload
                .pointer("/object_attributes/iid")
                .and_then(Value::as_u64)?,
            "Note Hook" => note_merge_request_iid(payload)?,
            _ => return None,
        };
        if iid == 0 {
            return None;
        }
        Some(PullContext {
            owner,
            repo,
            number: iid,
        })
    }

    fn fetch_human_approval_count(
        &self,
        http: &dyn HttpClient,
        pull: &PullContext,
        options: &ApprovalFetchOptions,
    ) -> Result<u32, ProviderApprovalError> {
        let config = FetchConfig {
            timeout: Duration::from_millis(options.settings.fetch_timeout_ms),
            retry: &options.settings.retry,
            rate_limit_reset_header: None,
        };
        let headers = vec![("PRIVATE-TOKEN".to_string(), options.token.clone())];
        let project = url_encode_path(&format!("{}/{}", pull.owner, pull.repo));

        let mut approvers: BTreeSet<String> = BTreeSet::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/projects/{}/merge_requests/{}/approvals?per_page={}&page={}",
                API_BASE, project, pull.number, PER_PAGE, page
            );
            let body = get_json_with_retry(http, &url, &headers, &config)?;
            // The endpoint answers either a bare approver array or an
            // object with `approved_by`.
            let entries: Vec<Value> = match &body {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map
                    .get("approved_by")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                _ => {
                    return Err(ProviderApprovalError {
                        kind: ApprovalErrorKind::FetchError,
                        message: "approvals response is neither array nor object".to_string(),
                        attempts: Vec::new(),
                    });
                }
            };
            let batch = entries.len();
            for entry in entries {
                let user = entry.get("user").unwrap_or(&entry);
                let (login, mut author_type) = author_identity(
                    user.get("username").and_then(Value::as_str),
                    None,
                );
                if user.get("bot").and_then(Value::as_bool) == Some(true) {
                    author_type = AuthorType::Bot;
                }
                let login = normalize_login(&login);
                if login.is_empty()
                    || author_type == AuthorType::Bot
                    || options.allowed_authors.contains(login.as_str())
                {
                    continue;
                }
                approvers.insert(login);
            }
            // Object responses are a single document; arrays paginate.
            if !body.is_array() || batch < PER_PAGE {
                break;
            }
            if page >= options.settings.max_pages {
                return Err(ProviderApprovalError {
                    kind: ApprovalErrorKind::FetchError,
                    message: format!(
                        "approval pagination exceeded maxPages={}",
                        options.settings.max_pages
                    ),
                    attempts: Vec::new(),
                });
            }
            page += 1;
        }
        Ok(approvers.len() as u32)
    }
}
