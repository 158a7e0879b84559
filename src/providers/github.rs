//! GitHub-style provider adapter.
//!
//! Events: `pull_request`, `pull_request_review`,
//! `pull_request_review_comment`, `issue_comment`. Approval state comes
//! from the pull-request reviews listing with latest-review-wins per
//! reviewer.

use super::http::{
    ApprovalErrorKind, FetchConfig, HttpClient, ProviderApprovalError, get_json_with_retry,
};
use super::{
    ApprovalFetchOptions, AuthorType, ExtractOutcome, Provider, PullContext, ReviewTarget,
    TargetSource, author_identity, split_full_name_first,
};
use crate::core::policy::{ScanToggles, normalize_login};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

pub struct GithubProvider;

const SUPPORTED_EVENTS: [&str; 4] = [
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
    "issue_comment",
];

fn author_at(payload: &Value, pointer: &str) -> (String, AuthorType) {
    author_identity(
        payload.pointer(&format!("{}/login", pointer)).and_then(Value::as_str),
        payload.pointer(&format!("{}/type", pointer)).and_then(Value::as_str),
    )
}

impl Provider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn supported_events(&self) -> &'static [&'static str] {
        &SUPPORTED_EVENTS
    }

    fn approval_token_env_var(&self) -> &'static str {
        "GITHUB_TOKEN"
    }

    fn extract_targets(
        &self,
        event_name: &str,
        payload: &Value,
        scan: &ScanToggles,
    ) -> ExtractOutcome {
        let mut outcome = ExtractOutcome::default();
        if payload.pointer("/repository/full_name").and_then(Value::as_str).is_none() {
            outcome
                .malformed_reasons
                .push("missing repository.full_name".to_string());
        }

        match event_name {
            "pull_request" => {
                let Some(pull) = payload.get("pull_request") else {
                    outcome.malformed_reasons.push("missing pull_request".to_string());
                    return outcome;
                };
                if scan.pr_body {
                    let (login, author_type) = author_at(payload, "/pull_request/user");
                    let number = pull.get("number").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::PrBody,
                        reference_id: format!("pr_body:{}", number),
                        author_login: login,
                        author_type,
                        body: pull
                            .get("body")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            "pull_request_review" => {
                if payload.get("pull_request").is_none() {
                    outcome.malformed_reasons.push("missing pull_request".to_string());
                }
                let Some(review) = payload.get("review") else {
                    outcome.malformed_reasons.push("missing review".to_string());
                    return outcome;
                };
                if scan.reviews {
                    let (login, author_type) = author_at(payload, "/review/user");
                    let id = review.get("id").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::Review,
                        reference_id: format!("review:{}", id),
                        author_login: login,
                        author_type,
                        body: review
                            .get("body")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            "pull_request_review_comment" => {
                if payload.get("pull_request").is_none() {
                    outcome.malformed_reasons.push("missing pull_request".to_string());
                }
                let Some(comment) = payload.get("comment") else {
                    outcome.malformed_reasons.push("missing comment".to_string());
                    return outcome;
                };
                if scan.comments {
                    let (login, author_type) = author_at(payload, "/comment/user");
                    let id = comment.get("id").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::Comment,
                        reference_id: format!("comment:{}", id),
                        author_login: login,
                        author_type,
                        body: comment
                            .get("body")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            "issue_comment" => {
                let Some(issue) = payload.get("issue") else {
                    outcome.malformed_reasons.push("missing issue".to_string());
                    return outcome;
                };
                if issue.get("pull_request").is_none() {
                    outcome
                        .malformed_reasons
                        .push("missing issue.pull_request".to_string());
                    return outcome;
                }
                let Some(comment) = payload.get("comment") else {
                    outcome.malformed_reasons.push("missing comment".to_string());
                    return outcome;
                };
                if scan.issue_comments {
                    let (login, author_type) = author_at(payload, "/comment/user");
                    let id = comment.get("id").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::Comment,
                        reference_id: format!("comment:{}", id),
                        author_login: login,
                        author_type,
                        body: comment
                            .get("body")
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
        let full_name = payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)?;
        let (owner, repo) = split_full_name_first(full_name)?;
        let number = match event_name {
            "issue_comment" => {
                // Only issue comments on pull requests carry a pull context.
                payload.pointer("/issue/pull_request")?;
                payload.pointer("/issue/number").and_then(Value::as_u64)?
            }
            _ => payload
                .pointer("/pull_request/number")
                .and_then(Value::as_u64)?,
        };
        if number == 0 {
            return None;
        }
        Some(PullContext {
            owner,
            repo,
            number,
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
            rate_limit_reset_header: Some("x-ratelimit-reset"),
        };
        let headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", options.token),
            ),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("User-Agent".to_string(), "shadowgate".to_string()),
        ];

        // Latest review state per reviewer, in page order.
        let mut latest_state: BTreeMap<String, (String, AuthorType)> = BTreeMap::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/reviews?per_page={}&page={}",
                API_BASE, pull.owner, pull.repo, pull.number, PER_PAGE, page
            );
            let body = get_json_with_retry(http, &url, &headers, &config)?;
            let reviews = body.as_array().ok_or_else(|| ProviderApprovalError {
                kind: ApprovalErrorKind::FetchError,
                message: "reviews response is not an array".to_string(),
                attempts: Vec::new(),
            })?;
            for review in reviews {
                let (login, author_type) = author_identity(
                    review.pointer("/user/login").and_then(Value::as_str),
                    review.pointer("/user/type").and_then(Value::as_str),
                );
                let login = normalize_login(&login);
                if login.is_empty() {
                    continue;
                }
                let state = review
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                latest_state.insert(login, (state, author_type));
            }
            if reviews.len() < PER_PAGE {
                break;
            }
            if page >= options.settings.max_pages {
                return Err(ProviderApprovalError {
                    kind: ApprovalErrorKind::FetchError,
                    message: format!(
                        "review pagination exceeded maxPages={}",
                        options.settings.max_pages
                    ),
                    attempts: Vec::new(),
                });
            }
            page += 1;
        }

        let approvals = latest_state
            .iter()
            .filter(|(login, (state, author_type))| {
                state == "APPROVED"
                    && *author_type != AuthorType::Bot
                    && !options.allowed_authors.contains(login.as_str())
            })
            .count();
        Ok(approvals as u32)
    }
}
