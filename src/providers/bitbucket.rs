//! Bitbucket Cloud-style provider adapter.
//!
//! Events: `pullrequest:created|updated|comment_created|comment_updated`.
//! Approval state comes from the pull-request resource's participants.

use super::http::{
    ApprovalErrorKind, FetchConfig, HttpClient, ProviderApprovalError, get_json_with_retry,
};
use super::{
    ApprovalFetchOptions, AuthorType, ExtractOutcome, Provider, PullContext, ReviewTarget,
    TargetSource, split_full_name_first,
};
use crate::core::policy::{ScanToggles, normalize_login};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

const API_BASE: &str = "https://api.bitbucket.org/2.0";

pub struct BitbucketProvider;

const SUPPORTED_EVENTS: [&str; 4] = [
    "pullrequest:created",
    "pullrequest:updated",
    "pullrequest:comment_created",
    "pullrequest:comment_updated",
];

/// Login precedence for Bitbucket user objects: nickname, username,
/// display_name, account_id.
fn bitbucket_login(user: &Value) -> String {
    for field in ["nickname", "username", "display_name", "account_id"] {
        if let Some(login) = user.get(field).and_then(Value::as_str) {
            if !login.trim().is_empty() {
                return login.to_string();
            }
        }
    }
    String::new()
}

fn bitbucket_author(user: &Value) -> (String, AuthorType) {
    let login = bitbucket_login(user);
    let mut author_type = match user.get("type").and_then(Value::as_str) {
        Some("user") => AuthorType::User,
        Some("app") | Some("bot") => AuthorType::Bot,
        _ => AuthorType::Unknown,
    };
    if normalize_login(&login).ends_with("[bot]") {
        author_type = AuthorType::Bot;
    }
    (login, author_type)
}

impl Provider for BitbucketProvider {
    fn name(&self) -> &'static str {
        "bitbucket"
    }

    fn supported_events(&self) -> &'static [&'static str] {
        &SUPPORTED_EVENTS
    }

    fn approval_token_env_var(&self) -> &'static str {
        "BITBUCKET_TOKEN"
    }

    fn extract_targets(
        &self,
        event_name: &str,
        payload: &Value,
        scan: &ScanToggles,
    ) -> ExtractOutcome {
        let mut outcome = ExtractOutcome::default();
        if payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .is_none()
        {
            outcome
                .malformed_reasons
                .push("missing repository.full_name".to_string());
        }
        let Some(pull) = payload.get("pullrequest") else {
            outcome
                .malformed_reasons
                .push("missing pullrequest".to_string());
            return outcome;
        };
        let id = pull.get("id").and_then(Value::as_u64).unwrap_or(0);

        match event_name {
            "pullrequest:created" | "pullrequest:updated" => {
                if scan.pr_body {
                    let author = pull.get("author").cloned().unwrap_or(Value::Null);
                    let (login, author_type) = bitbucket_author(&author);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::PrBody,
                        reference_id: format!("pr_body:{}", id),
                        author_login: login,
                        author_type,
                        body: pull
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }
            "pullrequest:comment_created" | "pullrequest:comment_updated" => {
                let Some(comment) = payload.get("comment") else {
                    outcome.malformed_reasons.push("missing comment".to_string());
                    return outcome;
                };
                if scan.comments {
                    let user = comment.get("user").cloned().unwrap_or(Value::Null);
                    let (login, author_type) = bitbucket_author(&user);
                    let comment_id = comment.get("id").and_then(Value::as_u64).unwrap_or(0);
                    outcome.targets.push(ReviewTarget {
                        source: TargetSource::Comment,
                        reference_id: format!("comment:{}", comment_id),
                        author_login: login,
                        author_type,
                        body: comment
                            .pointer("/content/raw")
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

    fn extract_pull_context(&self, _event_name: &str, payload: &Value) -> Option<PullContext> {
        let full_name = payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)?;
        let (owner, repo) = split_full_name_first(full_name)?;
        let id = payload.pointer("/pullrequest/id").and_then(Value::as_u64)?;
        if id == 0 {
            return None;
        }
        Some(PullContext {
            owner,
            repo,
            number: id,
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
        let headers = vec![(
            "Authorization".to_string(),
            format!("Bearer {}", options.token),
        )];
        let url = format!(
            "{}/repositories/{}/{}/pullrequests/{}",
            API_BASE, pull.owner, pull.repo, pull.number
        );
        let body = get_json_with_retry(http, &url, &headers, &config)?;
        let participants = body
            .get("participants")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderApprovalError {
                kind: ApprovalErrorKind::FetchError,
                message: "pull request response has no participants array".to_string(),
                attempts: Vec::new(),
            })?;

        let mut approvers: BTreeSet<String> = BTreeSet::new();
        for participant in participants {
            if participant.get("approved").and_then(Value::as_bool) != Some(true) {
                continue;
            }
            let user = participant.get("user").cloned().unwrap_or(Value::Null);
            let (login, author_type) = bitbucket_author(&user);
            let login = normalize_login(&login);
            if login.is_empty()
                || author_type == AuthorType::Bot
                || options.allowed_authors.contains(login.as_str())
            {
                continue;
            }
            approvers.insert(login);
        }
        Ok(approvers.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_precedence() {
        let user = json!({"display_name": "Jo Dev", "nickname": "jo"});
        assert_eq!(bitbucket_login(&user), "jo");
        let user = json!({"display_name": "Jo Dev", "account_id": "a-1"});
        assert_eq!(bitbucket_login(&user), "Jo Dev");
        let user = json!({"account_id": "a-1"});
        assert_eq!(bitbucket_login(&user), "a-1");
    }

    #[test]
    fn test_app_participant_is_bot() {
        let user = json!({"nickname": "ci-runner", "type": "app"});
        let (_, author_type) = bitbucket_author(&user);
        assert_eq!(author_type, AuthorType::Bot);
    }
}
