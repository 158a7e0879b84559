//! Provider adapters.
//!
//! Each hosted source-control platform exposes the same contract: a closed
//! set of supported events, target extraction, pull-context extraction, an
//! approval counter, and the credential env var it consumes. The rest of
//! the pipeline never branches on the provider name.

pub mod bitbucket;
pub mod github;
pub mod gitlab;
pub mod http;

use crate::core::policy::{ApprovalSettings, ScanToggles, normalize_login};
use http::{HttpClient, ProviderApprovalError};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a review-visible text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    PrBody,
    Review,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorType {
    User,
    Bot,
    Unknown,
}

/// One review-visible text artifact extracted from an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewTarget {
    pub source: TargetSource,
    /// Unique within the event.
    pub reference_id: String,
    pub author_login: String,
    pub author_type: AuthorType,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullContext {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Target extraction result: targets in document order plus the reasons a
/// payload was considered malformed.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    pub targets: Vec<ReviewTarget>,
    pub malformed_reasons: Vec<String>,
}

/// Inputs to an approval fetch.
pub struct ApprovalFetchOptions {
    pub token: String,
    /// Normalized logins excluded from the approval count.
    pub allowed_authors: FxHashSet<String>,
    pub settings: ApprovalSettings,
}

/// The uniform provider contract.
pub trait Provider: Sync {
    fn name(&self) -> &'static str;

    fn supported_events(&self) -> &'static [&'static str];

    /// Credential env var consumed by the approval fetch.
    fn approval_token_env_var(&self) -> &'static str;

    fn extract_targets(&self, event_name: &str, payload: &Value, scan: &ScanToggles)
    -> ExtractOutcome;

    fn extract_pull_context(&self, event_name: &str, payload: &Value) -> Option<PullContext>;

    /// Count distinct human approvals on the pull request, excluding bots
    /// and allowlisted logins.
    fn fetch_human_approval_count(
        &self,
        http: &dyn HttpClient,
        pull: &PullContext,
        options: &ApprovalFetchOptions,
    ) -> Result<u32, ProviderApprovalError>;
}

/// Resolve a provider by its CLI name.
pub fn provider_for(name: &str) -> Option<&'static dyn Provider> {
    match name {
        "github" => Some(&github::GithubProvider),
        "gitlab" => Some(&gitlab::GitlabProvider),
        "bitbucket" => Some(&bitbucket::BitbucketProvider),
        _ => None,
    }
}

/// Build an author identity from optional login/type fields. A login ending
/// in `[bot]` is promoted to `Bot` regardless of the declared type.
pub fn author_identity(login: Option<&str>, declared_type: Option<&str>) -> (String, AuthorType) {
    let login = login.unwrap_or("").to_string();
    let mut author_type = match declared_type {
        Some("User") | Some("user") => AuthorType::User,
        Some("Bot") | Some("bot") => AuthorType::Bot,
        _ => AuthorType::Unknown,
    };
    if normalize_login(&login).ends_with("[bot]") {
        author_type = AuthorType::Bot;
    }
    (login, author_type)
}

/// `owner/repo` split helpers shared by the adapters.
pub(crate) fn split_full_name_first(full_name: &str) -> Option<(String, String)> {
    let (owner, repo) = full_name.split_once('/')?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Split at the last `/`; multi-segment owners are allowed.
pub(crate) fn split_full_name_last(full_name: &str) -> Option<(String, String)> {
    let (owner, repo) = full_name.rsplit_once('/')?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
