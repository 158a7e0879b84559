//! Time-bounded exception filter.
//!
//! An exception suppresses shadow findings whose code matches its `check`
//! until `expiresAt`. Expired records are inert. Attribution is
//! deterministic: when several active exceptions share a code, the first in
//! `check:expiresAt` sort order wins.

use crate::core::findings::{Domain, ShadowFinding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One suppression record, usually carried inside a v3 policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    /// Finding code this exception suppresses.
    pub check: String,
    pub reason: String,
    /// ISO-8601 expiry; the record is active while `expiresAt >= now`.
    pub expires_at: String,
}

impl ExceptionRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expires) => expires.with_timezone(&Utc) >= now,
            Err(_) => false,
        }
    }
}

/// Applied-exception entry recorded in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedException {
    pub check: String,
    pub reason: String,
    pub expires_at: String,
    pub domain: Domain,
}

/// Remove exception-matched findings and record what was suppressed.
///
/// Returns the retained findings and the applied-exception entries, both in
/// deterministic order.
pub fn apply_exceptions(
    findings: Vec<ShadowFinding>,
    exceptions: &[ExceptionRecord],
    now: DateTime<Utc>,
) -> (Vec<ShadowFinding>, Vec<AppliedException>) {
    let mut active: Vec<&ExceptionRecord> =
        exceptions.iter().filter(|e| e.is_active(now)).collect();
    // Canonical attribution order.
    active.sort_by(|a, b| {
        (a.check.as_str(), a.expires_at.as_str()).cmp(&(b.check.as_str(), b.expires_at.as_str()))
    });

    let mut retained = Vec::new();
    let mut applied = Vec::new();
    for finding in findings {
        match active.iter().find(|e| e.check == finding.code) {
            Some(exception) => applied.push(AppliedException {
                check: exception.check.clone(),
                reason: exception.reason.clone(),
                expires_at: exception.expires_at.clone(),
                domain: finding.domain,
            }),
            None => retained.push(finding),
        }
    }
    (retained, applied)
}
