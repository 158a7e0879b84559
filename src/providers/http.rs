//! HTTP seam and the uniform approval-fetch retry engine.
//!
//! All three providers fetch approval state through the same algorithm:
//! per-attempt timeout, exponential backoff clamped at `maxDelayMs`,
//! uniform jitter, server delay hints (`Retry-After`, and for GitHub
//! `X-RateLimit-Reset`), and a bounded attempt log for diagnostics.
//!
//! The client itself is a trait so tests can script responses.

use crate::core::policy::RetrySettings;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Free-text fragments (HTTP bodies, transport messages) are bounded before
/// they reach findings or logs.
const MAX_DETAIL_CHARS: usize = 220;

/// Attempt log entries kept for diagnostics.
const MAX_ATTEMPT_LOG: usize = 20;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Blocking HTTP GET with a per-request timeout. The core never pools or
/// memoizes responses; the client is the only shared resource.
pub trait HttpClient {
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError>;
}

/// Production client backed by `reqwest::blocking`.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        ReqwestClient {
            inner: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestClient {
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.inner.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::Transport(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let mut header_map = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                header_map.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }
        let body = response
            .text()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(HttpResponse {
            status,
            headers: header_map,
            body,
        })
    }
}

/// Error classes of the approval fetch path. The kind maps 1:1 onto
/// `GUARD_APPROVALS_*` finding codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalErrorKind {
    Timeout,
    RateLimited,
    RetryExhausted,
    FetchError,
    HttpError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Error)]
#[error("approval fetch failed ({kind:?}): {message}")]
pub struct ProviderApprovalError {
    pub kind: ApprovalErrorKind,
    pub message: String,
    pub attempts: Vec<AttemptRecord>,
}

impl ProviderApprovalError {
    fn new(kind: ApprovalErrorKind, message: String, attempts: Vec<AttemptRecord>) -> Self {
        ProviderApprovalError {
            kind,
            message: truncate_detail(&message),
            attempts,
        }
    }
}

/// Bound free text to the detail budget.
pub fn truncate_detail(text: &str) -> String {
    let mut chars = text.chars();
    let bounded: String = chars.by_ref().take(MAX_DETAIL_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", bounded)
    } else {
        bounded
    }
}

/// Per-fetch configuration derived from policy `approvals` settings.
pub struct FetchConfig<'a> {
    pub timeout: Duration,
    pub retry: &'a RetrySettings,
    /// Extra rate-limit reset header consulted for hints (epoch seconds).
    pub rate_limit_reset_header: Option<&'a str>,
}

fn push_attempt(log: &mut Vec<AttemptRecord>, record: AttemptRecord) {
    log.push(record);
    if log.len() > MAX_ATTEMPT_LOG {
        let excess = log.len() - MAX_ATTEMPT_LOG;
        log.drain(..excess);
    }
}

/// Exponential backoff with clamp and uniform jitter.
fn computed_delay_ms(retry: &RetrySettings, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    let base = retry
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX))
        .min(retry.max_delay_ms);
    let jitter_span = (base as f64 * retry.jitter_ratio.clamp(0.0, 1.0)).floor() as u64;
    let jitter = if jitter_span == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_span)
    };
    base.saturating_add(jitter).min(retry.max_delay_ms)
}

/// Parse a `Retry-After` value: delay-seconds or an HTTP-date.
fn parse_retry_after_ms(raw: &str, now: DateTime<Utc>) -> Option<u64> {
    if let Ok(seconds) = raw.trim().parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let date = DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let delta_ms = date
        .with_timezone(&Utc)
        .signed_duration_since(now)
        .num_milliseconds();
    Some(delta_ms.max(0) as u64)
}

/// Parse an epoch-seconds reset header into a delay from now.
fn parse_reset_epoch_ms(raw: &str, now: DateTime<Utc>) -> Option<u64> {
    let epoch = raw.trim().parse::<i64>().ok()?;
    let delta_ms = (epoch - now.timestamp()).max(0) as u64;
    Some(delta_ms.saturating_mul(1000))
}

fn server_hint_ms(response: &HttpResponse, config: &FetchConfig) -> Option<u64> {
    let now = Utc::now();
    if let Some(raw) = response.header("retry-after") {
        if let Some(hint) = parse_retry_after_ms(raw, now) {
            return Some(hint);
        }
    }
    if let Some(header) = config.rate_limit_reset_header {
        if let Some(raw) = response.header(header) {
            return parse_reset_epoch_ms(raw, now);
        }
    }
    None
}

fn retry_delay_ms(
    retry: &RetrySettings,
    attempt: u32,
    response: Option<&HttpResponse>,
    config: &FetchConfig,
) -> u64 {
    let mut delay = computed_delay_ms(retry, attempt);
    if let Some(response) = response {
        if let Some(hint) = server_hint_ms(response, config) {
            delay = delay.max(hint);
        }
    }
    delay.min(retry.max_delay_ms)
}

/// GET with the uniform retry/rate-limit algorithm.
///
/// Non-retryable non-2xx statuses fail immediately as `http_error`;
/// transport and parse failures are `fetch_error`; exhausted budgets map to
/// `timeout`, `rate_limited` or `retry_exhausted` after the last attempt's
/// failure mode.
pub fn get_with_retry(
    http: &dyn HttpClient,
    url: &str,
    headers: &[(String, String)],
    config: &FetchConfig,
) -> Result<HttpResponse, ProviderApprovalError> {
    let retry = config.retry;
    let max_attempts = if retry.enabled {
        retry.max_attempts.max(1)
    } else {
        1
    };

    let mut attempts = Vec::new();
    for attempt in 1..=max_attempts {
        match http.get(url, headers, config.timeout) {
            Err(HttpError::Timeout) => {
                if attempt == max_attempts {
                    push_attempt(
                        &mut attempts,
                        AttemptRecord {
                            attempt,
                            status: None,
                            outcome: "timeout".to_string(),
                            delay_ms: None,
                        },
                    );
                    return Err(ProviderApprovalError::new(
                        ApprovalErrorKind::Timeout,
                        format!("request to {} timed out after {} attempt(s)", url, attempt),
                        attempts,
                    ));
                }
                let delay = retry_delay_ms(retry, attempt, None, config);
                push_attempt(
                    &mut attempts,
                    AttemptRecord {
                        attempt,
                        status: None,
                        outcome: "timeout".to_string(),
                        delay_ms: Some(delay),
                    },
                );
                debug!(url, attempt, delay_ms = delay, "retrying after timeout");
                std::thread::sleep(Duration::from_millis(delay));
            }
            Err(HttpError::Transport(message)) => {
                push_attempt(
                    &mut attempts,
                    AttemptRecord {
                        attempt,
                        status: None,
                        outcome: "transport_error".to_string(),
                        delay_ms: None,
                    },
                );
                return Err(ProviderApprovalError::new(
                    ApprovalErrorKind::FetchError,
                    message,
                    attempts,
                ));
            }
            Ok(response) if response.is_success() => {
                return Ok(response);
            }
            Ok(response) => {
                let retryable = response.status == 429
                    || retry.retryable_status_codes.contains(&response.status);
                if !retryable {
                    push_attempt(
                        &mut attempts,
                        AttemptRecord {
                            attempt,
                            status: Some(response.status),
                            outcome: "http_error".to_string(),
                            delay_ms: None,
                        },
                    );
                    return Err(ProviderApprovalError::new(
                        ApprovalErrorKind::HttpError,
                        format!("HTTP {}: {}", response.status, response.body),
                        attempts,
                    ));
                }
                if attempt == max_attempts {
                    push_attempt(
                        &mut attempts,
                        AttemptRecord {
                            attempt,
                            status: Some(response.status),
                            outcome: "retryable_status".to_string(),
                            delay_ms: None,
                        },
                    );
                    let kind = if response.status == 429 {
                        ApprovalErrorKind::RateLimited
                    } else {
                        ApprovalErrorKind::RetryExhausted
                    };
                    return Err(ProviderApprovalError::new(
                        kind,
                        format!(
                            "HTTP {} persisted through {} attempt(s)",
                            response.status, attempt
                        ),
                        attempts,
                    ));
                }
                let delay = retry_delay_ms(retry, attempt, Some(&response), config);
                push_attempt(
                    &mut attempts,
                    AttemptRecord {
                        attempt,
                        status: Some(response.status),
                        outcome: "retryable_status".to_string(),
                        delay_ms: Some(delay),
                    },
                );
                debug!(
                    url,
                    attempt,
                    status = response.status,
                    delay_ms = delay,
                    "retrying after retryable status"
                );
                std::thread::sleep(Duration::from_millis(delay));
            }
        }
    }
    unreachable!("retry loop always returns")
}

/// GET and parse the body as JSON, mapping parse failures to `fetch_error`.
pub fn get_json_with_retry(
    http: &dyn HttpClient,
    url: &str,
    headers: &[(String, String)],
    config: &FetchConfig,
) -> Result<serde_json::Value, ProviderApprovalError> {
    let response = get_with_retry(http, url, headers, config)?;
    serde_json::from_str(&response.body).map_err(|e| {
        ProviderApprovalError::new(
            ApprovalErrorKind::FetchError,
            format!("response is not JSON: {}", e),
            Vec::new(),
        )
    })
}
