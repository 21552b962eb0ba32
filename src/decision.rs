//! Admission decision metadata and response header rendering.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Quota metadata for one admission check.
///
/// `remaining` is always `limit - count` clamped at zero; `retry_after` is
/// present only on denials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Effective ceiling for this request.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// When the current window expires, when known.
    pub reset_at: Option<DateTime<Utc>>,
    /// How long the caller should wait before retrying. Denials only.
    pub retry_after: Option<Duration>,
}

impl Decision {
    pub(crate) fn allowed(limit: u64, remaining: u64, reset_at: Option<DateTime<Utc>>) -> Self {
        Self { allowed: true, limit, remaining, reset_at, retry_after: None }
    }

    pub(crate) fn denied(limit: u64, reset_at: Option<DateTime<Utc>>, retry_after: Duration) -> Self {
        Self { allowed: false, limit, remaining: 0, reset_at, retry_after: Some(retry_after) }
    }

    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Response headers for this decision: `X-RateLimit-Limit` and
    /// `X-RateLimit-Remaining` always, `X-RateLimit-Reset` (RFC 3339) when
    /// the window expiry is known, `Retry-After` (seconds) on denials.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ];
        if let Some(reset_at) = self.reset_at {
            headers.push(("X-RateLimit-Reset", reset_at.to_rfc3339()));
        }
        if let Some(retry_after) = self.retry_after {
            headers.push(("Retry-After", retry_after.as_secs().to_string()));
        }
        headers
    }
}
