//! Retry timing for provider requests: which statuses retry, exponential
//! backoff with bounded jitter, `Retry-After` honoring and a total budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

pub const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_SHIFT: usize = 6;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `RetryPolicy` shared by provider clients.
pub struct RetryPolicy {
    pub max_retries: usize,
    /// Total wall-clock budget across attempts; `0` disables the budget.
    pub budget_ms: u64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn should_retry_status(&self, attempt: usize, status: u16) -> bool {
        attempt < self.max_retries && is_retryable_status(status)
    }

    pub fn should_retry_error(&self, attempt: usize, error: &reqwest::Error) -> bool {
        attempt < self.max_retries && is_retryable_http_error(error)
    }

    /// Delay before the next attempt, or `None` when the budget would be exceeded.
    pub fn next_delay_ms(
        &self,
        attempt: usize,
        elapsed_ms: u64,
        retry_after_ms: Option<u64>,
    ) -> Option<u64> {
        let backoff_ms = backoff_ms_with_jitter(attempt, self.jitter);
        let delay_ms = retry_after_ms.map_or(backoff_ms, |floor| backoff_ms.max(floor));
        if self.budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= self.budget_ms {
            Some(delay_ms)
        } else {
            None
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub fn backoff_ms(attempt: usize) -> u64 {
    BASE_BACKOFF_MS.saturating_mul(1_u64 << attempt.min(MAX_BACKOFF_SHIFT))
}

/// Jittered backoff in `[50%, 100%]` of the deterministic value.
pub fn backoff_ms_with_jitter(attempt: usize, jitter: bool) -> u64 {
    let base = backoff_ms(attempt);
    if !jitter || base <= 1 {
        return base;
    }
    let low = base / 2;
    let width = base - low;
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    low + mixed % (width + 1)
}

pub fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at
        .signed_duration_since(Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("aisle-{millis}-{count}")
}
