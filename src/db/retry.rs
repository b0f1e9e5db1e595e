//! Observable connection-retry state
//!
//! One record per pool, updated across a single connection-establishment
//! attempt sequence and surfaced read-only through the health endpoints. The
//! record always describes the most recently started sequence; concurrent
//! borrowers do not coordinate through it.

use crate::error::ConnectError;
use crate::util::utc_now_iso;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;

/// Deterministic exponential backoff: `base * 2^(attempt-1)` seconds, and no
/// delay after the final attempt.
pub fn backoff_delay(base_backoff_s: f64, attempt: u32, max_attempts: u32) -> Duration {
    if attempt >= max_attempts {
        return Duration::ZERO;
    }
    let factor = 2_f64.powi(attempt.saturating_sub(1) as i32);
    Duration::from_secs_f64(base_backoff_s * factor)
}

/// Snapshot of the pool's current connection-establishment attempt sequence
#[derive(Debug, Clone, Serialize)]
pub struct RetryState {
    /// An attempt sequence is currently running
    pub in_progress: bool,
    /// Failed attempts so far in this sequence
    pub attempts: u32,
    /// Attempt budget for this sequence
    pub max_attempts: u32,
    /// Backoff strategy name
    pub strategy: &'static str,
    /// Base backoff in seconds
    pub base_backoff_s: f64,
    /// Redacted text of the most recent failure
    pub last_failure: Option<String>,
    /// Kind name of the most recent failure
    pub last_exception: Option<String>,
    /// When the most recent failure happened (UTC ISO-8601)
    pub last_failure_at: Option<String>,
    /// Seconds until the next retry, if one is scheduled
    pub next_retry_in_s: Option<f64>,
    /// When the next retry fires (UTC ISO-8601)
    pub next_retry_at: Option<String>,
    /// Set when a connect succeeded after at least one failure in this sequence
    pub recovered_at: Option<String>,
    /// The full attempt budget was spent without a success
    pub exhausted: bool,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            in_progress: false,
            attempts: 0,
            max_attempts: 0,
            strategy: "exponential",
            base_backoff_s: 0.0,
            last_failure: None,
            last_exception: None,
            last_failure_at: None,
            next_retry_in_s: None,
            next_retry_at: None,
            recovered_at: None,
            exhausted: false,
        }
    }
}

impl RetryState {
    /// Start a fresh attempt sequence, discarding the previous record.
    pub fn begin(&mut self, max_attempts: u32, base_backoff_s: f64) {
        *self = RetryState {
            in_progress: true,
            max_attempts,
            base_backoff_s,
            ..RetryState::default()
        };
    }

    /// Record one failed attempt and the delay before the next one (zero for
    /// the final attempt).
    pub fn record_failure(&mut self, err: &ConnectError, redacted_message: String, delay: Duration) {
        self.attempts += 1;
        self.last_failure = Some(redacted_message);
        self.last_exception = Some(err.kind_name().to_string());
        self.last_failure_at = Some(utc_now_iso());

        if self.attempts >= self.max_attempts {
            self.exhausted = true;
            self.in_progress = false;
            self.next_retry_in_s = None;
            self.next_retry_at = None;
        } else {
            self.next_retry_in_s = Some(delay.as_secs_f64());
            let fire_at = Utc::now()
                + ChronoDuration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64);
            self.next_retry_at = Some(fire_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        }
    }

    /// Record a successful connect, noting recovery when earlier attempts in
    /// this sequence failed.
    pub fn record_success(&mut self) {
        self.in_progress = false;
        self.exhausted = false;
        self.next_retry_in_s = None;
        self.next_retry_at = None;
        if self.attempts > 0 {
            self.recovered_at = Some(utc_now_iso());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> ConnectError {
        ConnectError::ConnectionRefused {
            host: "db".to_string(),
            port: 5433,
            detail: "refused".to_string(),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles_and_skips_final() {
        let delays: Vec<f64> = (1..=3)
            .map(|attempt| backoff_delay(0.25, attempt, 3).as_secs_f64())
            .collect();
        assert_eq!(delays, vec![0.25, 0.5, 0.0]);
    }

    #[test]
    fn test_backoff_zero_base_never_sleeps() {
        assert_eq!(backoff_delay(0.0, 1, 5), Duration::ZERO);
        assert_eq!(backoff_delay(0.0, 4, 5), Duration::ZERO);
    }

    #[test]
    fn test_single_attempt_budget_has_no_delay() {
        assert_eq!(backoff_delay(1.5, 1, 1), Duration::ZERO);
    }

    #[test]
    fn test_exhaustion_after_full_budget() {
        let mut state = RetryState::default();
        state.begin(3, 0.25);
        for attempt in 1..=3 {
            let delay = backoff_delay(0.25, attempt, 3);
            state.record_failure(&refused(), "refused".to_string(), delay);
        }
        assert_eq!(state.attempts, 3);
        assert!(state.exhausted);
        assert!(!state.in_progress);
        assert!(state.recovered_at.is_none());
        assert!(state.next_retry_at.is_none());
        assert_eq!(state.last_exception.as_deref(), Some("ConnectionRefused"));
    }

    #[test]
    fn test_recovery_after_one_failure() {
        let mut state = RetryState::default();
        state.begin(3, 0.25);
        state.record_failure(&refused(), "refused".to_string(), backoff_delay(0.25, 1, 3));
        assert!(state.in_progress);
        assert_eq!(state.next_retry_in_s, Some(0.25));

        state.record_success();
        assert!(!state.in_progress);
        assert!(!state.exhausted);
        assert!(state.recovered_at.is_some());
    }

    #[test]
    fn test_clean_success_does_not_mark_recovery() {
        let mut state = RetryState::default();
        state.begin(3, 0.5);
        state.record_success();
        assert!(state.recovered_at.is_none());
        assert!(!state.in_progress);
    }

    #[test]
    fn test_begin_discards_previous_sequence() {
        let mut state = RetryState::default();
        state.begin(2, 0.5);
        state.record_failure(&refused(), "refused".to_string(), backoff_delay(0.5, 1, 2));
        state.record_failure(&refused(), "refused".to_string(), backoff_delay(0.5, 2, 2));
        assert!(state.exhausted);

        state.begin(4, 1.0);
        assert!(!state.exhausted);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.max_attempts, 4);
        assert!(state.last_failure.is_none());
    }
}
