// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local retry loop with per-attempt timeout and jittered exponential backoff.

use std::future::Future;
use std::time::Duration;

use parley_core::ParleyError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::classify;

/// Retry budget and pacing for one external call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied to each attempt independently.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            timeout,
        }
    }

    /// A single attempt with a timeout and no retries.
    pub fn once(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, timeout)
    }

    /// Un-jittered delay before retry number `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) with +/-20% random jitter, still capped at `max_delay`.
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let factor = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((base.as_millis() as f64 * factor) as u64).min(self.max_delay)
    }
}

/// Run `op` under `policy`.
///
/// Each attempt is bounded by `policy.timeout`; an elapsed timeout becomes
/// [`ParleyError::Timeout`]. Retryable errors are retried until the budget
/// is spent. Terminal errors return immediately. Once `cancel` fires, no new
/// attempt starts and an in-flight attempt is dropped: the call returns
/// [`ParleyError::Cancelled`], or the last error if cancellation interrupted
/// a backoff sleep.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    stage: &'static str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ParleyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ParleyError>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(ParleyError::Cancelled { stage });
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(stage, attempt, "attempt abandoned on cancellation");
                return Err(ParleyError::Cancelled { stage });
            }
            result = tokio::time::timeout(policy.timeout, op(attempt)) => match result {
                Ok(result) => result,
                Err(_) => Err(ParleyError::Timeout {
                    duration: policy.timeout,
                }),
            },
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(stage, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !classify(&err).is_retryable() {
            debug!(stage, attempt, error = %err, "terminal error, not retrying");
            return Err(err);
        }
        if attempt >= policy.max_attempts {
            warn!(stage, attempts = attempt, error = %err, "retry budget exhausted");
            return Err(err);
        }

        let delay = policy.backoff_with_jitter(attempt);
        warn!(
            stage,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "call failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(stage, attempt, "retry abandoned on shutdown");
                return Err(err);
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_millis(1_000),
            Duration::from_secs(5),
        )
    }

    fn unavailable() -> ParleyError {
        ParleyError::Provider {
            message: "service unavailable".into(),
            status: Some(503),
            source: None,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff(60), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(5);
        for _ in 0..200 {
            let d = p.backoff_with_jitter(2);
            assert!(d >= Duration::from_millis(160), "{d:?}");
            assert!(d <= Duration::from_millis(240), "{d:?}");
            assert!(p.backoff_with_jitter(10) <= p.max_delay);
        }
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(policy(0).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry(&policy(3), "test", &CancellationToken::new(), |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 { Err(unavailable()) } else { Ok(attempt) }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_on_persistent_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry(&policy(3), "test", &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;
        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry(&policy(3), "test", &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ParleyError::Provider {
                    message: "bad request".into(),
                    status: Some(400),
                    source: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_retry() {
        let p = RetryPolicy::new(
            2,
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry(&p, "slow", &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_backoff() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let token = cancel.clone();
        let result: Result<(), _> = retry(&policy(5), "test", &cancel, |_| {
            let c = c.clone();
            let token = token.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                Err(unavailable())
            }
        })
        .await;
        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_starts_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry(&policy(5), "delivery", &cancel, |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(ParleyError::Cancelled { stage: "delivery" })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: Result<(), _> = retry(&policy(3), "reporter", &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ParleyError::Cancelled { stage: "reporter" }));
        assert!(classify(&err).is_retryable());
        // Well short of the 5s per-attempt timeout.
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
