// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker metrics.
//!
//! Two layers: [`WorkerMetrics`] is an explicit counter struct owned by the
//! worker engine and logged on an interval and at shutdown; the `metrics`
//! facade receives the same events so any installed recorder can export
//! them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{describe_counter, describe_histogram};
use parley_core::types::FlowEvent;
use tracing::info;

/// Register descriptions for every Parley metric.
///
/// Call once at startup after a recorder is installed; harmless without one.
pub fn register_metrics() {
    describe_counter!("parley_jobs_total", "Jobs finished, by outcome");
    describe_counter!("parley_webhook_total", "Webhook requests, by result");
    describe_counter!("parley_flow_events_total", "Conversation funnel events, by counter key");
    describe_counter!("parley_digest_total", "Digest deliveries, by outcome");
    describe_counter!("parley_rate_limited_total", "Requests denied by rate limiting, by scope");
    describe_histogram!("parley_job_duration_seconds", "Job handling time in seconds");
}

/// How a job attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    DeadLettered,
}

impl JobOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Retried => "retried",
            JobOutcome::DeadLettered => "dead_lettered",
        }
    }
}

pub fn record_flow_events(events: &[FlowEvent]) {
    for event in events {
        metrics::counter!(
            "parley_flow_events_total",
            "key" => event.funnel.counter_key(event.step)
        )
        .increment(1);
    }
}

/// Counters for one worker engine run.
#[derive(Debug)]
pub struct WorkerMetrics {
    started_at: Instant,
    completed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    queue_errors: AtomicU64,
    busy_micros: AtomicU64,
}

/// Point-in-time copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub queue_errors: u64,
    pub busy: Duration,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    pub fn processed(&self) -> u64 {
        self.completed + self.retried + self.dead_lettered
    }

    /// Mean handling time per processed job.
    pub fn mean_duration(&self) -> Option<Duration> {
        let n = self.processed();
        (n > 0).then(|| self.busy / n as u32)
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            completed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            queue_errors: AtomicU64::new(0),
            busy_micros: AtomicU64::new(0),
        }
    }

    pub fn record_job(&self, outcome: JobOutcome, elapsed: Duration) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Retried => &self.retried,
            JobOutcome::DeadLettered => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        metrics::counter!("parley_jobs_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("parley_job_duration_seconds").record(elapsed.as_secs_f64());
    }

    /// A queue operation (dequeue, ack, nack) failed.
    pub fn record_queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
            busy: Duration::from_micros(self.busy_micros.load(Ordering::Relaxed)),
            uptime: self.started_at.elapsed(),
        }
    }

    pub fn log(&self, label: &'static str) {
        let s = self.snapshot();
        info!(
            label,
            processed = s.processed(),
            completed = s.completed,
            retried = s.retried,
            dead_lettered = s.dead_lettered,
            queue_errors = s.queue_errors,
            mean_ms = s.mean_duration().map(|d| d.as_millis() as u64).unwrap_or(0),
            uptime_secs = s.uptime.as_secs(),
            "worker metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_counts_outcomes() {
        let m = WorkerMetrics::new();
        m.record_job(JobOutcome::Completed, Duration::from_millis(10));
        m.record_job(JobOutcome::Completed, Duration::from_millis(30));
        m.record_job(JobOutcome::Retried, Duration::from_millis(20));
        m.record_job(JobOutcome::DeadLettered, Duration::from_millis(40));
        m.record_queue_error();

        let s = m.snapshot();
        assert_eq!(s.completed, 2);
        assert_eq!(s.retried, 1);
        assert_eq!(s.dead_lettered, 1);
        assert_eq!(s.queue_errors, 1);
        assert_eq!(s.processed(), 4);
        assert_eq!(s.mean_duration(), Some(Duration::from_millis(25)));
    }

    #[test]
    fn empty_snapshot_has_no_mean() {
        let s = WorkerMetrics::new().snapshot();
        assert_eq!(s.processed(), 0);
        assert_eq!(s.mean_duration(), None);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(JobOutcome::DeadLettered.as_str(), "dead_lettered");
        register_metrics();
    }
}
