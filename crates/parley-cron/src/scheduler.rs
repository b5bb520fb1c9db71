// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-trigger cron scheduler.
//!
//! A [`Schedule`] is a cron expression evaluated in a named timezone. The
//! [`Scheduler`] sleeps until the next occurrence, runs its job once, then
//! computes the following occurrence strictly after the one it just ran, so
//! a period can never fire twice.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use parley_core::ParleyError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A cron expression bound to a timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    cron: Cron,
    tz: Tz,
}

impl Schedule {
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, ParleyError> {
        let cron = expression.parse::<Cron>().map_err(|e| {
            ParleyError::Config(format!("invalid cron expression \"{expression}\": {e}"))
        })?;
        let tz = Tz::from_str(timezone)
            .map_err(|_| ParleyError::Config(format!("unknown timezone \"{timezone}\"")))?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
            tz,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.tz);
        self.cron
            .find_next_occurrence(&local, false)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Work run on every schedule occurrence.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// `fired_at` is the occurrence being served, not the wall clock.
    async fn run(&self, fired_at: DateTime<Utc>, cancel: &CancellationToken)
    -> Result<(), ParleyError>;
}

pub struct Scheduler {
    schedule: Schedule,
    job: Arc<dyn ScheduledJob>,
}

impl Scheduler {
    pub fn new(schedule: Schedule, job: Arc<dyn ScheduledJob>) -> Self {
        Self { schedule, job }
    }

    /// Runs until `shutdown` is cancelled. A job run in progress is awaited.
    pub async fn run(&self, shutdown: CancellationToken) {
        let job = self.job.name();
        info!(
            job,
            schedule = %self.schedule.expression,
            timezone = %self.schedule.tz,
            "scheduler started"
        );

        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last_fired.map_or(now, |last| last.max(now));
            let Some(next) = self.schedule.next_after(from) else {
                warn!(job, "schedule has no future occurrence, scheduler stopping");
                return;
            };

            let wait = (next - now).to_std().unwrap_or_default();
            debug!(job, next = %next, wait_secs = wait.as_secs(), "waiting for next occurrence");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            last_fired = Some(next);
            info!(job, fired_at = %next, "scheduled job firing");
            if let Err(e) = self.job.run(next, &shutdown).await {
                error!(job, error = %e, "scheduled job failed");
            }
        }

        info!(job, "scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn next_occurrence_respects_timezone() {
        let schedule = Schedule::parse("0 9 * * *", "Europe/Berlin").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 15, 7, 30, 0).unwrap();
        // 09:00 CET is 08:00 UTC in winter.
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap())
        );

        let after = Utc.with_ymd_and_hms(2026, 7, 15, 7, 30, 0).unwrap();
        // 09:00 CEST is 07:00 UTC in summer, already past.
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 7, 16, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let schedule = Schedule::parse("0 9 * * *", "UTC").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(at),
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            Schedule::parse("not a cron", "UTC"),
            Err(ParleyError::Config(_))
        ));
        assert!(matches!(
            Schedule::parse("0 9 * * *", "Mars/Olympus"),
            Err(ParleyError::Config(_))
        ));
    }

    struct Recorder {
        fired: Mutex<Vec<DateTime<Utc>>>,
        stop_after: usize,
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl ScheduledJob for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn run(
            &self,
            fired_at: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> Result<(), ParleyError> {
            let mut fired = self.fired.lock().unwrap();
            fired.push(fired_at);
            if fired.len() >= self.stop_after {
                self.shutdown.cancel();
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_occurrence_fires_once() {
        let shutdown = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            fired: Mutex::new(Vec::new()),
            stop_after: 3,
            shutdown: shutdown.clone(),
        });
        let scheduler = Scheduler::new(
            Schedule::parse("* * * * *", "UTC").unwrap(),
            recorder.clone(),
        );

        scheduler.run(shutdown).await;

        let fired = recorder.fired.lock().unwrap().clone();
        assert_eq!(fired.len(), 3);
        for pair in fired.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_seconds(), 60);
        }
    }

    #[tokio::test]
    async fn shutdown_stops_a_waiting_scheduler() {
        let shutdown = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            fired: Mutex::new(Vec::new()),
            stop_after: usize::MAX,
            shutdown: shutdown.clone(),
        });
        // Once a year: never fires during the test.
        let scheduler = Scheduler::new(
            Schedule::parse("0 0 1 1 *", "UTC").unwrap(),
            recorder.clone(),
        );

        shutdown.cancel();
        scheduler.run(shutdown).await;
        assert!(recorder.fired.lock().unwrap().is_empty());
    }
}
