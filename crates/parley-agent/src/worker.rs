// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker engine.
//!
//! A fixed number of worker loops claim jobs from the durable queue and hand
//! them to a [`JobHandler`]. The handler's result decides the job's fate:
//!
//! - `Ok` acks the job.
//! - A retryable error nacks it; the queue reschedules with exponential delay
//!   or dead-letters it once `max_attempts` is reached.
//! - A terminal error dead-letters it immediately.
//!
//! While the handler runs, the slot renews the job's lease every third of
//! the lock timeout. If renewal finds the lease gone, the handler is
//! cancelled and its result is discarded.
//!
//! A maintenance loop reclaims jobs whose lock expired, prunes finished rows
//! and logs [`WorkerMetrics`]. On shutdown the engine stops claiming, waits
//! up to `shutdown_timeout` for in-flight jobs, then cancels them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley_config::model::QueueConfig;
use parley_core::types::{Job, NackOutcome};
use parley_core::{ParleyError, QueueAdapter, StorageAdapter, now_ms};
use parley_resilience::classify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::telemetry::{JobOutcome, WorkerMetrics};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(50);

/// Processes one claimed job.
///
/// `cancel` fires when the engine gives up waiting for in-flight work during
/// shutdown; long waits inside the handler should observe it.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ParleyError>;
}

struct Shared {
    queue: Arc<dyn QueueAdapter>,
    storage: Option<Arc<dyn StorageAdapter + Send + Sync>>,
    handler: Arc<dyn JobHandler>,
    config: QueueConfig,
    metrics: Arc<WorkerMetrics>,
}

/// Runs worker loops against one named queue.
pub struct WorkerEngine {
    shared: Arc<Shared>,
}

impl WorkerEngine {
    pub fn new(
        queue: Arc<dyn QueueAdapter>,
        handler: Arc<dyn JobHandler>,
        config: QueueConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                storage: None,
                handler,
                config,
                metrics: Arc::new(WorkerMetrics::new()),
            }),
        }
    }

    /// Also prune expired rate-limit windows during maintenance.
    pub fn with_storage(
        queue: Arc<dyn QueueAdapter>,
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        handler: Arc<dyn JobHandler>,
        config: QueueConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                storage: Some(storage),
                handler,
                config,
                metrics: Arc::new(WorkerMetrics::new()),
            }),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Runs until `shutdown` is cancelled and in-flight jobs have drained.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ParleyError> {
        let config = &self.shared.config;

        // This process is the only consumer, so anything still active was
        // orphaned by a previous run.
        let reclaimed = self
            .shared
            .queue
            .reclaim_stalled(&config.name, i64::MAX)
            .await?;
        if reclaimed > 0 {
            warn!(queue = %config.name, reclaimed, "reclaimed jobs left active by a previous run");
        }

        let abort = CancellationToken::new();
        let tracker = TaskTracker::new();
        for slot in 0..config.concurrency.max(1) {
            tracker.spawn(worker_loop(
                Arc::clone(&self.shared),
                slot,
                shutdown.clone(),
                abort.clone(),
            ));
        }
        tracker.spawn(maintenance_loop(Arc::clone(&self.shared), shutdown.clone()));
        tracker.close();

        info!(
            queue = %config.name,
            concurrency = config.concurrency,
            max_attempts = config.max_attempts,
            "worker engine started"
        );

        shutdown.cancelled().await;
        info!(
            timeout_secs = config.shutdown_timeout_secs,
            "worker engine draining in-flight jobs"
        );

        if tokio::time::timeout(config.shutdown_timeout(), tracker.wait())
            .await
            .is_err()
        {
            warn!("drain timeout reached, cancelling in-flight jobs");
            abort.cancel();
            tracker.wait().await;
        }

        self.shared.metrics.log("shutdown");
        info!("worker engine stopped");
        Ok(())
    }
}

async fn worker_loop(
    shared: Arc<Shared>,
    slot: usize,
    shutdown: CancellationToken,
    abort: CancellationToken,
) {
    let config = &shared.config;
    let lock_ms = (config.lock_timeout_secs as i64).saturating_mul(1000);
    debug!(slot, "worker slot started");

    while !shutdown.is_cancelled() {
        match shared.queue.dequeue(&config.name, now_ms(), lock_ms).await {
            Ok(Some(job)) => process_job(&shared, job, lock_ms, &abort).await,
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval()) => {}
                }
            }
            Err(e) => {
                error!(slot, error = %e, "dequeue failed");
                shared.metrics.record_queue_error();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval()) => {}
                }
            }
        }
    }

    debug!(slot, "worker slot stopped");
}

/// Run the handler while keeping the job's lease alive.
///
/// Returns `None` when the lease was lost mid-run.
async fn run_leased(
    shared: &Shared,
    job: &Job,
    lock_ms: i64,
    cancel: &CancellationToken,
) -> Option<Result<(), ParleyError>> {
    let job_cancel = cancel.child_token();
    let every = Duration::from_millis((lock_ms / 3).max(0) as u64).max(MIN_RENEW_INTERVAL);
    let mut renew = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let handle = shared.handler.handle(job, &job_cancel);
    tokio::pin!(handle);
    let mut lost = false;
    let result = loop {
        tokio::select! {
            result = &mut handle => break result,
            _ = renew.tick(), if !lost => {
                match shared.queue.renew_lease(job.id, job.lease, now_ms() + lock_ms).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = job.id, lease = job.lease, "job lease lost, abandoning run");
                        lost = true;
                        job_cancel.cancel();
                    }
                    Err(e) => {
                        warn!(job_id = job.id, error = %e, "lease renewal failed");
                        shared.metrics.record_queue_error();
                    }
                }
            }
        }
    };

    if lost { None } else { Some(result) }
}

async fn process_job(shared: &Shared, job: Job, lock_ms: i64, cancel: &CancellationToken) {
    let started = Instant::now();
    debug!(
        job_id = job.id,
        group = %job.group_key,
        attempt = job.attempt(),
        max_attempts = job.max_attempts,
        lease = job.lease,
        "job claimed"
    );

    let Some(result) = run_leased(shared, &job, lock_ms, cancel).await else {
        return;
    };
    let elapsed = started.elapsed();
    let queue = &shared.queue;

    match result {
        Ok(()) => match queue.ack(job.id, job.lease, now_ms()).await {
            Ok(true) => {
                shared.metrics.record_job(JobOutcome::Completed, elapsed);
                debug!(job_id = job.id, elapsed_ms = elapsed.as_millis() as u64, "job completed");
            }
            Ok(false) => warn!(job_id = job.id, "job lease lost before ack, result discarded"),
            Err(e) => {
                error!(job_id = job.id, error = %e, "ack failed");
                shared.metrics.record_queue_error();
            }
        },
        Err(err) if classify(&err).is_retryable() => {
            let backoff_base_ms = shared.config.backoff_base_ms as i64;
            match queue
                .nack(job.id, job.lease, &err.to_string(), backoff_base_ms, now_ms())
                .await
            {
                Ok(NackOutcome::Retrying {
                    attempts_made,
                    delay_ms,
                }) => {
                    shared.metrics.record_job(JobOutcome::Retried, elapsed);
                    warn!(
                        job_id = job.id,
                        attempts_made,
                        max_attempts = job.max_attempts,
                        delay_ms,
                        error = %err,
                        "job failed, retry scheduled"
                    );
                }
                Ok(NackOutcome::DeadLettered { attempts_made }) => {
                    shared.metrics.record_job(JobOutcome::DeadLettered, elapsed);
                    error!(
                        job_id = job.id,
                        attempts_made,
                        error = %err,
                        "job exhausted its attempts, moved to dead-letter queue"
                    );
                }
                Ok(NackOutcome::LeaseLost) => {
                    warn!(job_id = job.id, error = %err, "job lease lost before nack, failure discarded");
                }
                Err(e) => {
                    error!(job_id = job.id, error = %e, "nack failed");
                    shared.metrics.record_queue_error();
                }
            }
        }
        Err(err) => match queue.dead_letter(job.id, job.lease, &err.to_string(), now_ms()).await {
            Ok(true) => {
                shared.metrics.record_job(JobOutcome::DeadLettered, elapsed);
                error!(
                    job_id = job.id,
                    attempt = job.attempt(),
                    error = %err,
                    "job failed with a terminal error, moved to dead-letter queue"
                );
            }
            Ok(false) => {
                warn!(job_id = job.id, error = %err, "job lease lost before dead-lettering");
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "dead-letter failed");
                shared.metrics.record_queue_error();
            }
        },
    }
}

async fn maintenance_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let period = shared.config.metrics_interval().max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => run_maintenance(&shared).await,
        }
    }
}

async fn run_maintenance(shared: &Shared) {
    let config = &shared.config;
    let now = now_ms();

    match shared.queue.reclaim_stalled(&config.name, now).await {
        Ok(0) => {}
        Ok(n) => warn!(reclaimed = n, "reclaimed jobs with expired locks"),
        Err(e) => {
            error!(error = %e, "stalled job reclaim failed");
            shared.metrics.record_queue_error();
        }
    }

    let completed_before = now - config.completed_retention_hours as i64 * MS_PER_HOUR;
    let dead_letter_before = now - config.dead_letter_retention_days as i64 * MS_PER_DAY;
    match shared.queue.prune(completed_before, dead_letter_before).await {
        Ok(0) => {}
        Ok(n) => debug!(pruned = n, "pruned finished jobs"),
        Err(e) => warn!(error = %e, "queue prune failed"),
    }

    if let Some(storage) = &shared.storage {
        match storage.prune_rate_limits(now).await {
            Ok(0) => {}
            Ok(n) => debug!(pruned = n, "pruned expired rate-limit windows"),
            Err(e) => warn!(error = %e, "rate-limit prune failed"),
        }
    }

    shared.metrics.log("interval");
}
