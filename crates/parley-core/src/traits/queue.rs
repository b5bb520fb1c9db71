// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable work queue and dead-letter channel.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{DeadLetterEntry, Job, JobSnapshot, NackOutcome, NewJob, QueueCounts};

/// A persistent FIFO of jobs with at-least-once delivery.
///
/// A job is claimed by at most one worker at a time. Jobs sharing a group key
/// are delivered in enqueue order and never concurrently.
#[async_trait]
pub trait QueueAdapter: Send + Sync + 'static {
    /// Adds a job and returns its id.
    async fn enqueue(&self, job: NewJob, now_ms: i64) -> Result<i64, ParleyError>;

    /// Claims the next eligible job, locking it until `now_ms + lock_ms`.
    ///
    /// Every claim carries a fresh [`Job::lease`]. Settling calls made with an
    /// older lease are rejected, so a worker whose claim was reclaimed cannot
    /// complete or fail the job on behalf of its new owner.
    async fn dequeue(
        &self,
        queue: &str,
        now_ms: i64,
        lock_ms: i64,
    ) -> Result<Option<Job>, ParleyError>;

    /// Extends a held claim to `locked_until_ms`. Returns `false` if the lease was lost.
    async fn renew_lease(
        &self,
        job_id: i64,
        lease: i64,
        locked_until_ms: i64,
    ) -> Result<bool, ParleyError>;

    /// Marks a claimed job completed. Returns `false` if the lease was lost.
    async fn ack(&self, job_id: i64, lease: i64, now_ms: i64) -> Result<bool, ParleyError>;

    /// Records a failed attempt. Requeues with exponential delay
    /// (`backoff_base_ms * 2^(n-1)`) or dead-letters once attempts are exhausted.
    async fn nack(
        &self,
        job_id: i64,
        lease: i64,
        error: &str,
        backoff_base_ms: i64,
        now_ms: i64,
    ) -> Result<NackOutcome, ParleyError>;

    /// Moves a claimed job straight to the dead-letter channel, counting this
    /// attempt. Returns `false` if the lease was lost.
    async fn dead_letter(
        &self,
        job_id: i64,
        lease: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool, ParleyError>;

    /// Depth counters for one queue.
    async fn counts(&self, queue: &str, now_ms: i64) -> Result<QueueCounts, ParleyError>;

    /// Most recently failed jobs of one queue.
    async fn failed_jobs(&self, queue: &str, limit: u32) -> Result<Vec<JobSnapshot>, ParleyError>;

    /// Dead-letter entries, most recent first.
    async fn dead_letters(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, ParleyError>;

    /// Dead-letter depth. Only `waiting` is populated.
    async fn dead_letter_counts(&self) -> Result<QueueCounts, ParleyError>;

    /// Removes a dead-letter entry and enqueues a fresh copy of its job with
    /// the attempt counter reset. Returns the new job id, or `None` if absent.
    async fn requeue_dead_letter(
        &self,
        original_job_id: i64,
        now_ms: i64,
    ) -> Result<Option<i64>, ParleyError>;

    /// Returns active jobs whose lock expired to pending. Returns the number reclaimed.
    async fn reclaim_stalled(&self, queue: &str, now_ms: i64) -> Result<u64, ParleyError>;

    /// Deletes completed jobs finished before `completed_before_ms` and
    /// dead-letter entries failed before `dead_letter_before_ms`.
    async fn prune(
        &self,
        completed_before_ms: i64,
        dead_letter_before_ms: i64,
    ) -> Result<u64, ParleyError>;
}
