// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable work queue with per-group FIFO, lock deadlines and bounded retries.

use std::str::FromStr;

use parley_core::ParleyError;
use parley_core::types::{Job, JobSnapshot, JobStatus, NackOutcome, NewJob, QueueCounts};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

const JOB_COLUMNS: &str =
    "id, queue_name, group_key, payload, status, attempts_made, max_attempts, enqueued_at_ms, lease";

/// Insert a pending job on an open connection or transaction.
pub(crate) fn insert_job(
    conn: &rusqlite::Connection,
    job: &NewJob,
    now_ms: i64,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO jobs (queue_name, group_key, payload, max_attempts,
                           enqueued_at_ms, available_at_ms, updated_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
        params![job.queue_name, job.group_key, job.payload, job.max_attempts, now_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

fn job_from_row(row: &rusqlite::Row<'_>) -> Result<Job, rusqlite::Error> {
    let status: String = row.get(4)?;
    let status = JobStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Job {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        group_key: row.get(2)?,
        payload: row.get(3)?,
        status,
        attempts_made: row.get(5)?,
        max_attempts: row.get(6)?,
        enqueued_at_ms: row.get(7)?,
        lease: row.get(8)?,
    })
}

/// Queue-level retry delay for the `attempts_made`-th failure: `base * 2^(n-1)`.
pub fn backoff_delay_ms(backoff_base_ms: i64, attempts_made: u32) -> i64 {
    let exponent = attempts_made.saturating_sub(1).min(20);
    backoff_base_ms.saturating_mul(1_i64 << exponent)
}

/// Enqueue a new job. Returns the auto-generated job id.
pub async fn enqueue(db: &Database, job: NewJob, now_ms: i64) -> Result<i64, ParleyError> {
    db.connection()
        .call(move |conn| insert_job(conn, &job, now_ms))
        .await
        .map_err(map_tr_err)
}

/// Claim the next eligible job from the named queue.
///
/// A job is eligible when it is pending, its backoff delay has elapsed, and
/// no job of the same group is active or was enqueued before it and is still
/// unfinished. The claimed job is marked active, locked until
/// `now_ms + lock_ms`, and handed a new lease. Returns `None` if nothing is
/// eligible.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    now_ms: i64,
    lock_ms: i64,
) -> Result<Option<Job>, ParleyError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let job = tx
                .query_row(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM jobs j
                         WHERE j.queue_name = ?1
                           AND j.status = 'pending'
                           AND j.available_at_ms <= ?2
                           AND NOT EXISTS (
                               SELECT 1 FROM jobs o
                               WHERE o.queue_name = j.queue_name
                                 AND o.group_key = j.group_key
                                 AND (o.status = 'active'
                                      OR (o.status = 'pending' AND o.id < j.id))
                           )
                         ORDER BY j.id ASC
                         LIMIT 1"
                    ),
                    params![queue_name, now_ms],
                    job_from_row,
                )
                .optional()?;

            let Some(job) = job else {
                return Ok(None);
            };

            let lease: i64 = tx.query_row(
                "UPDATE jobs SET status = 'active', locked_until_ms = ?1, updated_at_ms = ?2,
                                 lease = lease + 1
                 WHERE id = ?3
                 RETURNING lease",
                params![now_ms + lock_ms, now_ms, job.id],
                |row| row.get(0),
            )?;
            tx.commit()?;

            Ok(Some(Job {
                status: JobStatus::Active,
                lease,
                ..job
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Push the lock deadline of a held claim. Returns `false` if the job is no
/// longer active under `lease`.
pub async fn renew_lease(
    db: &Database,
    job_id: i64,
    lease: i64,
    locked_until_ms: i64,
) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE jobs SET locked_until_ms = ?1
                 WHERE id = ?2 AND lease = ?3 AND status = 'active'",
                params![locked_until_ms, job_id, lease],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an active job completed. Returns `false` if the job is no longer
/// active under `lease` (its lock expired and it was reclaimed).
pub async fn ack(db: &Database, job_id: i64, lease: i64, now_ms: i64) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE jobs SET status = 'completed', locked_until_ms = NULL,
                                 finished_at_ms = ?1, updated_at_ms = ?1
                 WHERE id = ?2 AND lease = ?3 AND status = 'active'",
                params![now_ms, job_id, lease],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

struct FailingJob {
    queue_name: String,
    group_key: String,
    payload: String,
    attempts_made: u32,
    max_attempts: u32,
}

/// Load a job still claimed under `lease`.
fn load_failing_job(
    tx: &rusqlite::Transaction<'_>,
    job_id: i64,
    lease: i64,
) -> Result<Option<FailingJob>, rusqlite::Error> {
    tx.query_row(
        "SELECT queue_name, group_key, payload, attempts_made, max_attempts
         FROM jobs WHERE id = ?1 AND lease = ?2 AND status = 'active'",
        params![job_id, lease],
        |row| {
            Ok(FailingJob {
                queue_name: row.get(0)?,
                group_key: row.get(1)?,
                payload: row.get(2)?,
                attempts_made: row.get(3)?,
                max_attempts: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Mark the job failed and push its dead-letter entry.
fn move_to_dead_letter(
    tx: &rusqlite::Transaction<'_>,
    job_id: i64,
    job: &FailingJob,
    attempts_made: u32,
    error: &str,
    now_ms: i64,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "UPDATE jobs SET status = 'failed', attempts_made = ?1, last_error = ?2,
                         locked_until_ms = NULL, finished_at_ms = ?3, updated_at_ms = ?3
         WHERE id = ?4",
        params![attempts_made, error, now_ms, job_id],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO dead_letters
             (original_job_id, original_queue, group_key, attempts_made, max_attempts,
              failed_at_ms, error_message, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            job_id,
            job.queue_name,
            job.group_key,
            attempts_made,
            job.max_attempts,
            now_ms,
            error,
            job.payload
        ],
    )?;
    Ok(())
}

/// Record a failed attempt.
///
/// Below the attempt ceiling the job returns to pending and becomes visible
/// again after [`backoff_delay_ms`]. At the ceiling it is marked failed and
/// moved to the dead-letter channel in the same transaction. A caller that
/// no longer holds `lease` gets [`NackOutcome::LeaseLost`] and changes nothing.
pub async fn nack(
    db: &Database,
    job_id: i64,
    lease: i64,
    error: &str,
    backoff_base_ms: i64,
    now_ms: i64,
) -> Result<NackOutcome, ParleyError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(job) = load_failing_job(&tx, job_id, lease)? else {
                return Ok(NackOutcome::LeaseLost);
            };

            let attempts_made = job.attempts_made + 1;
            let outcome = if attempts_made < job.max_attempts {
                let delay_ms = backoff_delay_ms(backoff_base_ms, attempts_made);
                tx.execute(
                    "UPDATE jobs SET status = 'pending', attempts_made = ?1, last_error = ?2,
                                     available_at_ms = ?3, locked_until_ms = NULL,
                                     updated_at_ms = ?4
                     WHERE id = ?5",
                    params![attempts_made, error, now_ms + delay_ms, now_ms, job_id],
                )?;
                NackOutcome::Retrying {
                    attempts_made,
                    delay_ms,
                }
            } else {
                move_to_dead_letter(&tx, job_id, &job, attempts_made, &error, now_ms)?;
                NackOutcome::DeadLettered { attempts_made }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Dead-letter a claimed job immediately, counting the current attempt.
/// Returns `false` if the job is no longer active under `lease`.
pub async fn dead_letter(
    db: &Database,
    job_id: i64,
    lease: i64,
    error: &str,
    now_ms: i64,
) -> Result<bool, ParleyError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(job) = load_failing_job(&tx, job_id, lease)? else {
                return Ok(false);
            };
            move_to_dead_letter(&tx, job_id, &job, job.attempts_made + 1, &error, now_ms)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Depth counters for one queue. `waiting` excludes jobs still in backoff,
/// which are reported as `delayed`.
pub async fn counts(db: &Database, queue_name: &str, now_ms: i64) -> Result<QueueCounts, ParleyError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let counts = conn.query_row(
                "SELECT
                     COALESCE(SUM(status = 'pending' AND available_at_ms <= ?2), 0),
                     COALESCE(SUM(status = 'active'), 0),
                     COALESCE(SUM(status = 'completed'), 0),
                     COALESCE(SUM(status = 'failed'), 0),
                     COALESCE(SUM(status = 'pending' AND available_at_ms > ?2), 0)
                 FROM jobs WHERE queue_name = ?1",
                params![queue_name, now_ms],
                |row| {
                    Ok(QueueCounts {
                        waiting: row.get::<_, i64>(0)? as u64,
                        active: row.get::<_, i64>(1)? as u64,
                        completed: row.get::<_, i64>(2)? as u64,
                        failed: row.get::<_, i64>(3)? as u64,
                        delayed: row.get::<_, i64>(4)? as u64,
                    })
                },
            )?;
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently failed jobs of one queue.
pub async fn failed_jobs(
    db: &Database,
    queue_name: &str,
    limit: u32,
) -> Result<Vec<JobSnapshot>, ParleyError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, queue_name, attempts_made, last_error, finished_at_ms, payload
                 FROM jobs
                 WHERE queue_name = ?1 AND status = 'failed'
                 ORDER BY finished_at_ms DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![queue_name, limit], |row| {
                let payload: String = row.get(5)?;
                Ok(JobSnapshot {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    attempts_made: row.get(2)?,
                    failed_reason: row.get(3)?,
                    timestamp: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    data: JobSnapshot::payload_value(&payload),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Load a job by id, regardless of status.
pub async fn get_job(db: &Database, job_id: i64) -> Result<Option<Job>, ParleyError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                job_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Return active jobs whose lock deadline passed to pending.
///
/// Attempts are not counted: a stalled job was interrupted, not failed.
pub async fn reclaim_stalled(db: &Database, queue_name: &str, now_ms: i64) -> Result<u64, ParleyError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let reclaimed = conn.execute(
                "UPDATE jobs SET status = 'pending', locked_until_ms = NULL, updated_at_ms = ?2
                 WHERE queue_name = ?1 AND status = 'active' AND locked_until_ms <= ?2",
                params![queue_name, now_ms],
            )?;
            Ok(reclaimed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete completed jobs finished before `completed_before_ms`, and failed
/// jobs plus dead-letter entries older than `dead_letter_before_ms`.
pub async fn prune(
    db: &Database,
    completed_before_ms: i64,
    dead_letter_before_ms: i64,
) -> Result<u64, ParleyError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let completed = tx.execute(
                "DELETE FROM jobs WHERE status = 'completed' AND finished_at_ms < ?1",
                params![completed_before_ms],
            )?;
            let failed = tx.execute(
                "DELETE FROM jobs WHERE status = 'failed' AND finished_at_ms < ?1",
                params![dead_letter_before_ms],
            )?;
            let dead = tx.execute(
                "DELETE FROM dead_letters WHERE failed_at_ms < ?1",
                params![dead_letter_before_ms],
            )?;
            tx.commit()?;
            Ok((completed + failed + dead) as u64)
        })
        .await
        .map_err(map_tr_err)
}
