// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter channel: quarantined jobs and their manual replay.
//!
//! Entries are written by the queue's nack/dead-letter paths; this module
//! covers reads and the atomic requeue.

use parley_core::ParleyError;
use parley_core::types::{DeadLetterEntry, NewJob, QueueCounts};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::queue::insert_job;

/// Dead-letter entries, most recently failed first.
pub async fn list(db: &Database, limit: u32) -> Result<Vec<DeadLetterEntry>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT original_job_id, original_queue, group_key, attempts_made,
                        failed_at_ms, error_message, payload
                 FROM dead_letters
                 ORDER BY failed_at_ms DESC, original_job_id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(DeadLetterEntry {
                    original_job_id: row.get(0)?,
                    original_queue: row.get(1)?,
                    group_key: row.get(2)?,
                    attempts_made: row.get(3)?,
                    failed_at_ms: row.get(4)?,
                    error_message: row.get(5)?,
                    payload: row.get(6)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Dead-letter depth, reported in `waiting`.
pub async fn counts(db: &Database) -> Result<QueueCounts, ParleyError> {
    db.connection()
        .call(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
            Ok(QueueCounts {
                waiting: total as u64,
                ..QueueCounts::default()
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the entry for `original_job_id` and enqueue a fresh job with its
/// payload on the original queue, attempts reset, in one transaction.
///
/// Returns the new job id, or `None` when no such entry exists (already
/// requeued or pruned). Calling it twice enqueues at most once.
pub async fn requeue(
    db: &Database,
    original_job_id: i64,
    now_ms: i64,
) -> Result<Option<i64>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let entry = tx
                .query_row(
                    "SELECT original_queue, group_key, payload, max_attempts
                     FROM dead_letters WHERE original_job_id = ?1",
                    params![original_job_id],
                    |row| {
                        Ok(NewJob {
                            queue_name: row.get(0)?,
                            group_key: row.get(1)?,
                            payload: row.get(2)?,
                            max_attempts: row.get(3)?,
                        })
                    },
                )
                .optional()?;

            let Some(job) = entry else {
                return Ok(None);
            };

            tx.execute(
                "DELETE FROM dead_letters WHERE original_job_id = ?1",
                params![original_job_id],
            )?;
            let job_id = insert_job(&tx, &job, now_ms)?;
            tx.commit()?;
            Ok(Some(job_id))
        })
        .await
        .map_err(map_tr_err)
}
