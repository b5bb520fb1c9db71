// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency ledger: a durable set of accepted provider update ids.
//!
//! Both entry points rely on `INSERT OR IGNORE` against the primary key, so
//! concurrent deliveries of the same update can never both observe "absent".

use parley_core::ParleyError;
use parley_core::types::NewJob;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::queries::queue::insert_job;

/// Record `update_id` as processed. Returns `true` only for the first caller.
pub async fn mark_processed(db: &Database, update_id: i64, now_ms: i64) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO processed_updates (update_id, processed_at_ms) VALUES (?1, ?2)",
                params![update_id, now_ms],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// True if `update_id` is already in the ledger.
pub async fn is_processed(db: &Database, update_id: i64) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM processed_updates WHERE update_id = ?1)",
                params![update_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the update and enqueue its job in one transaction.
///
/// Returns the job id, or `None` when the update was already in the ledger
/// (nothing is enqueued in that case).
pub async fn accept(
    db: &Database,
    update_id: i64,
    job: NewJob,
    now_ms: i64,
) -> Result<Option<i64>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO processed_updates (update_id, processed_at_ms) VALUES (?1, ?2)",
                params![update_id, now_ms],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let job_id = insert_job(&tx, &job, now_ms)?;
            tx.commit()?;
            Ok(Some(job_id))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::queue;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn job(chat: i64) -> NewJob {
        NewJob {
            queue_name: "inbound".into(),
            group_key: chat.to_string(),
            payload: format!(r#"{{"updateId":1,"chatId":{chat},"userId":1}}"#),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn mark_processed_first_caller_wins() {
        let (db, _dir) = setup_db().await;
        assert!(mark_processed(&db, 42, 1_000).await.unwrap());
        assert!(!mark_processed(&db, 42, 2_000).await.unwrap());
        assert!(is_processed(&db, 42).await.unwrap());
        assert!(!is_processed(&db, 43).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_marks_have_single_winner() {
        let (db, _dir) = setup_db().await;
        let mut handles = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                mark_processed(&db, 7, 1_000).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn accept_enqueues_exactly_once() {
        let (db, _dir) = setup_db().await;

        let first = accept(&db, 100, job(5), 1_000).await.unwrap();
        assert!(first.is_some());
        let second = accept(&db, 100, job(5), 1_001).await.unwrap();
        assert_eq!(second, None);

        let counts = queue::counts(&db, "inbound", 2_000).await.unwrap();
        assert_eq!(counts.waiting, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn accept_after_mark_processed_is_duplicate() {
        let (db, _dir) = setup_db().await;
        assert!(mark_processed(&db, 9, 1_000).await.unwrap());
        assert_eq!(accept(&db, 9, job(1), 1_000).await.unwrap(), None);
        let counts = queue::counts(&db, "inbound", 2_000).await.unwrap();
        assert_eq!(counts.waiting, 0);
        db.close().await.unwrap();
    }
}
