// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window rate-limit counters.
//!
//! Increment, window reset and expiry are one `INSERT .. ON CONFLICT DO UPDATE
//! .. RETURNING` statement, so concurrent callers can never lose an update.

use parley_core::ParleyError;
use parley_core::types::RateLimitDecision;
use rusqlite::params;

use crate::database::{Database, map_tr_err};

/// Consume one request from the window identified by `key`.
///
/// The first request of a window sets the count to 1 and the expiry to
/// `now_ms + window_ms`. Requests are denied once the count exceeds `limit`.
pub async fn consume(
    db: &Database,
    key: &str,
    limit: u32,
    window_ms: i64,
    now_ms: i64,
) -> Result<RateLimitDecision, ParleyError> {
    let key = key.to_string();
    let (count, expires_at_ms) = db
        .connection()
        .call(move |conn| {
            let row: (i64, i64) = conn.query_row(
                "INSERT INTO rate_limits (key, window_ms, count, expires_at_ms)
                 VALUES (?1, ?2, 1, ?3 + ?2)
                 ON CONFLICT (key) DO UPDATE SET
                     count = CASE WHEN rate_limits.expires_at_ms <= ?3
                                  THEN 1 ELSE rate_limits.count + 1 END,
                     expires_at_ms = CASE WHEN rate_limits.expires_at_ms <= ?3
                                          THEN ?3 + ?2 ELSE rate_limits.expires_at_ms END,
                     window_ms = ?2
                 RETURNING count, expires_at_ms",
                params![key, window_ms, now_ms],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)?;

    Ok(decide(count, expires_at_ms, limit, now_ms))
}

fn decide(count: i64, expires_at_ms: i64, limit: u32, now_ms: i64) -> RateLimitDecision {
    let allowed = count <= i64::from(limit);
    let retry_after_secs = if allowed {
        0
    } else {
        let remaining_ms = (expires_at_ms - now_ms).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    };
    RateLimitDecision {
        allowed,
        count: count.clamp(0, i64::from(u32::MAX)) as u32,
        retry_after_secs,
    }
}

/// Delete counters whose window has ended. Returns the number removed.
pub async fn prune_expired(db: &Database, now_ms: i64) -> Result<u64, ParleyError> {
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM rate_limits WHERE expires_at_ms <= ?1",
                params![now_ms],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn denies_request_over_limit_until_window_ends() {
        let (db, _dir) = setup_db().await;
        let start = 1_000_000;

        for i in 1..=3 {
            let d = consume(&db, "webhook:10.0.0.1", 3, 60_000, start + i).await.unwrap();
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.count, i as u32);
            assert_eq!(d.retry_after_secs, 0);
        }

        let denied = consume(&db, "webhook:10.0.0.1", 3, 60_000, start + 10_000)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 4);
        assert_eq!(denied.retry_after_secs, 51);

        let next_window = consume(&db, "webhook:10.0.0.1", 3, 60_000, start + 60_001)
            .await
            .unwrap();
        assert!(next_window.allowed);
        assert_eq!(next_window.count, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let (db, _dir) = setup_db().await;
        assert!(consume(&db, "admin:1.1.1.1", 1, 1_000, 0).await.unwrap().allowed);
        assert!(!consume(&db, "admin:1.1.1.1", 1, 1_000, 1).await.unwrap().allowed);
        assert!(consume(&db, "webhook:1.1.1.1", 1, 1_000, 1).await.unwrap().allowed);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_consumers_do_not_lose_updates() {
        let (db, _dir) = setup_db().await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                consume(&db, "webhook:burst", 10, 60_000, 5_000).await.unwrap()
            }));
        }
        let mut allowed = 0;
        let mut counts = Vec::new();
        for handle in handles {
            let d = handle.await.unwrap();
            if d.allowed {
                allowed += 1;
            }
            counts.push(d.count);
        }
        counts.sort_unstable();
        assert_eq!(allowed, 10);
        assert_eq!(counts, (1..=20).collect::<Vec<u32>>());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prune_removes_only_expired() {
        let (db, _dir) = setup_db().await;
        consume(&db, "a", 5, 1_000, 0).await.unwrap();
        consume(&db, "b", 5, 10_000, 0).await.unwrap();
        assert_eq!(prune_expired(&db, 1_000).await.unwrap(), 1);
        assert_eq!(prune_expired(&db, 1_000).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[test]
    fn retry_after_rounds_up_and_is_positive() {
        let d = decide(6, 10_001, 5, 9_000);
        assert!(!d.allowed);
        assert_eq!(d.retry_after_secs, 2);

        let d = decide(6, 10_000, 5, 10_000);
        assert_eq!(d.retry_after_secs, 1);
    }
}
