// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Digest inputs (active chats, windowed history) and the sent-marker guard.

use parley_core::ParleyError;
use parley_core::types::{DigestRecord, DigestStatus, HistoryEntry};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::conversation::history_from_row;

/// Chats with at least one history row in `[since_ms, until_ms)`.
pub async fn active_chats(db: &Database, since_ms: i64, until_ms: i64) -> Result<Vec<i64>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT chat_id FROM chat_history
                 WHERE created_at_ms >= ?1 AND created_at_ms < ?2
                 ORDER BY chat_id",
            )?;
            let rows = stmt.query_map(params![since_ms, until_ms], |row| row.get(0))?;
            rows.collect::<Result<Vec<i64>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// The latest `limit` history rows of a chat within the window, oldest first.
pub async fn history_between(
    db: &Database,
    chat_id: i64,
    since_ms: i64,
    until_ms: i64,
    limit: u32,
) -> Result<Vec<HistoryEntry>, ParleyError> {
    let mut rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, user_id, update_id, role, content, created_at_ms
                 FROM chat_history
                 WHERE chat_id = ?1 AND created_at_ms >= ?2 AND created_at_ms < ?3
                 ORDER BY created_at_ms DESC, id DESC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(params![chat_id, since_ms, until_ms, limit], history_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    rows.reverse();
    Ok(rows)
}

/// True if the `(chat_id, digest_date)` marker exists.
pub async fn marker_exists(db: &Database, chat_id: i64, digest_date: &str) -> Result<bool, ParleyError> {
    let digest_date = digest_date.to_string();
    db.connection()
        .call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM digest_sent WHERE chat_id = ?1 AND digest_date = ?2)",
                params![chat_id, digest_date],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert the sent marker if absent. Returns `false` when it already existed.
pub async fn insert_marker(db: &Database, record: DigestRecord) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO digest_sent
                     (chat_id, digest_date, sent_at_ms, message_count, used_fallback)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.chat_id,
                    record.digest_date,
                    record.sent_at_ms,
                    record.message_count,
                    record.used_fallback
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate send counters and the most recent send.
pub async fn status(db: &Database, today: &str) -> Result<DigestStatus, ParleyError> {
    let today = today.to_string();
    db.connection()
        .call(move |conn| {
            let (total, sent_today, fallback): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(digest_date = ?1), 0),
                        COALESCE(SUM(used_fallback), 0)
                 FROM digest_sent",
                params![today],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let latest = conn
                .query_row(
                    "SELECT chat_id, digest_date, sent_at_ms, message_count, used_fallback
                     FROM digest_sent ORDER BY sent_at_ms DESC, chat_id DESC LIMIT 1",
                    [],
                    |row| {
                        Ok(DigestRecord {
                            chat_id: row.get(0)?,
                            digest_date: row.get(1)?,
                            sent_at_ms: row.get(2)?,
                            message_count: row.get(3)?,
                            used_fallback: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(DigestStatus {
                total_sent: total as u64,
                sent_today: sent_today as u64,
                fallback_sent: fallback as u64,
                latest,
            })
        })
        .await
        .map_err(map_tr_err)
}
