// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state, chat history, feedback, reports and funnel analytics.

use std::str::FromStr;

use parley_core::ParleyError;
use parley_core::types::{
    CoachMode, FlowStep, FlowSummary, Funnel, HistoryEntry, HistoryRole, TurnCommit,
    UserConversationState,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

fn conversion_err(
    index: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn history_from_row(row: &rusqlite::Row<'_>) -> Result<HistoryEntry, rusqlite::Error> {
    let role: String = row.get(3)?;
    Ok(HistoryEntry {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        update_id: row.get(2)?,
        role: HistoryRole::from_str(&role).map_err(|e| conversion_err(3, e))?,
        content: row.get(4)?,
        created_at_ms: row.get(5)?,
    })
}

/// Load a user's state row, if the user has been seen before.
pub async fn load_state(
    db: &Database,
    user_id: i64,
) -> Result<Option<UserConversationState>, ParleyError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, awaiting_feedback, awaiting_mode_recommendation, coach_mode
                 FROM conversation_state WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let mode: String = row.get(3)?;
                    Ok(UserConversationState {
                        user_id: row.get(0)?,
                        awaiting_feedback: row.get(1)?,
                        awaiting_mode_recommendation: row.get(2)?,
                        coach_mode: CoachMode::from_str(&mode).map_err(|e| conversion_err(3, e))?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Persist every side effect of one processed message in a single transaction.
///
/// The state row is upserted (last write wins). History, feedback, report and
/// funnel rows are unique per update id and inserted with `INSERT OR IGNORE`;
/// a funnel counter is only incremented when its event row was new, so a
/// retried job cannot double count.
pub async fn commit_turn(db: &Database, commit: TurnCommit) -> Result<(), ParleyError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let at = commit.at_ms;
            let state = &commit.state;

            tx.execute(
                "INSERT INTO conversation_state
                     (user_id, awaiting_feedback, awaiting_mode_recommendation, coach_mode, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id) DO UPDATE SET
                     awaiting_feedback = excluded.awaiting_feedback,
                     awaiting_mode_recommendation = excluded.awaiting_mode_recommendation,
                     coach_mode = excluded.coach_mode,
                     updated_at_ms = excluded.updated_at_ms",
                params![
                    state.user_id,
                    state.awaiting_feedback,
                    state.awaiting_mode_recommendation,
                    state.coach_mode.to_string(),
                    at
                ],
            )?;

            for event in &commit.flow_events {
                let key = event.funnel.counter_key(event.step);
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO flow_events
                         (counter_key, user_id, chat_id, update_id, created_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![key, state.user_id, commit.chat_id, commit.update_id, at],
                )?;
                if inserted == 1 {
                    tx.execute(
                        "INSERT INTO flow_counters (counter_key, count) VALUES (?1, 1)
                         ON CONFLICT (counter_key) DO UPDATE SET count = count + 1",
                        params![key],
                    )?;
                }
            }

            if let Some(feedback) = &commit.feedback {
                tx.execute(
                    "INSERT OR IGNORE INTO feedback
                         (update_id, chat_id, user_id, username, text, created_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        feedback.update_id,
                        feedback.chat_id,
                        feedback.user_id,
                        feedback.username,
                        feedback.text,
                        at
                    ],
                )?;
            }

            for entry in &commit.history {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_history
                         (chat_id, user_id, update_id, role, content, created_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.chat_id,
                        entry.user_id,
                        entry.update_id,
                        entry.role.to_string(),
                        entry.content,
                        entry.created_at_ms
                    ],
                )?;
            }

            if let Some(report) = &commit.report {
                tx.execute(
                    "INSERT OR IGNORE INTO reports
                         (update_id, chat_id, user_id, mode, analysis, analysis_degraded,
                          reply, reply_source, latency_ms, created_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        report.update_id,
                        report.chat_id,
                        report.user_id,
                        report.mode.to_string(),
                        report.analysis,
                        report.analysis_degraded,
                        report.reply,
                        report.reply_source.to_string(),
                        report.latency_ms,
                        at
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent `limit` history rows of a chat, oldest first.
pub async fn recent_history(
    db: &Database,
    chat_id: i64,
    limit: u32,
) -> Result<Vec<HistoryEntry>, ParleyError> {
    let mut rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, user_id, update_id, role, content, created_at_ms
                 FROM chat_history
                 WHERE chat_id = ?1
                 ORDER BY created_at_ms DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![chat_id, limit], history_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    rows.reverse();
    Ok(rows)
}

/// Read a funnel's rolled-up counters.
pub async fn flow_summary(db: &Database, funnel: Funnel) -> Result<FlowSummary, ParleyError> {
    let keys = [
        funnel.counter_key(FlowStep::Started),
        funnel.counter_key(FlowStep::Completed),
        funnel.counter_key(FlowStep::Cancelled),
    ];
    let values = db
        .connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT count FROM flow_counters WHERE counter_key = ?1")?;
            let mut values = [0_u64; 3];
            for (slot, key) in values.iter_mut().zip(keys.iter()) {
                let count: Option<i64> = stmt
                    .query_row(params![key], |row| row.get(0))
                    .optional()?;
                *slot = count.unwrap_or(0) as u64;
            }
            Ok(values)
        })
        .await
        .map_err(map_tr_err)?;

    Ok(FlowSummary {
        started: values[0],
        completed: values[1],
        cancelled: values[2],
    })
}

/// Number of feedback rows stored for a user.
pub async fn feedback_count(db: &Database, user_id: i64) -> Result<u64, ParleyError> {
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM feedback WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}
