// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.
//!
//! Time-dependent operations take `now_ms` (unix epoch milliseconds) from the
//! caller so that window and expiry logic stays deterministic under test.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    DigestRecord, DigestStatus, FlowSummary, Funnel, HistoryEntry, InboundMessage, NewJob,
    RateLimitDecision, TurnCommit, UserConversationState,
};

/// Adapter for the durable state store: idempotency ledger, rate-limit
/// counters, conversation state, history, analytics and digest markers.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Idempotency ledger ---

    /// Records `update_id` as processed. Returns `true` only for the first caller.
    async fn mark_processed(&self, update_id: i64) -> Result<bool, ParleyError>;

    /// Atomically records the update and enqueues its job.
    ///
    /// Returns the new job id, or `None` when the update was already recorded.
    async fn accept_update(
        &self,
        msg: &InboundMessage,
        job: NewJob,
        now_ms: i64,
    ) -> Result<Option<i64>, ParleyError>;

    // --- Rate limiting ---

    /// Consumes one request from the fixed window identified by `key`.
    async fn consume_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, ParleyError>;

    /// Deletes expired rate-limit rows. Returns the number removed.
    async fn prune_rate_limits(&self, now_ms: i64) -> Result<u64, ParleyError>;

    // --- Conversation ---

    /// Loads a user's conversation state, if the user has been seen before.
    async fn load_state(&self, user_id: i64) -> Result<Option<UserConversationState>, ParleyError>;

    /// Persists every side effect of a processed message in one transaction.
    ///
    /// History, feedback, report and funnel rows are keyed by update id, so
    /// committing the same turn twice leaves the store unchanged.
    async fn commit_turn(&self, commit: TurnCommit) -> Result<(), ParleyError>;

    /// Most recent history for a chat, oldest first.
    async fn recent_history(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ParleyError>;

    /// Started/completed/cancelled totals for a funnel.
    async fn flow_summary(&self, funnel: Funnel) -> Result<FlowSummary, ParleyError>;

    // --- Digest ---

    /// Chats with at least one history row in `[since_ms, until_ms)`.
    async fn active_chats(&self, since_ms: i64, until_ms: i64) -> Result<Vec<i64>, ParleyError>;

    /// History rows of one chat in `[since_ms, until_ms)`, oldest first, capped at `limit`.
    async fn history_between(
        &self,
        chat_id: i64,
        since_ms: i64,
        until_ms: i64,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ParleyError>;

    /// True if a digest for `(chat_id, digest_date)` was already delivered.
    async fn digest_sent(&self, chat_id: i64, digest_date: &str) -> Result<bool, ParleyError>;

    /// Records a delivered digest. Returns `false` if the marker already existed.
    async fn insert_digest_marker(&self, record: DigestRecord) -> Result<bool, ParleyError>;

    /// Digest delivery counters, with `sent_today` computed for `today`.
    async fn digest_status(&self, today: &str) -> Result<DigestStatus, ParleyError>;
}
