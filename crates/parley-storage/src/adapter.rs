// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `StorageAdapter` and `QueueAdapter` traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::types::{
    DeadLetterEntry, DigestRecord, DigestStatus, FlowSummary, Funnel, HistoryEntry,
    InboundMessage, Job, JobSnapshot, NackOutcome, NewJob, QueueCounts, RateLimitDecision,
    TurnCommit, UserConversationState,
};
use parley_core::{
    AdapterType, HealthStatus, ParleyError, PluginAdapter, QueueAdapter, StorageAdapter, now_ms,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage and queue adapter.
///
/// Wraps a [`Database`] handle and delegates all operations to the typed
/// query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`], or supplied up front via [`SqliteStorage::from_database`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already opened database.
    pub fn from_database(db: Database, config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), ParleyError> {
        db.connection()
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        let db = self.database()?;
        Self::checkpoint(db).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn mark_processed(&self, update_id: i64) -> Result<bool, ParleyError> {
        queries::idempotency::mark_processed(self.database()?, update_id, now_ms()).await
    }

    async fn accept_update(
        &self,
        msg: &InboundMessage,
        job: NewJob,
        now_ms: i64,
    ) -> Result<Option<i64>, ParleyError> {
        queries::idempotency::accept(self.database()?, msg.update_id, job, now_ms).await
    }

    async fn consume_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, ParleyError> {
        queries::rate_limit::consume(self.database()?, key, limit, window_ms, now_ms).await
    }

    async fn prune_rate_limits(&self, now_ms: i64) -> Result<u64, ParleyError> {
        queries::rate_limit::prune_expired(self.database()?, now_ms).await
    }

    async fn load_state(&self, user_id: i64) -> Result<Option<UserConversationState>, ParleyError> {
        queries::conversation::load_state(self.database()?, user_id).await
    }

    async fn commit_turn(&self, commit: TurnCommit) -> Result<(), ParleyError> {
        queries::conversation::commit_turn(self.database()?, commit).await
    }

    async fn recent_history(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ParleyError> {
        queries::conversation::recent_history(self.database()?, chat_id, limit).await
    }

    async fn flow_summary(&self, funnel: Funnel) -> Result<FlowSummary, ParleyError> {
        queries::conversation::flow_summary(self.database()?, funnel).await
    }

    async fn active_chats(&self, since_ms: i64, until_ms: i64) -> Result<Vec<i64>, ParleyError> {
        queries::digest::active_chats(self.database()?, since_ms, until_ms).await
    }

    async fn history_between(
        &self,
        chat_id: i64,
        since_ms: i64,
        until_ms: i64,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ParleyError> {
        queries::digest::history_between(self.database()?, chat_id, since_ms, until_ms, limit).await
    }

    async fn digest_sent(&self, chat_id: i64, digest_date: &str) -> Result<bool, ParleyError> {
        queries::digest::marker_exists(self.database()?, chat_id, digest_date).await
    }

    async fn insert_digest_marker(&self, record: DigestRecord) -> Result<bool, ParleyError> {
        queries::digest::insert_marker(self.database()?, record).await
    }

    async fn digest_status(&self, today: &str) -> Result<DigestStatus, ParleyError> {
        queries::digest::status(self.database()?, today).await
    }
}

#[async_trait]
impl QueueAdapter for SqliteStorage {
    async fn enqueue(&self, job: NewJob, now_ms: i64) -> Result<i64, ParleyError> {
        queries::queue::enqueue(self.database()?, job, now_ms).await
    }

    async fn dequeue(
        &self,
        queue: &str,
        now_ms: i64,
        lock_ms: i64,
    ) -> Result<Option<Job>, ParleyError> {
        queries::queue::dequeue(self.database()?, queue, now_ms, lock_ms).await
    }

    async fn renew_lease(
        &self,
        job_id: i64,
        lease: i64,
        locked_until_ms: i64,
    ) -> Result<bool, ParleyError> {
        queries::queue::renew_lease(self.database()?, job_id, lease, locked_until_ms).await
    }

    async fn ack(&self, job_id: i64, lease: i64, now_ms: i64) -> Result<bool, ParleyError> {
        queries::queue::ack(self.database()?, job_id, lease, now_ms).await
    }

    async fn nack(
        &self,
        job_id: i64,
        lease: i64,
        error: &str,
        backoff_base_ms: i64,
        now_ms: i64,
    ) -> Result<NackOutcome, ParleyError> {
        queries::queue::nack(self.database()?, job_id, lease, error, backoff_base_ms, now_ms).await
    }

    async fn dead_letter(
        &self,
        job_id: i64,
        lease: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool, ParleyError> {
        queries::queue::dead_letter(self.database()?, job_id, lease, error, now_ms).await
    }

    async fn counts(&self, queue: &str, now_ms: i64) -> Result<QueueCounts, ParleyError> {
        queries::queue::counts(self.database()?, queue, now_ms).await
    }

    async fn failed_jobs(&self, queue: &str, limit: u32) -> Result<Vec<JobSnapshot>, ParleyError> {
        queries::queue::failed_jobs(self.database()?, queue, limit).await
    }

    async fn dead_letters(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, ParleyError> {
        queries::dead_letter::list(self.database()?, limit).await
    }

    async fn dead_letter_counts(&self) -> Result<QueueCounts, ParleyError> {
        queries::dead_letter::counts(self.database()?).await
    }

    async fn requeue_dead_letter(
        &self,
        original_job_id: i64,
        now_ms: i64,
    ) -> Result<Option<i64>, ParleyError> {
        queries::dead_letter::requeue(self.database()?, original_job_id, now_ms).await
    }

    async fn reclaim_stalled(&self, queue: &str, now_ms: i64) -> Result<u64, ParleyError> {
        queries::queue::reclaim_stalled(self.database()?, queue, now_ms).await
    }

    async fn prune(
        &self,
        completed_before_ms: i64,
        dead_letter_before_ms: i64,
    ) -> Result<u64, ParleyError> {
        queries::queue::prune(self.database()?, completed_before_ms, dead_letter_before_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err(), "second initialize should fail");
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(matches!(
            storage.mark_processed(1).await,
            Err(ParleyError::Storage { .. })
        ));
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn queue_round_trip_through_traits() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        let msg = InboundMessage {
            update_id: 5,
            chat_id: 9,
            user_id: 3,
            username: None,
            text: Some("hi".into()),
            media: None,
        };
        let job = NewJob::for_message("inbound", &msg, 3).unwrap();
        let id = storage.accept_update(&msg, job.clone(), 0).await.unwrap().unwrap();
        assert_eq!(storage.accept_update(&msg, job, 0).await.unwrap(), None);

        let claimed = QueueAdapter::dequeue(&storage, "inbound", 0, 1_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.message().unwrap(), msg);
        assert!(QueueAdapter::ack(&storage, id, claimed.lease, 10).await.unwrap());

        let counts = QueueAdapter::counts(&storage, "inbound", 10).await.unwrap();
        assert_eq!(counts.completed, 1);
        storage.close().await.unwrap();
    }
}
