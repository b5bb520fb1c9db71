// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a [`ConversationEngine`] over a temp SQLite
//! database and mock adapters. Provides `send_text()` to drive one message
//! through the full pipeline: intent, state machine, generation, delivery
//! and commit.

use std::sync::Arc;

use parley_agent::{ConversationEngine, TurnOutcome};
use parley_config::model::{ParleyConfig, StorageConfig};
use parley_core::types::{InboundMessage, MediaAttachment, MediaKind};
use parley_core::{ParleyError, StorageAdapter, TranscriptionAdapter};
use parley_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;

use crate::mock_channel::MockChannel;
use crate::mock_provider::{MockProvider, MockTranscriber, ScriptedReply};

/// Chat and user id used by the message helpers.
pub const TEST_CHAT_ID: i64 = 1001;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<ScriptedReply>,
    transcriber: Option<MockTranscriber>,
    config: ParleyConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ParleyConfig::default();
        // Keep local retries fast; timeouts stay at their defaults.
        config.llm.retry_base_delay_ms = 1;
        config.llm.retry_max_delay_ms = 5;
        Self {
            replies: Vec::new(),
            transcriber: None,
            config,
        }
    }

    /// Script the mock provider. Analyzer and reporter each consume one reply.
    pub fn with_replies(mut self, replies: Vec<ScriptedReply>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_transcriber(mut self, transcriber: MockTranscriber) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut ParleyConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir = tempfile::TempDir::new().map_err(ParleyError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let mock_provider = Arc::new(MockProvider::with_replies(self.replies));
        let mock_channel = Arc::new(MockChannel::new());
        let mock_transcriber = self.transcriber.map(Arc::new);

        let engine = ConversationEngine::new(
            &config,
            storage.clone(),
            mock_channel.clone(),
            mock_provider.clone(),
            mock_transcriber
                .clone()
                .map(|t| t as Arc<dyn TranscriptionAdapter + Send + Sync>),
        )?;

        Ok(TestHarness {
            storage,
            mock_provider,
            mock_channel,
            mock_transcriber,
            engine: Arc::new(engine),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// SQLite storage and queue (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub mock_provider: Arc<MockProvider>,
    pub mock_channel: Arc<MockChannel>,
    pub mock_transcriber: Option<Arc<MockTranscriber>>,
    pub engine: Arc<ConversationEngine>,
    pub config: ParleyConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default configuration and an always-"mock response" provider.
    pub async fn new() -> Result<Self, ParleyError> {
        Self::builder().build().await
    }

    /// A text message from the test user.
    pub fn text_message(update_id: i64, text: &str) -> InboundMessage {
        InboundMessage {
            update_id,
            chat_id: TEST_CHAT_ID,
            user_id: TEST_CHAT_ID,
            username: Some("tester".into()),
            text: Some(text.to_string()),
            media: None,
        }
    }

    /// A voice note from the test user.
    pub fn voice_message(update_id: i64, file_ref: &str) -> InboundMessage {
        InboundMessage {
            update_id,
            chat_id: TEST_CHAT_ID,
            user_id: TEST_CHAT_ID,
            username: Some("tester".into()),
            text: None,
            media: Some(MediaAttachment {
                kind: MediaKind::Voice,
                file_ref: file_ref.to_string(),
                mime_type: Some("audio/ogg".into()),
            }),
        }
    }

    pub async fn process(&self, msg: &InboundMessage) -> Result<TurnOutcome, ParleyError> {
        self.engine.process(msg, &CancellationToken::new()).await
    }

    /// Process a text message and return the reply delivered for it.
    pub async fn send_text(&self, update_id: i64, text: &str) -> Result<String, ParleyError> {
        match self.process(&Self::text_message(update_id, text)).await? {
            TurnOutcome::Replied { reply, .. } => Ok(reply),
            other => Err(ParleyError::Internal(format!(
                "expected a reply, got {other:?}"
            ))),
        }
    }

    /// Every text delivered to the test chat, in order.
    pub async fn replies(&self) -> Vec<String> {
        self.mock_channel.texts_for(TEST_CHAT_ID).await
    }
}
