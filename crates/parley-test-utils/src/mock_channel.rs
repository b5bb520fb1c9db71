// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter`, capturing every delivered
//! message for assertion. Deliveries can be made to fail, either for the
//! next N calls or until further notice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::channel::ChannelAdapter;
use parley_core::types::{AdapterType, HealthStatus, MessageId};

/// A message passed to `send_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
}

/// A mock messaging channel for testing.
pub struct MockChannel {
    sent: Mutex<Vec<SentMessage>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Remaining deliveries that fail with a retryable 503.
    failures_left: AtomicU32,
    /// HTTP status every delivery fails with, 0 for none.
    fail_status: AtomicU32,
    attempts: AtomicU32,
    next_id: AtomicU64,
}

impl MockChannel {
    /// Create a new mock channel that delivers everything.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            failures_left: AtomicU32::new(0),
            fail_status: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Make the next `n` deliveries fail with a retryable 503.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Make every delivery fail with `status` until [`MockChannel::recover`].
    pub fn fail_always(&self, status: u16) {
        self.fail_status.store(u32::from(status), Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail_status.store(0, Ordering::SeqCst);
        self.failures_left.store(0, Ordering::SeqCst);
    }

    /// Register a downloadable file.
    pub async fn add_file(&self, file_ref: &str, data: Vec<u8>) {
        self.files.lock().await.insert(file_ref.to_string(), data);
    }

    /// All successfully delivered messages, in order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Texts delivered to one chat, in order.
    pub async fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Delivery attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    fn scripted_failure(&self) -> Option<ParleyError> {
        let status = self.fail_status.load(Ordering::SeqCst);
        if status != 0 {
            return Some(ParleyError::Channel {
                message: "mock delivery failure".into(),
                status: Some(status as u16),
                source: None,
            });
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        consumed.then(|| ParleyError::Channel {
            message: "mock delivery failure".into(),
            status: Some(503),
            source: None,
        })
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageId, ParleyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push(SentMessage {
            chat_id,
            text: text.to_string(),
        });
        Ok(MessageId(format!("mock-msg-{id}")))
    }

    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, ParleyError> {
        self.files
            .lock()
            .await
            .get(file_ref)
            .cloned()
            .ok_or_else(|| ParleyError::Channel {
                message: format!("file not found: {file_ref}"),
                status: Some(400),
                source: None,
            })
    }
}
