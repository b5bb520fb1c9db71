// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock text-generation and transcription adapters for deterministic testing.
//!
//! `MockProvider` pops scripted replies from a FIFO queue; when the queue is
//! empty it repeats its default reply. Every request is recorded.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::ParleyError;
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::provider::{ProviderAdapter, TranscriptionAdapter};
use parley_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage, TranscriptionRequest,
};

/// Far beyond any stage timeout.
const HANG: Duration = Duration::from_secs(3600);

/// One scripted provider behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with a provider error carrying this HTTP status.
    Status(u16),
    /// Fail with a connection-level error.
    NetworkError,
    /// Reply after a delay.
    Delayed(Duration, String),
    /// Never answer within any configured timeout.
    Hang,
}

impl ScriptedReply {
    pub fn text(s: &str) -> Self {
        ScriptedReply::Text(s.to_string())
    }

    async fn play(self) -> Result<String, ParleyError> {
        match self {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Status(status) => Err(ParleyError::Provider {
                message: format!("mock provider returned {status}"),
                status: Some(status),
                source: None,
            }),
            ScriptedReply::NetworkError => Err(ParleyError::Network {
                message: "mock connection reset".into(),
                source: None,
            }),
            ScriptedReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            ScriptedReply::Hang => {
                tokio::time::sleep(HANG).await;
                Err(ParleyError::Internal("mock provider hang elapsed".into()))
            }
        }
    }
}

struct Script {
    queue: VecDeque<ScriptedReply>,
    default: ScriptedReply,
}

impl Script {
    fn new(queue: Vec<ScriptedReply>, default: ScriptedReply) -> Mutex<Self> {
        Mutex::new(Self {
            queue: VecDeque::from(queue),
            default,
        })
    }

    async fn next(this: &Mutex<Self>) -> ScriptedReply {
        let mut script = this.lock().await;
        script
            .queue
            .pop_front()
            .unwrap_or_else(|| script.default.clone())
    }
}

/// A mock text-generation provider.
pub struct MockProvider {
    script: Mutex<Script>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    /// Replies "mock response" to everything.
    pub fn new() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Script::new(replies, ScriptedReply::text("mock response")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Behaves as `reply` on every call once the queue is drained.
    pub async fn set_default(&self, reply: ScriptedReply) {
        self.script.lock().await.default = reply;
    }

    pub async fn push(&self, reply: ScriptedReply) {
        self.script.lock().await.queue.push_back(reply);
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let model = request.model.clone();
        self.requests.lock().await.push(request);
        let content = Script::next(&self.script).await.play().await?;
        Ok(ProviderResponse {
            content,
            model,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}

/// A mock speech-to-text adapter.
pub struct MockTranscriber {
    script: Mutex<Script>,
    requests: Mutex<Vec<TranscriptionRequest>>,
}

impl MockTranscriber {
    /// Transcribes everything to `text`.
    pub fn returning(text: &str) -> Self {
        Self {
            script: Script::new(Vec::new(), ScriptedReply::text(text)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with `reply` (use a failing variant).
    pub fn failing(reply: ScriptedReply) -> Self {
        Self {
            script: Script::new(Vec::new(), reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<TranscriptionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockTranscriber {
    fn name(&self) -> &str {
        "mock-transcriber"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transcription
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl TranscriptionAdapter for MockTranscriber {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ParleyError> {
        self.requests.lock().await.push(request);
        Script::next(&self.script).await.play().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "mock-model".into(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens: 64,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn scripted_replies_then_default() {
        let provider = MockProvider::with_replies(vec![
            ScriptedReply::text("first"),
            ScriptedReply::Status(503),
        ]);

        let r = provider.complete(request()).await.unwrap();
        assert_eq!(r.content, "first");
        assert_eq!(r.model, "mock-model");

        let err = provider.complete(request()).await.unwrap_err();
        assert_eq!(err.status(), Some(503));

        let r = provider.complete(request()).await.unwrap();
        assert_eq!(r.content, "mock response");
        assert_eq!(provider.call_count().await, 3);
    }

    #[tokio::test]
    async fn default_can_be_replaced() {
        let provider = MockProvider::new();
        provider.set_default(ScriptedReply::NetworkError).await;
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ParleyError::Network { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hang_outlasts_a_timeout() {
        let provider = MockProvider::with_replies(vec![ScriptedReply::Hang]);
        let result =
            tokio::time::timeout(Duration::from_secs(30), provider.complete(request())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn transcriber_records_requests() {
        let transcriber = MockTranscriber::returning("hello from voice");
        let text = transcriber
            .transcribe(TranscriptionRequest {
                data: vec![0, 1],
                mime_type: "audio/ogg".into(),
                file_name: "voice.ogg".into(),
            })
            .await
            .unwrap();
        assert_eq!(text, "hello from voice");
        assert_eq!(transcriber.requests().await[0].file_name, "voice.ogg");

        let failing = MockTranscriber::failing(ScriptedReply::Status(500));
        assert!(failing
            .transcribe(TranscriptionRequest {
                data: Vec::new(),
                mime_type: "audio/ogg".into(),
                file_name: "voice.ogg".into(),
            })
            .await
            .is_err());
    }
}
