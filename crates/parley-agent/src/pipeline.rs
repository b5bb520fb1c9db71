// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-stage reply generation: analyzer, then reporter.
//!
//! Both stages run under their own [`RetryPolicy`]. Generation never fails:
//! an exhausted analyzer is replaced by a placeholder analysis, and an
//! exhausted reporter by a static fallback reply that distinguishes
//! timeouts from other failures.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::{ConversationConfig, LlmConfig, OpenAiConfig};
use parley_core::ProviderAdapter;
use parley_core::types::{CoachMode, HistoryEntry, ProviderRequest, ReplySource};
use parley_resilience::{RetryPolicy, retry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::prompts;

/// Retry policies for every external call a job makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicies {
    pub transcription: RetryPolicy,
    pub analyzer: RetryPolicy,
    pub reporter: RetryPolicy,
    pub delivery: RetryPolicy,
}

impl StagePolicies {
    pub fn from_config(llm: &LlmConfig) -> Self {
        let policy = |timeout_secs: u64| {
            RetryPolicy::new(
                llm.retry_max_attempts,
                Duration::from_millis(llm.retry_base_delay_ms),
                Duration::from_millis(llm.retry_max_delay_ms),
                Duration::from_secs(timeout_secs),
            )
        };
        Self {
            transcription: policy(llm.transcription_timeout_secs),
            analyzer: policy(llm.analyzer_timeout_secs),
            reporter: policy(llm.reporter_timeout_secs),
            delivery: policy(llm.delivery_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub analyzer_model: String,
    pub reporter_model: String,
    pub max_tokens: u32,
    pub fallback_reply: String,
    pub timeout_fallback_reply: String,
    pub analysis_placeholder: String,
}

impl GenerationSettings {
    pub fn from_config(openai: &OpenAiConfig, conversation: &ConversationConfig) -> Self {
        Self {
            analyzer_model: openai.analyzer_model.clone(),
            reporter_model: openai.reporter_model.clone(),
            max_tokens: openai.max_tokens,
            fallback_reply: conversation.fallback_reply.clone(),
            timeout_fallback_reply: conversation.timeout_fallback_reply.clone(),
            analysis_placeholder: conversation.analysis_placeholder.clone(),
        }
    }
}

/// Result of a generation run. Always carries a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub analysis: String,
    pub analysis_degraded: bool,
    pub reply: String,
    pub source: ReplySource,
}

pub struct GenerationPipeline {
    provider: Arc<dyn ProviderAdapter + Send + Sync>,
    settings: GenerationSettings,
    policies: StagePolicies,
}

impl GenerationPipeline {
    pub fn new(
        provider: Arc<dyn ProviderAdapter + Send + Sync>,
        settings: GenerationSettings,
        policies: StagePolicies,
    ) -> Self {
        Self {
            provider,
            settings,
            policies,
        }
    }

    pub async fn generate(
        &self,
        mode: CoachMode,
        history: &[HistoryEntry],
        text: &str,
        cancel: &CancellationToken,
    ) -> Generated {
        let (analysis, analysis_degraded) = match self.analyze(mode, history, text, cancel).await {
            Ok(analysis) => (analysis, false),
            Err(e) => {
                warn!(error = %e, "analyzer failed, continuing with placeholder analysis");
                (self.settings.analysis_placeholder.clone(), true)
            }
        };

        let request = ProviderRequest {
            model: self.settings.reporter_model.clone(),
            system_prompt: Some(prompts::reporter_system_prompt(mode)),
            messages: prompts::reporter_messages(text, &analysis),
            max_tokens: self.settings.max_tokens,
            temperature: Some(0.7),
        };
        let result = retry(&self.policies.reporter, "reporter", cancel, |_| {
            self.provider.complete(request.clone())
        })
        .await;

        let (reply, source) = match result {
            Ok(response) => (response.content, ReplySource::Generated),
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "reporter timed out, sending timeout fallback");
                (self.settings.timeout_fallback_reply.clone(), ReplySource::TimeoutFallback)
            }
            Err(e) => {
                warn!(error = %e, "reporter failed, sending fallback");
                (self.settings.fallback_reply.clone(), ReplySource::Fallback)
            }
        };
        debug!(%mode, analysis_degraded, source = %source, "generation finished");

        Generated {
            analysis,
            analysis_degraded,
            reply,
            source,
        }
    }

    async fn analyze(
        &self,
        mode: CoachMode,
        history: &[HistoryEntry],
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, parley_core::ParleyError> {
        let request = ProviderRequest {
            model: self.settings.analyzer_model.clone(),
            system_prompt: Some(prompts::analyzer_system_prompt(mode)),
            messages: prompts::conversation_messages(history, text),
            max_tokens: self.settings.max_tokens,
            temperature: Some(0.2),
        };
        let response = retry(&self.policies.analyzer, "analyzer", cancel, |_| {
            self.provider.complete(request.clone())
        })
        .await?;
        Ok(response.content)
    }
}
