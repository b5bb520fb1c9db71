// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible provider adapters for Parley.
//!
//! [`OpenAiProvider`] implements [`ProviderAdapter`] over Chat Completions and
//! [`OpenAiTranscriber`] implements [`TranscriptionAdapter`] over the audio
//! transcription endpoint. Both share one [`OpenAiClient`].

pub mod client;
pub mod types;

use async_trait::async_trait;
use parley_config::model::OpenAiConfig;
use parley_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage, TranscriptionRequest,
};
use parley_core::{ParleyError, PluginAdapter, ProviderAdapter, TranscriptionAdapter};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ChatCompletionRequest, ChatMessage};

/// Text generation over `POST /chat/completions`.
pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// API key resolution: `openai.api_key`, then `OPENAI_API_KEY`.
    pub fn new(config: &OpenAiConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(&api_key, &config.base_url)?;
        info!(base_url = %config.base_url, "OpenAI provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_wire(request: ProviderRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system".into(),
                content: Some(system),
            });
        }
        messages.extend(request.messages.into_iter().map(|m| ChatMessage {
            role: m.role,
            content: Some(m.content),
        }));
        ChatCompletionRequest {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let requested_model = request.model.clone();
        let wire = Self::to_wire(request);
        let response = self.client.chat_completion(&wire).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ParleyError::Provider {
                message: "completion returned no content".into(),
                status: None,
                source: None,
            })?;

        let usage = response.usage.unwrap_or_default();
        debug!(
            model = %requested_model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "completion finished"
        );

        Ok(ProviderResponse {
            content,
            model: if response.model.is_empty() {
                requested_model
            } else {
                response.model
            },
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

/// Speech-to-text over `POST /audio/transcriptions`.
pub struct OpenAiTranscriber {
    client: OpenAiClient,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(&api_key, &config.base_url)?;
        Ok(Self::with_client(client, &config.transcription_model))
    }

    pub fn with_client(client: OpenAiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai-transcription"
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
impl TranscriptionAdapter for OpenAiTranscriber {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ParleyError> {
        let response = self.client.transcribe(&self.model, request).await?;
        Ok(response.text.trim().to_string())
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, ParleyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ParleyError::Config(
                "OpenAI API key not found: set openai.api_key in config or OPENAI_API_KEY".into(),
            )
        })
}
