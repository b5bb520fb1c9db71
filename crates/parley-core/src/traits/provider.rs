// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter traits for text generation and speech transcription.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse, TranscriptionRequest};

/// Adapter for text-generation providers.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError>;
}

/// Adapter for speech-to-text providers.
#[async_trait]
pub trait TranscriptionAdapter: PluginAdapter {
    /// Transcribes an audio clip and returns the recognized text.
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ParleyError>;
}
