// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible endpoints.
//!
//! The client makes exactly one HTTP request per call. Retries belong to the
//! caller so the per-stage retry budget and timeout stay in one place.

use std::time::Duration;

use parley_core::ParleyError;
use parley_core::types::TranscriptionRequest;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::types::{
    ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse, TranscriptionResponse,
};

/// Upper bound for a single HTTP exchange. Stage timeouts are shorter.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, ParleyError> {
        Self::with_timeout(api_key, base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// `POST /chat/completions` (non-streaming).
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ParleyError> {
        let response = self
            .client
            .post(self.url("chat/completions"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        debug!(status = %status, model = %request.model, "chat completion response received");
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await.map_err(|e| self.send_error(e))?;
        serde_json::from_str(&body).map_err(|e| ParleyError::Provider {
            message: format!("failed to parse chat completion: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    /// `POST /audio/transcriptions` as multipart form data.
    pub async fn transcribe(
        &self,
        model: &str,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ParleyError> {
        let size = request.data.len();
        let part = reqwest::multipart::Part::bytes(request.data)
            .file_name(request.file_name)
            .mime_str(&request.mime_type)
            .map_err(|e| ParleyError::Validation(format!("invalid audio mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("response_format", "json")
            .part("file", part);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        debug!(status = %status, bytes = size, "transcription response received");
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        response.json().await.map_err(|e| ParleyError::Provider {
            message: format!("failed to parse transcription: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    fn send_error(&self, e: reqwest::Error) -> ParleyError {
        if e.is_timeout() {
            ParleyError::Timeout {
                duration: self.timeout,
            }
        } else {
            ParleyError::Network {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

async fn error_from_response(response: reqwest::Response) -> ParleyError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => format!(
            "OpenAI API error ({}): {}",
            api_err.error.type_.as_deref().unwrap_or("unknown"),
            api_err.error.message
        ),
        Err(_) => format!("API returned {status}: {body}"),
    };
    ParleyError::Provider {
        message,
        status: Some(status.as_u16()),
        source: None,
    }
}
