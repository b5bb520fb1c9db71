// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for Parley.
//!
//! Inbound traffic arrives through the gateway's webhook and is parsed by
//! [`update::parse_update`]. Outbound delivery and voice file downloads go
//! through [`TelegramChannel`], which implements [`ChannelAdapter`] via
//! teloxide.

pub mod update;

use async_trait::async_trait;
use parley_config::model::TelegramConfig;
use parley_core::types::{AdapterType, HealthStatus, MessageId};
use parley_core::{ChannelAdapter, ParleyError, PluginAdapter};
use teloxide::RequestError;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId};
use tracing::{debug, warn};

pub use update::{SECRET_HEADER, parse_update, secret_matches};

/// Bot API limit for a single text message, in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Telegram channel adapter implementing [`ChannelAdapter`].
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Requires `config.bot_token` to be set and non-empty.
    pub fn new(config: &TelegramConfig) -> Result<Self, ParleyError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ParleyError::Config("telegram.bot_token is required for Telegram adapter".into())
        })?;

        if token.is_empty() {
            return Err(ParleyError::Config("telegram.bot_token cannot be empty".into()));
        }

        Ok(Self {
            bot: Bot::new(token),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("Telegram bot unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("Telegram channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    /// Sends `text` as plain text, split into several messages when it
    /// exceeds [`MAX_MESSAGE_LEN`]. Returns the id of the last message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageId, ParleyError> {
        let mut last = None;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let sent = self
                .bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .map_err(map_request_error)?;
            last = Some(sent.id);
        }
        let id = last.ok_or_else(|| ParleyError::Validation("refusing to send an empty message".into()))?;
        Ok(MessageId(id.0.to_string()))
    }

    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, ParleyError> {
        let file = self
            .bot
            .get_file(FileId(file_ref.to_string()))
            .await
            .map_err(map_request_error)?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| ParleyError::Network {
                message: format!("failed to download file: {e}"),
                source: Some(Box::new(e)),
            })?;

        debug!(file_ref, size = buf.len(), "downloaded file from Telegram");
        Ok(buf)
    }
}

/// Map a Bot API failure onto the error taxonomy, keeping an HTTP-like
/// status so the classifier can tell throttling from permanent rejection.
pub fn map_request_error(e: RequestError) -> ParleyError {
    match e {
        RequestError::RetryAfter(after) => {
            warn!(retry_after = ?after, "Telegram flood control");
            ParleyError::Channel {
                message: format!("Telegram rate limited: {e}"),
                status: Some(429),
                source: Some(Box::new(e)),
            }
        }
        RequestError::Network(ref inner) if inner.is_timeout() => ParleyError::Timeout {
            duration: std::time::Duration::ZERO,
        },
        RequestError::Network(_) => ParleyError::Network {
            message: format!("Telegram request failed: {e}"),
            source: Some(Box::new(e)),
        },
        RequestError::Api(_) => ParleyError::Channel {
            message: format!("Telegram API rejected the request: {e}"),
            status: Some(400),
            source: Some(Box::new(e)),
        },
        _ => ParleyError::Channel {
            message: format!("Telegram request failed: {e}"),
            status: None,
            source: Some(Box::new(e)),
        },
    }
}

/// Split `text` into chunks of at most `max_chars` characters, preferring to
/// break after a newline. Blank input yields no chunks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest);
            break;
        }
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = rest[..hard_end]
            .rfind('\n')
            .filter(|&i| i > 0)
            .map(|i| i + 1)
            .unwrap_or(hard_end);
        let (head, tail) = rest.split_at(end);
        chunks.push(head.trim_end());
        rest = tail.trim_start();
    }
    chunks
}
