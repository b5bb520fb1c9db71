// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the messaging provider.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::MessageId;

/// Outbound side of the messaging provider.
///
/// Inbound updates arrive through the webhook; this trait covers delivery
/// and media retrieval only.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Sends a plain-text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageId, ParleyError>;

    /// Downloads a media file by its provider reference.
    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, ParleyError>;
}
