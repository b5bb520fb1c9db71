// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook update parsing.
//!
//! Only the subset of the Bot API `Update` object that the pipeline needs is
//! modelled. Unknown fields are ignored so new Bot API releases never break
//! ingestion.

use parley_core::ParleyError;
use parley_core::types::{InboundMessage, MediaAttachment, MediaKind};
use serde::Deserialize;

/// Header carrying the secret configured with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    voice: Option<FileRef>,
    #[serde(default)]
    audio: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Parse a webhook body.
///
/// Returns `Err` for a body that is not a valid update, and `Ok(None)` for a
/// valid update the pipeline does not handle (edits, channel posts, stickers,
/// messages without a sender).
pub fn parse_update(body: &[u8]) -> Result<Option<InboundMessage>, ParleyError> {
    let update: Update = serde_json::from_slice(body)
        .map_err(|e| ParleyError::Validation(format!("malformed update: {e}")))?;

    let Some(message) = update.message else {
        return Ok(None);
    };
    let Some(from) = message.from else {
        return Ok(None);
    };

    let media = match (message.voice, message.audio) {
        (Some(voice), _) => Some(MediaAttachment {
            kind: MediaKind::Voice,
            file_ref: voice.file_id,
            mime_type: voice.mime_type,
        }),
        (None, Some(audio)) => Some(MediaAttachment {
            kind: MediaKind::Audio,
            file_ref: audio.file_id,
            mime_type: audio.mime_type,
        }),
        (None, None) => None,
    };
    let text = message
        .text
        .or(message.caption)
        .filter(|t| !t.trim().is_empty());

    if text.is_none() && media.is_none() {
        return Ok(None);
    }

    Ok(Some(InboundMessage {
        update_id: update.update_id,
        chat_id: message.chat.id,
        user_id: from.id,
        username: from.username,
        text,
        media,
    }))
}

/// Compare the configured webhook secret with the one presented.
///
/// No configured secret accepts everything. The comparison does not exit
/// early on the first differing byte.
pub fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(provided) = provided else {
        return false;
    };
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
