// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily digest job.
//!
//! On each run, every chat with history in the trailing window gets one
//! summary message for the local date of the run. A `(chat_id, date)`
//! marker is written only after delivery succeeds; a chat that already has
//! a marker is skipped. A crash between delivery and marker write can send a
//! second digest on the next run.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use parley_config::model::ParleyConfig;
use parley_core::types::{DigestRecord, HistoryEntry, HistoryRole, ProviderMessage, ProviderRequest};
use parley_core::{ChannelAdapter, ParleyError, ProviderAdapter, StorageAdapter};
use parley_resilience::{RetryPolicy, retry};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::ScheduledJob;

const SUMMARY_SYSTEM_PROMPT: &str = "You write a short end-of-day recap of a coaching chat. \
Summarise what the user worked on in two to four bullet points, then add one encouraging \
sentence for tomorrow. Address the user as \"you\". Do not invent details.";

/// Longest excerpt of the user's last message quoted in a templated summary.
const EXCERPT_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub timezone: Tz,
    pub window_hours: u32,
    pub max_messages_per_chat: u32,
    pub model: String,
    pub max_tokens: u32,
    pub summary_policy: RetryPolicy,
    pub delivery_policy: RetryPolicy,
}

impl DigestSettings {
    pub fn from_config(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let digest = &config.digest;
        let llm = &config.llm;
        let timezone = Tz::from_str(&digest.timezone).map_err(|_| {
            ParleyError::Config(format!("digest.timezone: unknown timezone \"{}\"", digest.timezone))
        })?;
        let policy = |timeout_secs: u64| {
            RetryPolicy::new(
                llm.retry_max_attempts,
                std::time::Duration::from_millis(llm.retry_base_delay_ms),
                std::time::Duration::from_millis(llm.retry_max_delay_ms),
                std::time::Duration::from_secs(timeout_secs),
            )
        };
        Ok(Self {
            timezone,
            window_hours: digest.window_hours,
            max_messages_per_chat: digest.max_messages_per_chat,
            model: config.openai.digest_model.clone(),
            max_tokens: config.openai.max_tokens,
            summary_policy: policy(llm.digest_timeout_secs),
            delivery_policy: policy(llm.delivery_timeout_secs),
        })
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestRun {
    pub digest_date: String,
    pub chats: usize,
    pub sent: usize,
    /// Delivered with the templated summary.
    pub fallback: usize,
    /// Already had a marker for this date.
    pub already_sent: usize,
    pub failed: usize,
    /// Another run held the lock; nothing was done.
    pub overlapped: bool,
}

pub struct DigestJob {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    channel: Arc<dyn ChannelAdapter + Send + Sync>,
    provider: Arc<dyn ProviderAdapter + Send + Sync>,
    settings: DigestSettings,
    running: Mutex<()>,
}

impl DigestJob {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        channel: Arc<dyn ChannelAdapter + Send + Sync>,
        provider: Arc<dyn ProviderAdapter + Send + Sync>,
        settings: DigestSettings,
    ) -> Self {
        Self {
            storage,
            channel,
            provider,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Local date label (`YYYY-MM-DD`) for an instant.
    pub fn digest_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.settings.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Runs one digest pass for the window ending at `now`.
    ///
    /// Overlapping calls do not run concurrently; the later one returns
    /// immediately with `overlapped` set.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DigestRun, ParleyError> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("digest run already in progress, skipping");
            return Ok(DigestRun {
                overlapped: true,
                ..DigestRun::default()
            });
        };

        let until = now;
        let since = now - ChronoDuration::hours(i64::from(self.settings.window_hours));
        let until_ms = until.timestamp_millis();
        let since_ms = since.timestamp_millis();
        let digest_date = self.digest_date(now);

        let chats = self.storage.active_chats(since_ms, until_ms).await?;
        let mut run = DigestRun {
            digest_date: digest_date.clone(),
            chats: chats.len(),
            ..DigestRun::default()
        };
        info!(digest_date = %digest_date, chats = chats.len(), "digest run started");

        for chat_id in chats {
            if cancel.is_cancelled() {
                warn!(digest_date = %digest_date, "digest run interrupted by shutdown");
                break;
            }
            match self
                .digest_chat(chat_id, &digest_date, since_ms, until_ms, cancel)
                .await
            {
                Ok(ChatOutcome::Sent { used_fallback }) => {
                    run.sent += 1;
                    if used_fallback {
                        run.fallback += 1;
                    }
                    let outcome = if used_fallback { "fallback" } else { "sent" };
                    metrics::counter!("parley_digest_total", "outcome" => outcome).increment(1);
                }
                Ok(ChatOutcome::AlreadySent) => {
                    run.already_sent += 1;
                    metrics::counter!("parley_digest_total", "outcome" => "already_sent")
                        .increment(1);
                }
                Ok(ChatOutcome::NoActivity) => {}
                Err(e) => {
                    run.failed += 1;
                    metrics::counter!("parley_digest_total", "outcome" => "failed").increment(1);
                    error!(chat_id, digest_date = %digest_date, error = %e, "digest failed for chat");
                }
            }
        }

        info!(
            digest_date = %run.digest_date,
            chats = run.chats,
            sent = run.sent,
            fallback = run.fallback,
            already_sent = run.already_sent,
            failed = run.failed,
            "digest run finished"
        );
        Ok(run)
    }

    async fn digest_chat(
        &self,
        chat_id: i64,
        digest_date: &str,
        since_ms: i64,
        until_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, ParleyError> {
        if self.storage.digest_sent(chat_id, digest_date).await? {
            debug!(chat_id, digest_date, "digest already sent");
            return Ok(ChatOutcome::AlreadySent);
        }

        let history = self
            .storage
            .history_between(chat_id, since_ms, until_ms, self.settings.max_messages_per_chat)
            .await?;
        if history.is_empty() {
            return Ok(ChatOutcome::NoActivity);
        }

        let (summary, used_fallback) = match self.summarize(&history, cancel).await {
            Ok(summary) => (summary, false),
            Err(e) => {
                warn!(chat_id, error = %e, "digest summary failed, using template");
                (templated_summary(&history), true)
            }
        };

        let text = format!("Your daily recap\n\n{summary}");
        retry(&self.settings.delivery_policy, "digest_delivery", cancel, |_| {
            self.channel.send_text(chat_id, &text)
        })
        .await?;

        let inserted = self
            .storage
            .insert_digest_marker(DigestRecord {
                chat_id,
                digest_date: digest_date.to_string(),
                sent_at_ms: parley_core::now_ms(),
                message_count: history.len() as u32,
                used_fallback,
            })
            .await?;
        if !inserted {
            warn!(chat_id, digest_date, "digest marker already present, a duplicate was delivered");
        }

        Ok(ChatOutcome::Sent { used_fallback })
    }

    async fn summarize(
        &self,
        history: &[HistoryEntry],
        cancel: &CancellationToken,
    ) -> Result<String, ParleyError> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            system_prompt: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            messages: vec![ProviderMessage {
                role: "user".into(),
                content: transcript(history),
            }],
            max_tokens: self.settings.max_tokens,
            temperature: Some(0.3),
        };
        let response = retry(&self.settings.summary_policy, "digest_summary", cancel, |_| {
            self.provider.complete(request.clone())
        })
        .await?;
        Ok(response.content)
    }
}

enum ChatOutcome {
    Sent { used_fallback: bool },
    AlreadySent,
    NoActivity,
}

#[async_trait]
impl ScheduledJob for DigestJob {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn run(
        &self,
        fired_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(), ParleyError> {
        self.run_once(fired_at, cancel).await.map(|_| ())
    }
}

fn transcript(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|h| {
            let who = match h.role {
                HistoryRole::User => "User",
                HistoryRole::Assistant => "Coach",
            };
            format!("{who}: {}", h.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary used when generation fails.
fn templated_summary(history: &[HistoryEntry]) -> String {
    let user_messages = history
        .iter()
        .filter(|h| h.role == HistoryRole::User)
        .count();
    let mut text = format!(
        "You sent {user_messages} message{} today.",
        if user_messages == 1 { "" } else { "s" }
    );
    if let Some(last) = history.iter().rev().find(|h| h.role == HistoryRole::User) {
        let excerpt: String = last.content.chars().take(EXCERPT_CHARS).collect();
        let ellipsis = if last.content.chars().count() > EXCERPT_CHARS {
            "..."
        } else {
            ""
        };
        text.push_str(&format!("\nLast thing on your mind: \"{excerpt}{ellipsis}\""));
    }
    text.push_str("\nKeep going, and tell me how tomorrow goes.");
    text
}
