// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation engine: one inbound message in, one delivered reply out.
//!
//! Processing order for a job:
//!
//! 1. Resolve the message to text, transcribing voice/audio if needed.
//! 2. Load the user's state and run it through [`transition`].
//! 3. Execute the resulting [`Action`], generating a reply if required.
//! 4. Deliver the reply. Delivery failures propagate and fail the job.
//! 5. Commit state, funnel events, feedback, history and report together.
//!
//! Nothing is persisted before delivery succeeds, so a failed attempt leaves
//! no trace and the retried attempt starts from the same state.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parley_config::model::{ConversationConfig, ParleyConfig};
use parley_core::types::{
    CoachMode, FeedbackRecord, HistoryEntry, HistoryRole, InboundMessage, Job, MediaAttachment,
    MediaKind, ReplySource, ReportRecord, TranscriptionRequest, TurnCommit,
    UserConversationState,
};
use parley_core::{
    ChannelAdapter, MessageId, ParleyError, ProviderAdapter, StorageAdapter,
    TranscriptionAdapter, now_ms,
};
use parley_resilience::retry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::flow::{Action, transition};
use crate::intent::classify_intent;
use crate::pipeline::{GenerationPipeline, GenerationSettings, StagePolicies};
use crate::prompts;
use crate::recommend::recommend_mode;
use crate::telemetry::record_flow_events;
use crate::worker::JobHandler;

const DEFAULT_AUDIO_MIME: &str = "audio/ogg";

/// Engine knobs taken from the `conversation` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub history_limit: u32,
    pub default_mode: CoachMode,
    pub transcription_failure_reply: String,
}

impl EngineSettings {
    pub fn from_config(conversation: &ConversationConfig) -> Result<Self, ParleyError> {
        let default_mode = CoachMode::from_str(&conversation.default_mode).map_err(|_| {
            ParleyError::Config(format!(
                "conversation.default_mode: unknown coach mode \"{}\"",
                conversation.default_mode
            ))
        })?;
        Ok(Self {
            history_limit: conversation.history_limit,
            default_mode,
            transcription_failure_reply: conversation.transcription_failure_reply.clone(),
        })
    }
}

/// What processing a message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No text and no media; nothing delivered or stored.
    Skipped,
    /// Media could not be transcribed; the failure notice was delivered.
    TranscriptionFailed,
    /// A reply was delivered and the turn committed.
    Replied {
        intent: &'static str,
        reply: String,
        /// Set when the reply came from the generation pipeline.
        source: Option<ReplySource>,
    },
}

enum ResolvedText {
    Text(String),
    Empty,
    TranscriptionFailed,
}

/// Everything [`ConversationEngine::execute`] decided for one turn.
struct Turn {
    reply: String,
    state: UserConversationState,
    feedback: Option<FeedbackRecord>,
    history: Vec<HistoryEntry>,
    report: Option<ReportRecord>,
    source: Option<ReplySource>,
}

pub struct ConversationEngine {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    channel: Arc<dyn ChannelAdapter + Send + Sync>,
    transcriber: Option<Arc<dyn TranscriptionAdapter + Send + Sync>>,
    pipeline: GenerationPipeline,
    policies: StagePolicies,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        config: &ParleyConfig,
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        channel: Arc<dyn ChannelAdapter + Send + Sync>,
        provider: Arc<dyn ProviderAdapter + Send + Sync>,
        transcriber: Option<Arc<dyn TranscriptionAdapter + Send + Sync>>,
    ) -> Result<Self, ParleyError> {
        let settings = EngineSettings::from_config(&config.conversation)?;
        let policies = StagePolicies::from_config(&config.llm);
        let pipeline = GenerationPipeline::new(
            provider,
            GenerationSettings::from_config(&config.openai, &config.conversation),
            policies,
        );

        info!(
            default_mode = %settings.default_mode,
            history_limit = settings.history_limit,
            transcription = transcriber.is_some(),
            "conversation engine initialized"
        );

        Ok(Self {
            storage,
            channel,
            transcriber,
            pipeline,
            policies,
            settings,
        })
    }

    /// Processes one inbound message end to end.
    pub async fn process(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ParleyError> {
        let started = Instant::now();
        let received_at = now_ms();

        let text = match self.resolve_text(msg, cancel).await {
            ResolvedText::Text(text) => text,
            ResolvedText::Empty => {
                debug!(update_id = msg.update_id, "message has no text or media, skipping");
                return Ok(TurnOutcome::Skipped);
            }
            ResolvedText::TranscriptionFailed => {
                self.deliver(msg.chat_id, &self.settings.transcription_failure_reply, cancel)
                    .await?;
                return Ok(TurnOutcome::TranscriptionFailed);
            }
        };

        let state = self
            .storage
            .load_state(msg.user_id)
            .await?
            .unwrap_or_else(|| UserConversationState::new(msg.user_id, self.settings.default_mode));

        let intent = classify_intent(&text);
        let step = transition(state.state(), &intent);
        debug!(
            update_id = msg.update_id,
            chat_id = msg.chat_id,
            intent = intent.label(),
            from = ?state.state(),
            to = ?step.next,
            "conversation transition"
        );

        let next = state.with_state(step.next);
        let turn = self
            .execute(msg, step.action, next, received_at, started, cancel)
            .await?;

        self.deliver(msg.chat_id, &turn.reply, cancel).await?;

        let mut commit = TurnCommit::new(msg.update_id, msg.chat_id, now_ms(), turn.state);
        commit.flow_events = step.events.clone();
        commit.feedback = turn.feedback;
        commit.history = turn.history;
        commit.report = turn.report;
        self.storage.commit_turn(commit).await?;
        record_flow_events(&step.events);

        info!(
            update_id = msg.update_id,
            chat_id = msg.chat_id,
            intent = intent.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "message processed"
        );

        Ok(TurnOutcome::Replied {
            intent: intent.label(),
            reply: turn.reply,
            source: turn.source,
        })
    }

    async fn execute(
        &self,
        msg: &InboundMessage,
        action: Action,
        state: UserConversationState,
        received_at: i64,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<Turn, ParleyError> {
        let mut turn = Turn {
            reply: String::new(),
            state,
            feedback: None,
            history: Vec::new(),
            report: None,
            source: None,
        };

        turn.reply = match action {
            Action::Welcome => prompts::WELCOME.to_string(),
            Action::ShowHelp => prompts::HELP.to_string(),
            Action::PromptFeedback => prompts::FEEDBACK_PROMPT.to_string(),
            Action::PromptModeRecommendation => prompts::RECOMMEND_PROMPT.to_string(),
            Action::NothingToCancel => prompts::NOTHING_TO_CANCEL.to_string(),
            Action::FlowCancelled(_) => prompts::FLOW_CANCELLED.to_string(),
            Action::UnknownMode(name) => prompts::unknown_mode(&name),
            Action::SaveFeedback(text) => {
                turn.feedback = Some(FeedbackRecord {
                    update_id: msg.update_id,
                    chat_id: msg.chat_id,
                    user_id: msg.user_id,
                    username: msg.username.clone(),
                    text,
                });
                prompts::FEEDBACK_SAVED.to_string()
            }
            Action::RecommendMode(text) => {
                let rec = recommend_mode(&text);
                debug!(mode = %rec.mode, score = rec.score, defaulted = rec.defaulted, "mode recommended");
                turn.state = turn.state.with_mode(rec.mode);
                prompts::mode_recommended(&rec)
            }
            Action::SwitchMode(mode) => {
                turn.state = turn.state.with_mode(mode);
                prompts::mode_switched(mode)
            }
            Action::Generate(text) => {
                let mode = turn.state.coach_mode;
                let history = self
                    .storage
                    .recent_history(msg.chat_id, self.settings.history_limit)
                    .await?;
                let generated = self.pipeline.generate(mode, &history, &text, cancel).await;

                let replied_at = now_ms();
                turn.history = vec![
                    HistoryEntry {
                        chat_id: msg.chat_id,
                        user_id: msg.user_id,
                        update_id: msg.update_id,
                        role: HistoryRole::User,
                        content: text,
                        created_at_ms: received_at,
                    },
                    HistoryEntry {
                        chat_id: msg.chat_id,
                        user_id: msg.user_id,
                        update_id: msg.update_id,
                        role: HistoryRole::Assistant,
                        content: generated.reply.clone(),
                        created_at_ms: replied_at,
                    },
                ];
                turn.report = Some(ReportRecord {
                    update_id: msg.update_id,
                    chat_id: msg.chat_id,
                    user_id: msg.user_id,
                    mode,
                    analysis: generated.analysis,
                    analysis_degraded: generated.analysis_degraded,
                    reply: generated.reply.clone(),
                    reply_source: generated.source,
                    latency_ms: started.elapsed().as_millis() as i64,
                });
                turn.source = Some(generated.source);
                generated.reply
            }
        };

        Ok(turn)
    }

    async fn resolve_text(&self, msg: &InboundMessage, cancel: &CancellationToken) -> ResolvedText {
        if let Some(text) = msg.trimmed_text() {
            return ResolvedText::Text(text.to_string());
        }
        let Some(media) = &msg.media else {
            return ResolvedText::Empty;
        };
        let Some(transcriber) = &self.transcriber else {
            warn!(update_id = msg.update_id, "media received but no transcriber is configured");
            return ResolvedText::TranscriptionFailed;
        };

        match self.transcribe(transcriber.as_ref(), media, cancel).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(update_id = msg.update_id, chars = text.len(), "media transcribed");
                ResolvedText::Text(text.trim().to_string())
            }
            Ok(_) => {
                warn!(update_id = msg.update_id, "transcription returned no text");
                ResolvedText::TranscriptionFailed
            }
            Err(e) => {
                warn!(update_id = msg.update_id, error = %e, "transcription failed");
                ResolvedText::TranscriptionFailed
            }
        }
    }

    async fn transcribe(
        &self,
        transcriber: &(dyn TranscriptionAdapter + Send + Sync),
        media: &MediaAttachment,
        cancel: &CancellationToken,
    ) -> Result<String, ParleyError> {
        let policy = &self.policies.transcription;
        let data = retry(policy, "download", cancel, |_| {
            self.channel.download_file(&media.file_ref)
        })
        .await?;

        let request = TranscriptionRequest {
            data,
            mime_type: media
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string()),
            file_name: file_name_for(media),
        };
        retry(policy, "transcription", cancel, |_| {
            transcriber.transcribe(request.clone())
        })
        .await
    }

    async fn deliver(
        &self,
        chat_id: i64,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<MessageId, ParleyError> {
        retry(&self.policies.delivery, "delivery", cancel, |_| {
            self.channel.send_text(chat_id, text)
        })
        .await
    }
}

#[async_trait]
impl JobHandler for ConversationEngine {
    async fn handle(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ParleyError> {
        let msg = job.message()?;
        let outcome = self.process(&msg, cancel).await?;
        debug!(job_id = job.id, attempt = job.attempt(), ?outcome, "job handled");
        Ok(())
    }
}

/// File name handed to the transcription API, which infers the format from it.
fn file_name_for(media: &MediaAttachment) -> String {
    match media.kind {
        MediaKind::Voice => "voice.ogg".to_string(),
        MediaKind::Audio => {
            let ext = match media.mime_type.as_deref() {
                Some("audio/mpeg") | Some("audio/mp3") => "mp3",
                Some("audio/mp4") | Some("audio/x-m4a") | Some("audio/m4a") => "m4a",
                Some("audio/wav") | Some("audio/x-wav") => "wav",
                Some("audio/webm") => "webm",
                Some("audio/flac") => "flac",
                _ => "ogg",
            };
            format!("audio.{ext}")
        }
    }
}
