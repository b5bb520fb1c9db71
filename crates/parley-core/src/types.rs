// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Parley pipeline.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Identifier of a message delivered through a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Transcription,
    Storage,
    Queue,
}

// --- Inbound messages ---

/// Kind of media attached to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Voice,
    Audio,
}

/// Media reference carried by an inbound message. The file itself stays with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub file_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A chat message accepted from the messaging provider.
///
/// `update_id` is the provider's delivery identifier and the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
}

impl InboundMessage {
    /// Trimmed text, or `None` when absent or blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

// --- Work queue ---

/// Lifecycle status of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed (or delayed until `available_at_ms`).
    Pending,
    /// Claimed by exactly one worker slot.
    Active,
    Completed,
    /// Exhausted its attempts; a dead-letter entry exists for it.
    Failed,
}

/// A unit of work owned by the queue until claimed by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub queue_name: String,
    /// Serialization key: jobs sharing a key never run concurrently.
    pub group_key: String,
    /// JSON-encoded [`InboundMessage`].
    pub payload: String,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at_ms: i64,
    /// Claim generation. Settling or renewing the job requires the current value.
    pub lease: i64,
}

impl Job {
    /// Decode the job payload.
    pub fn message(&self) -> Result<InboundMessage, ParleyError> {
        serde_json::from_str(&self.payload).map_err(|e| {
            ParleyError::Validation(format!("job {} has an undecodable payload: {e}", self.id))
        })
    }

    /// 1-based number of the attempt currently executing.
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }
}

/// Parameters for enqueueing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub queue_name: String,
    pub group_key: String,
    pub payload: String,
    pub max_attempts: u32,
}

impl NewJob {
    /// Job carrying an inbound message, serialized per chat.
    pub fn for_message(
        queue_name: &str,
        msg: &InboundMessage,
        max_attempts: u32,
    ) -> Result<Self, ParleyError> {
        let payload = serde_json::to_string(msg)
            .map_err(|e| ParleyError::Internal(format!("encode job payload: {e}")))?;
        Ok(Self {
            queue_name: queue_name.to_string(),
            group_key: msg.chat_id.to_string(),
            payload,
            max_attempts,
        })
    }
}

/// What `nack` did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Requeued; becomes visible again after `delay_ms`.
    Retrying { attempts_made: u32, delay_ms: i64 },
    /// Attempt ceiling reached; moved to the dead-letter channel.
    DeadLettered { attempts_made: u32 },
    /// The claim was reclaimed and handed out again; nothing was recorded.
    LeaseLost,
}

/// Read-only queue depth counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

/// A quarantined job that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEntry {
    pub original_job_id: i64,
    pub original_queue: String,
    pub group_key: String,
    pub attempts_made: u32,
    pub failed_at_ms: i64,
    pub error_message: String,
    pub payload: String,
}

/// Operator-facing view of a job or dead-letter entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: i64,
    pub name: String,
    pub attempts_made: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub timestamp: i64,
    pub data: serde_json::Value,
}

impl JobSnapshot {
    /// Payload as JSON when decodable, the raw string otherwise.
    pub fn payload_value(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload)
            .unwrap_or_else(|_| serde_json::Value::String(payload.to_string()))
    }
}

impl From<&DeadLetterEntry> for JobSnapshot {
    fn from(entry: &DeadLetterEntry) -> Self {
        JobSnapshot {
            id: entry.original_job_id,
            name: entry.original_queue.clone(),
            attempts_made: entry.attempts_made,
            failed_reason: Some(entry.error_message.clone()),
            timestamp: entry.failed_at_ms,
            data: JobSnapshot::payload_value(&entry.payload),
        }
    }
}

// --- Rate limiting ---

/// Result of consuming one request from a fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests counted in the current window, including this one.
    pub count: u32,
    /// Seconds until the window resets; positive whenever `allowed` is false.
    pub retry_after_secs: u64,
}

// --- Conversation ---

/// Coaching style applied to generated replies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CoachMode {
    /// Baseline mode, used when nothing else is chosen or recommended.
    #[default]
    Balanced,
    Supportive,
    Challenging,
    Strategic,
}

impl CoachMode {
    pub const ALL: [CoachMode; 4] = [
        CoachMode::Balanced,
        CoachMode::Supportive,
        CoachMode::Challenging,
        CoachMode::Strategic,
    ];
}

/// Per-user flow state derived from the persisted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConversationState {
    Idle,
    AwaitingFeedback,
    AwaitingModeRecommendation,
}

/// One row per user; updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConversationState {
    pub user_id: i64,
    pub awaiting_feedback: bool,
    pub awaiting_mode_recommendation: bool,
    pub coach_mode: CoachMode,
}

impl UserConversationState {
    /// Fresh state for a user seen for the first time.
    pub fn new(user_id: i64, coach_mode: CoachMode) -> Self {
        Self {
            user_id,
            awaiting_feedback: false,
            awaiting_mode_recommendation: false,
            coach_mode,
        }
    }

    pub fn state(&self) -> ConversationState {
        if self.awaiting_feedback {
            ConversationState::AwaitingFeedback
        } else if self.awaiting_mode_recommendation {
            ConversationState::AwaitingModeRecommendation
        } else {
            ConversationState::Idle
        }
    }

    /// Copy of this row with the flags set for `state`. At most one flag is ever set.
    pub fn with_state(&self, state: ConversationState) -> Self {
        Self {
            awaiting_feedback: state == ConversationState::AwaitingFeedback,
            awaiting_mode_recommendation: state == ConversationState::AwaitingModeRecommendation,
            ..self.clone()
        }
    }

    pub fn with_mode(&self, coach_mode: CoachMode) -> Self {
        Self {
            coach_mode,
            ..self.clone()
        }
    }
}

/// Multi-turn sub-flows tracked by the funnel analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Funnel {
    Feedback,
    ModeRecommendation,
}

/// Funnel steps. Events are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    Started,
    Completed,
    Cancelled,
}

impl Funnel {
    /// Step name used in counter keys. Completion is named per funnel.
    pub fn step_name(self, step: FlowStep) -> &'static str {
        match (self, step) {
            (_, FlowStep::Started) => "started",
            (_, FlowStep::Cancelled) => "cancelled",
            (Funnel::Feedback, FlowStep::Completed) => "saved",
            (Funnel::ModeRecommendation, FlowStep::Completed) => "recommended",
        }
    }

    /// Rolled-up counter key, e.g. `feedback:saved`.
    pub fn counter_key(self, step: FlowStep) -> String {
        format!("{self}:{}", self.step_name(step))
    }
}

/// Funnel totals read from the rolled-up counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub started: u64,
    pub completed: u64,
    pub cancelled: u64,
}

/// Author of a chat-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// A persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub chat_id: i64,
    pub user_id: i64,
    pub update_id: i64,
    pub role: HistoryRole,
    pub content: String,
    pub created_at_ms: i64,
}

/// Where the delivered reply text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ReplySource {
    Generated,
    Fallback,
    TimeoutFallback,
}

/// Record of one generated reply, for operational reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub mode: CoachMode,
    pub analysis: String,
    pub analysis_degraded: bool,
    pub reply: String,
    pub reply_source: ReplySource,
    pub latency_ms: i64,
}

/// Free-text feedback captured by the feedback flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub text: String,
}

/// Funnel event appended alongside a turn commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEvent {
    pub funnel: Funnel,
    pub step: FlowStep,
}

/// Side effects of one processed message, committed in a single transaction
/// after the reply was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCommit {
    pub update_id: i64,
    pub chat_id: i64,
    /// Commit timestamp, unix epoch milliseconds.
    pub at_ms: i64,
    pub state: UserConversationState,
    pub flow_events: Vec<FlowEvent>,
    pub feedback: Option<FeedbackRecord>,
    pub history: Vec<HistoryEntry>,
    pub report: Option<ReportRecord>,
}

impl TurnCommit {
    pub fn new(update_id: i64, chat_id: i64, at_ms: i64, state: UserConversationState) -> Self {
        Self {
            update_id,
            chat_id,
            at_ms,
            state,
            flow_events: Vec::new(),
            feedback: None,
            history: Vec::new(),
            report: None,
        }
    }
}

// --- Digest ---

/// A delivered digest; its `(chat_id, digest_date)` pair is the dedupe guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestRecord {
    pub chat_id: i64,
    /// Local date (`YYYY-MM-DD`) in the configured digest timezone.
    pub digest_date: String,
    pub sent_at_ms: i64,
    pub message_count: u32,
    pub used_fallback: bool,
}

/// Aggregate digest delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStatus {
    pub total_sent: u64,
    pub sent_today: u64,
    pub fallback_sent: u64,
    pub latest: Option<DigestRecord>,
}

// --- Providers ---

/// A single chat message sent to a text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

/// A completion request to a text-generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Token usage information from a provider response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completion response from a text-generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Audio to be transcribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json() -> &'static str {
        r#"{"updateId":7,"chatId":11,"userId":13,"username":"ana","text":"hi"}"#
    }

    #[test]
    fn inbound_message_uses_camel_case() {
        let msg: InboundMessage = serde_json::from_str(message_json()).unwrap();
        assert_eq!(msg.update_id, 7);
        assert_eq!(msg.chat_id, 11);
        assert_eq!(msg.username.as_deref(), Some("ana"));
        assert!(msg.media.is_none());

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"updateId\":7"));
        assert!(!json.contains("media"));
    }

    #[test]
    fn trimmed_text_filters_blank() {
        let mut msg: InboundMessage = serde_json::from_str(message_json()).unwrap();
        msg.text = Some("   ".into());
        assert_eq!(msg.trimmed_text(), None);
        msg.text = Some("  hey ".into());
        assert_eq!(msg.trimmed_text(), Some("hey"));
    }

    #[test]
    fn job_payload_decoding() {
        let mut job = Job {
            id: 1,
            queue_name: "inbound".into(),
            group_key: "11".into(),
            payload: message_json().into(),
            status: JobStatus::Active,
            attempts_made: 0,
            max_attempts: 3,
            enqueued_at_ms: 0,
            lease: 1,
        };
        assert_eq!(job.message().unwrap().user_id, 13);
        assert_eq!(job.attempt(), 1);

        job.payload = "not json".into();
        assert!(matches!(job.message(), Err(ParleyError::Validation(_))));
    }

    #[test]
    fn state_flags_round_trip() {
        let state = UserConversationState::new(1, CoachMode::Balanced);
        assert_eq!(state.state(), ConversationState::Idle);

        let awaiting = state.with_state(ConversationState::AwaitingFeedback);
        assert!(awaiting.awaiting_feedback);
        assert!(!awaiting.awaiting_mode_recommendation);
        assert_eq!(awaiting.state(), ConversationState::AwaitingFeedback);

        let switched = awaiting.with_state(ConversationState::AwaitingModeRecommendation);
        assert!(!switched.awaiting_feedback);
        assert_eq!(switched.state(), ConversationState::AwaitingModeRecommendation);

        assert_eq!(switched.with_state(ConversationState::Idle).state(), ConversationState::Idle);
    }

    #[test]
    fn coach_mode_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(CoachMode::from_str("Supportive").unwrap(), CoachMode::Supportive);
        assert_eq!(CoachMode::from_str("strategic").unwrap(), CoachMode::Strategic);
        assert!(CoachMode::from_str("unknown").is_err());
        assert_eq!(CoachMode::Challenging.to_string(), "challenging");
    }

    #[test]
    fn funnel_counter_keys() {
        assert_eq!(Funnel::Feedback.counter_key(FlowStep::Started), "feedback:started");
        assert_eq!(Funnel::Feedback.counter_key(FlowStep::Completed), "feedback:saved");
        assert_eq!(
            Funnel::ModeRecommendation.counter_key(FlowStep::Completed),
            "mode_recommendation:recommended"
        );
        assert_eq!(
            Funnel::ModeRecommendation.counter_key(FlowStep::Cancelled),
            "mode_recommendation:cancelled"
        );
    }

    #[test]
    fn dead_letter_snapshot() {
        let entry = DeadLetterEntry {
            original_job_id: 9,
            original_queue: "inbound".into(),
            group_key: "11".into(),
            attempts_made: 3,
            failed_at_ms: 1_000,
            error_message: "boom".into(),
            payload: message_json().into(),
        };
        let snap = JobSnapshot::from(&entry);
        assert_eq!(snap.id, 9);
        assert_eq!(snap.failed_reason.as_deref(), Some("boom"));
        assert_eq!(snap.data["chatId"], 11);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["attemptsMade"], 3);
        assert_eq!(json["failedReason"], "boom");
    }
}
