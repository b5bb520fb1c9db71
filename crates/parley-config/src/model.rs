// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Parley.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Telegram bot integration settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// OpenAI-compatible API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-IP request limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Work queue and worker pool settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// External call timeouts and local retry policy.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conversation defaults and static reply texts.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Daily digest schedule.
    #[serde(default)]
    pub digest: DigestConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the bot, used in logs and the welcome message.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Telegram bot integration configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables outbound delivery.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` header. `None` accepts every request.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// OpenAI-compatible API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. `None` requires the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the API, without a trailing slash.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model for the analyzer stage.
    #[serde(default = "default_analyzer_model")]
    pub analyzer_model: String,

    /// Model for the reporter stage.
    #[serde(default = "default_reporter_model")]
    pub reporter_model: String,

    /// Model for digest summaries.
    #[serde(default = "default_digest_model")]
    pub digest_model: String,

    /// Model for speech transcription.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            analyzer_model: default_analyzer_model(),
            reporter_model: default_reporter_model(),
            digest_model: default_digest_model(),
            transcription_model: default_transcription_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_analyzer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reporter_model() -> String {
    "gpt-4o".to_string()
}

fn default_digest_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind the HTTP server to.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on admin routes. Admin routes reject every
    /// request while this is unset.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy).
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            admin_token: None,
            trust_forwarded_for: false,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// Fixed-window limits, one pair per scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_webhook_max_requests")]
    pub webhook_max_requests: u32,

    #[serde(default = "default_webhook_window_secs")]
    pub webhook_window_secs: u64,

    #[serde(default = "default_admin_max_requests")]
    pub admin_max_requests: u32,

    #[serde(default = "default_admin_window_secs")]
    pub admin_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            webhook_max_requests: default_webhook_max_requests(),
            webhook_window_secs: default_webhook_window_secs(),
            admin_max_requests: default_admin_max_requests(),
            admin_window_secs: default_admin_window_secs(),
        }
    }
}

fn default_webhook_max_requests() -> u32 {
    120
}

fn default_webhook_window_secs() -> u64 {
    60
}

fn default_admin_max_requests() -> u32 {
    30
}

fn default_admin_window_secs() -> u64 {
    60
}

/// Work queue and worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Name of the main queue.
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Number of worker slots processing jobs in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempt ceiling before a job is dead-lettered.
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first queue-level retry; doubles each attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Idle poll interval when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a claimed job stays locked before it counts as stalled.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    #[serde(default = "default_completed_retention_hours")]
    pub completed_retention_hours: u64,

    #[serde(default = "default_dead_letter_retention_days")]
    pub dead_letter_retention_days: u64,

    /// Interval of the maintenance tick (metrics snapshot, reclaim, pruning).
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Maximum time to wait for in-flight jobs on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            concurrency: default_concurrency(),
            max_attempts: default_queue_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            completed_retention_hours: default_completed_retention_hours(),
            dead_letter_retention_days: default_dead_letter_retention_days(),
            metrics_interval_secs: default_metrics_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

fn default_queue_name() -> String {
    "inbound".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_queue_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_completed_retention_hours() -> u64 {
    24
}

fn default_dead_letter_retention_days() -> u64 {
    30
}

fn default_metrics_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Per-stage timeouts and the local retry policy for external calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_transcription_timeout_secs")]
    pub transcription_timeout_secs: u64,

    #[serde(default = "default_analyzer_timeout_secs")]
    pub analyzer_timeout_secs: u64,

    #[serde(default = "default_reporter_timeout_secs")]
    pub reporter_timeout_secs: u64,

    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    #[serde(default = "default_digest_timeout_secs")]
    pub digest_timeout_secs: u64,

    /// Attempts per external call within one job attempt.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            transcription_timeout_secs: default_transcription_timeout_secs(),
            analyzer_timeout_secs: default_analyzer_timeout_secs(),
            reporter_timeout_secs: default_reporter_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            digest_timeout_secs: default_digest_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_transcription_timeout_secs() -> u64 {
    20
}

fn default_analyzer_timeout_secs() -> u64 {
    30
}

fn default_reporter_timeout_secs() -> u64 {
    45
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_digest_timeout_secs() -> u64 {
    45
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

/// Conversation defaults and static texts used when generation degrades.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationConfig {
    /// Number of history rows fed to the analyzer.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Coach mode for users seen for the first time.
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Reply used when the reporter fails for a non-timeout reason.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Reply used when the reporter times out.
    #[serde(default = "default_timeout_fallback_reply")]
    pub timeout_fallback_reply: String,

    /// Analysis handed to the reporter when the analyzer fails.
    #[serde(default = "default_analysis_placeholder")]
    pub analysis_placeholder: String,

    /// Notice sent when a voice or audio message cannot be transcribed.
    #[serde(default = "default_transcription_failure_reply")]
    pub transcription_failure_reply: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            default_mode: default_mode(),
            fallback_reply: default_fallback_reply(),
            timeout_fallback_reply: default_timeout_fallback_reply(),
            analysis_placeholder: default_analysis_placeholder(),
            transcription_failure_reply: default_transcription_failure_reply(),
        }
    }
}

fn default_history_limit() -> u32 {
    12
}

fn default_mode() -> String {
    "balanced".to_string()
}

fn default_fallback_reply() -> String {
    "Sorry, I couldn't put a reply together just now. Please try again in a moment.".to_string()
}

fn default_timeout_fallback_reply() -> String {
    "That took longer than expected on my side. Please send your message again in a minute."
        .to_string()
}

fn default_analysis_placeholder() -> String {
    "Analysis unavailable. Respond to the latest message directly.".to_string()
}

fn default_transcription_failure_reply() -> String {
    "I couldn't make out that voice message. Could you send it again or type it out?".to_string()
}

/// Daily digest configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DigestConfig {
    #[serde(default = "default_digest_enabled")]
    pub enabled: bool,

    /// Cron expression (5 fields) evaluated in `timezone`.
    #[serde(default = "default_digest_schedule")]
    pub schedule: String,

    /// IANA timezone name, e.g. "Europe/Berlin".
    #[serde(default = "default_digest_timezone")]
    pub timezone: String,

    /// Trailing activity window summarized by each digest.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,

    /// Cap on history rows gathered per chat.
    #[serde(default = "default_max_messages_per_chat")]
    pub max_messages_per_chat: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: default_digest_enabled(),
            schedule: default_digest_schedule(),
            timezone: default_digest_timezone(),
            window_hours: default_window_hours(),
            max_messages_per_chat: default_max_messages_per_chat(),
        }
    }
}

fn default_digest_enabled() -> bool {
    true
}

fn default_digest_schedule() -> String {
    "0 9 * * *".to_string()
}

fn default_digest_timezone() -> String {
    "UTC".to_string()
}

fn default_window_hours() -> u32 {
    24
}

fn default_max_messages_per_chat() -> u32 {
    50
}
