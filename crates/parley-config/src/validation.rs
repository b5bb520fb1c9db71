// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as parseable timezones and cron expressions, positive pool sizes, and
//! the ordering of per-stage timeouts.

use std::str::FromStr;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const COACH_MODES: &[&str] = &["balanced", "supportive", "challenging", "strategic"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
        if !is_loopback(host) && config.gateway.admin_token.is_none() {
            fail(format!(
                "gateway.admin_token is required when binding the non-loopback address `{host}`"
            ));
        }
    }

    if config.queue.name.trim().is_empty() {
        fail("queue.name must not be empty".to_string());
    }
    if config.queue.concurrency < 1 {
        fail("queue.concurrency must be at least 1".to_string());
    }
    if config.queue.max_attempts < 1 {
        fail("queue.max_attempts must be at least 1".to_string());
    }
    if config.queue.poll_interval_ms == 0 {
        fail("queue.poll_interval_ms must be positive".to_string());
    }
    if config.queue.lock_timeout_secs == 0 {
        fail("queue.lock_timeout_secs must be positive".to_string());
    }
    if config.queue.metrics_interval_secs == 0 {
        fail("queue.metrics_interval_secs must be positive".to_string());
    }

    if config.rate_limit.webhook_max_requests < 1 || config.rate_limit.webhook_window_secs < 1 {
        fail("rate_limit.webhook_max_requests and webhook_window_secs must be positive".to_string());
    }
    if config.rate_limit.admin_max_requests < 1 || config.rate_limit.admin_window_secs < 1 {
        fail("rate_limit.admin_max_requests and admin_window_secs must be positive".to_string());
    }

    let llm = &config.llm;
    if !(llm.transcription_timeout_secs < llm.analyzer_timeout_secs
        && llm.analyzer_timeout_secs <= llm.reporter_timeout_secs)
    {
        fail(format!(
            "llm timeouts must satisfy transcription < analyzer <= reporter, got {} / {} / {}",
            llm.transcription_timeout_secs, llm.analyzer_timeout_secs, llm.reporter_timeout_secs
        ));
    }
    if llm.delivery_timeout_secs == 0 || llm.digest_timeout_secs == 0 {
        fail("llm.delivery_timeout_secs and llm.digest_timeout_secs must be positive".to_string());
    }
    if llm.retry_max_attempts < 1 {
        fail("llm.retry_max_attempts must be at least 1".to_string());
    }
    if llm.retry_base_delay_ms > llm.retry_max_delay_ms {
        fail(format!(
            "llm.retry_base_delay_ms ({}) must not exceed llm.retry_max_delay_ms ({})",
            llm.retry_base_delay_ms, llm.retry_max_delay_ms
        ));
    }

    let mode = config.conversation.default_mode.to_ascii_lowercase();
    if !COACH_MODES.contains(&mode.as_str()) {
        fail(format!(
            "conversation.default_mode `{}` is not one of: {}",
            config.conversation.default_mode,
            COACH_MODES.join(", ")
        ));
    }

    if chrono_tz::Tz::from_str(&config.digest.timezone).is_err() {
        fail(format!(
            "digest.timezone `{}` is not a valid IANA timezone",
            config.digest.timezone
        ));
    }
    if let Err(e) = config.digest.schedule.parse::<croner::Cron>() {
        fail(format!(
            "digest.schedule `{}` is not a valid cron expression: {e}",
            config.digest.schedule
        ));
    }
    if config.digest.window_hours == 0 || config.digest.max_messages_per_chat == 0 {
        fail("digest.window_hours and digest.max_messages_per_chat must be positive".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = ParleyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let mut config = ParleyConfig::default();
        config.queue.concurrency = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "queue.concurrency"));
    }

    #[test]
    fn zero_lock_timeout_fails_validation() {
        let mut config = ParleyConfig::default();
        config.queue.lock_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "queue.lock_timeout_secs"));
    }

    #[test]
    fn public_bind_requires_admin_token() {
        let mut config = ParleyConfig::default();
        config.gateway.host = "0.0.0.0".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "admin_token"));

        config.gateway.admin_token = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn misordered_timeouts_fail_validation() {
        let mut config = ParleyConfig::default();
        config.llm.transcription_timeout_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "transcription < analyzer"));
    }

    #[test]
    fn bad_timezone_and_schedule_are_both_reported() {
        let mut config = ParleyConfig::default();
        config.digest.timezone = "Mars/Olympus".to_string();
        config.digest.schedule = "every day".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "digest.timezone"));
        assert!(has_error(&errors, "digest.schedule"));
    }

    #[test]
    fn unknown_default_mode_fails_validation() {
        let mut config = ParleyConfig::default();
        config.conversation.default_mode = "gentle".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "default_mode"));

        config.conversation.default_mode = "Supportive".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
