// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parley.toml` > `~/.config/parley/parley.toml` > `/etc/parley/parley.toml`
//! with environment variable overrides via `PARLEY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ParleyConfig;

/// Top-level config sections recognized in `PARLEY_*` variable names.
const SECTIONS: &[&str] = &[
    "conversation",
    "rate_limit",
    "telegram",
    "gateway",
    "storage",
    "digest",
    "openai",
    "agent",
    "queue",
    "llm",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parley/parley.toml` (system-wide)
/// 3. `~/.config/parley/parley.toml` (user XDG config)
/// 4. `./parley.toml` (local directory)
/// 5. `PARLEY_*` environment variables
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file("/etc/parley/parley.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parley/parley.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parley.toml"))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key onto its dotted config path.
///
/// Uses an explicit section table instead of `Env::split("_")` because field
/// names contain underscores: `telegram_bot_token` must become
/// `telegram.bot_token`, not `telegram.bot.token`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| map_env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("telegram_bot_token"), "telegram.bot_token");
        assert_eq!(
            map_env_key("rate_limit_webhook_max_requests"),
            "rate_limit.webhook_max_requests"
        );
        assert_eq!(map_env_key("queue_max_attempts"), "queue.max_attempts");
        assert_eq!(
            map_env_key("llm_reporter_timeout_secs"),
            "llm.reporter_timeout_secs"
        );
        assert_eq!(map_env_key("gateway_admin_token"), "gateway.admin_token");
    }

    #[test]
    fn unknown_env_key_passes_through() {
        assert_eq!(map_env_key("nonsense"), "nonsense");
    }

    #[test]
    fn env_override_applies() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PARLEY_QUEUE_CONCURRENCY", "3");
            jail.set_env("PARLEY_TELEGRAM_WEBHOOK_SECRET", "s3cret");
            let config: ParleyConfig = Figment::new()
                .merge(Serialized::defaults(ParleyConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.queue.concurrency, 3);
            assert_eq!(config.telegram.webhook_secret.as_deref(), Some("s3cret"));
            Ok(())
        });
    }
}
