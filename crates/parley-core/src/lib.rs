// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley coaching bot.
//!
//! This crate provides the trait definitions, error types, and common types
//! shared by every Parley crate. Storage, channel and provider integrations
//! implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ParleyError;
pub use types::{AdapterType, HealthStatus, MessageId};

pub use traits::{
    ChannelAdapter, PluginAdapter, ProviderAdapter, QueueAdapter, StorageAdapter,
    TranscriptionAdapter,
};

/// Current wall-clock time as unix epoch milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Channel,
            AdapterType::Provider,
            AdapterType::Transcription,
            AdapterType::Storage,
            AdapterType::Queue,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }

        let json = serde_json::to_string(&AdapterType::Channel).expect("should serialize");
        let parsed: AdapterType = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed, AdapterType::Channel);
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn now_ms_is_after_2024() {
        assert!(now_ms() > 1_704_067_200_000);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_transcription_adapter<T: TranscriptionAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_queue_adapter<T: QueueAdapter>() {}
    }
}
