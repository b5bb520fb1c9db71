// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - text generation with scripted replies, errors and delays
//! - [`MockTranscriber`] - speech-to-text with a scripted result
//! - [`MockChannel`] - captures sent messages, serves files, fails on demand
//! - [`TestHarness`] - temp SQLite storage, the mocks and a [`parley_agent::ConversationEngine`]

pub mod harness;
pub mod mock_channel;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_channel::{MockChannel, SentMessage};
pub use mock_provider::{MockProvider, MockTranscriber, ScriptedReply};
