// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message processing for the Parley coaching bot.
//!
//! The [`WorkerEngine`] claims jobs from the durable queue and hands each one
//! to the [`ConversationEngine`], which:
//! - resolves voice and audio to text
//! - classifies the text and advances the per-user state machine
//! - generates a reply through the analyzer/reporter pipeline when needed
//! - delivers the reply, then commits every side effect in one transaction

pub mod engine;
pub mod flow;
pub mod intent;
pub mod pipeline;
pub mod prompts;
pub mod recommend;
pub mod shutdown;
pub mod telemetry;
pub mod worker;

pub use engine::{ConversationEngine, EngineSettings, TurnOutcome};
pub use flow::{Action, Transition, transition};
pub use intent::{Intent, classify_intent};
pub use pipeline::{Generated, GenerationPipeline, GenerationSettings, StagePolicies};
pub use recommend::{Recommendation, recommend_mode};
pub use shutdown::install_signal_handler;
pub use telemetry::{WorkerMetrics, register_metrics};
pub use worker::{JobHandler, WorkerEngine};
