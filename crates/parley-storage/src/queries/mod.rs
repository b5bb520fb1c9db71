// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per persisted concern.

pub mod conversation;
pub mod dead_letter;
pub mod digest;
pub mod idempotency;
pub mod queue;
pub mod rate_limit;
