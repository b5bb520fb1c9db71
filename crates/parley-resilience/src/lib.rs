// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for calls to external collaborators.
//!
//! - [`classify`] decides whether a failure is worth retrying.
//! - [`RetryPolicy`] and [`retry`] implement the local retry loop: a
//!   per-attempt timeout, exponential backoff with jitter, and a sleep that
//!   wakes up early on shutdown.
//!
//! The local loop runs inside a single job attempt. It composes with the
//! work queue's own attempt ceiling rather than replacing it.

pub mod classify;
pub mod retry;

pub use classify::{ErrorClass, classify};
pub use retry::{RetryPolicy, retry};
