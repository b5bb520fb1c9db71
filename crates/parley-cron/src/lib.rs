// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled jobs for Parley.
//!
//! Provides a timezone-aware cron [`Scheduler`] and the daily [`DigestJob`]
//! that summarises each active chat once per local date.

pub mod digest;
pub mod scheduler;

pub use digest::{DigestJob, DigestRun, DigestSettings};
pub use scheduler::{Schedule, ScheduledJob, Scheduler};
