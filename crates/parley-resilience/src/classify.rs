// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retryable vs terminal error classification.

use parley_core::ParleyError;

/// Whether an error should consume local retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: timeout, connection failure, 429, or 5xx.
    Retryable,
    /// Retrying will not help.
    Terminal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Retryable
    }
}

/// Classify an error from an external call.
///
/// Upstream errors without a status code (e.g. a body that failed to decode)
/// are terminal. A cancelled call is retryable: the work was interrupted, so
/// the job should run again rather than be dead-lettered.
pub fn classify(err: &ParleyError) -> ErrorClass {
    match err {
        ParleyError::Timeout { .. }
        | ParleyError::Network { .. }
        | ParleyError::Cancelled { .. } => ErrorClass::Retryable,
        ParleyError::Provider { status, .. } | ParleyError::Channel { status, .. } => {
            match status {
                Some(408 | 429) => ErrorClass::Retryable,
                Some(s) if (500..600).contains(s) => ErrorClass::Retryable,
                _ => ErrorClass::Terminal,
            }
        }
        ParleyError::Config(_)
        | ParleyError::Storage { .. }
        | ParleyError::Validation(_)
        | ParleyError::NotFound { .. }
        | ParleyError::Internal(_) => ErrorClass::Terminal,
    }
}
