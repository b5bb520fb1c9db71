// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley message pipeline.

use thiserror::Error;

/// The primary error type used across all Parley adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging provider errors (delivery failure, file download, rejected request).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        /// HTTP status (or provider equivalent) when the provider answered.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Text-generation or transcription provider errors.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection-level failures: refused, reset, DNS, TLS.
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The caller gave up on the operation (shutdown or a lost job lease).
    #[error("{stage} cancelled")]
    Cancelled { stage: &'static str },

    /// Malformed input (inbound payloads, job payloads, bad arguments).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Upstream status code, if the failing provider returned one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ParleyError::Channel { status, .. } | ParleyError::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// True for timeouts, whether raised by a local deadline or reported by the provider.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ParleyError::Timeout { .. }) || self.status() == Some(408)
    }

    /// Shorthand for a storage error built from any error value.
    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        ParleyError::Storage {
            source: Box::new(e),
        }
    }
}
