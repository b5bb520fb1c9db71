// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Parley.
//!
//! Receives Telegram webhook updates and turns each new update into a queued
//! job in a single ledger-plus-enqueue transaction. Also serves the admin
//! recovery routes (queue depth, failed jobs, dead letters, requeue, digest
//! status) and an unauthenticated liveness probe.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{ClientIp, RateScope};
pub use server::{GatewaySettings, GatewayState, router, serve};
