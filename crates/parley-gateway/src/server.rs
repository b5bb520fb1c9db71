// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use chrono_tz::Tz;
use parley_config::model::ParleyConfig;
use parley_core::{ParleyError, QueueAdapter, StorageAdapter};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::{admin_middleware, client_ip_middleware};
use crate::handlers;

/// Request-path settings resolved once from [`ParleyConfig`].
#[derive(Clone)]
pub struct GatewaySettings {
    pub webhook_secret: Option<String>,
    pub admin_token: Option<String>,
    pub trust_forwarded_for: bool,
    pub queue_name: String,
    pub max_attempts: u32,
    pub webhook_max_requests: u32,
    pub webhook_window_secs: u64,
    pub admin_max_requests: u32,
    pub admin_window_secs: u64,
    /// Timezone that defines "today" for digest status.
    pub digest_timezone: Tz,
}

impl GatewaySettings {
    pub fn from_config(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let digest_timezone = Tz::from_str(&config.digest.timezone).map_err(|_| {
            ParleyError::Config(format!(
                "digest.timezone: unknown timezone \"{}\"",
                config.digest.timezone
            ))
        })?;
        Ok(Self {
            webhook_secret: config.telegram.webhook_secret.clone(),
            admin_token: config.gateway.admin_token.clone(),
            trust_forwarded_for: config.gateway.trust_forwarded_for,
            queue_name: config.queue.name.clone(),
            max_attempts: config.queue.max_attempts,
            webhook_max_requests: config.rate_limit.webhook_max_requests,
            webhook_window_secs: config.rate_limit.webhook_window_secs,
            admin_max_requests: config.rate_limit.admin_max_requests,
            admin_window_secs: config.rate_limit.admin_window_secs,
            digest_timezone,
        })
    }
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("queue_name", &self.queue_name)
            .field("max_attempts", &self.max_attempts)
            .field("webhook_max_requests", &self.webhook_max_requests)
            .field("webhook_window_secs", &self.webhook_window_secs)
            .field("admin_max_requests", &self.admin_max_requests)
            .field("admin_window_secs", &self.admin_window_secs)
            .field("digest_timezone", &self.digest_timezone)
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub queue: Arc<dyn QueueAdapter>,
    pub settings: Arc<GatewaySettings>,
    /// Process start time for uptime reporting.
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        queue: Arc<dyn QueueAdapter>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            storage,
            queue,
            settings: Arc::new(settings),
            started_at: Instant::now(),
        }
    }
}

/// Builds the gateway router:
/// - GET /health (public)
/// - POST /webhook (shared-secret header, per-IP rate limit)
/// - GET /queue/health, /queue/failed, /queue/dlq, /digest/status (admin)
/// - POST /queue/dlq/requeue/{job_id} (admin)
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhook", post(handlers::post_webhook))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/queue/health", get(handlers::get_queue_health))
        .route("/queue/failed", get(handlers::get_failed_jobs))
        .route("/queue/dlq", get(handlers::get_dead_letters))
        .route("/queue/dlq/requeue/{job_id}", post(handlers::post_requeue))
        .route("/digest/status", get(handlers::get_digest_status))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(axum_middleware::from_fn_with_state(
            state,
            client_ip_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Binds `host:port` and serves until `shutdown` is cancelled.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ParleyError> {
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Network {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!(addr = %addr, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| ParleyError::Network {
        message: format!("gateway server error: {e}"),
        source: Some(Box::new(e)),
    })?;

    tracing::info!("gateway stopped");
    Ok(())
}
