// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Handles POST /webhook, GET /health, and the admin recovery routes.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use parley_core::ParleyError;
use parley_core::types::{DigestStatus, HealthStatus, JobSnapshot, NewJob, QueueCounts};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{ClientIp, RateScope, check_rate_limit};
use crate::server::GatewayState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

/// `?limit=N` for the list routes.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListQuery {
    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub ok: bool,
    pub queues: QueueDepths,
}

#[derive(Debug, Serialize)]
pub struct QueueDepths {
    pub main: QueueCounts,
    pub dlq: QueueCounts,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub ok: bool,
    pub jobs: Vec<JobSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStatusResponse {
    pub ok: bool,
    pub today: String,
    #[serde(flatten)]
    pub status: DigestStatus,
}

fn ok_body(extra: serde_json::Value) -> Json<serde_json::Value> {
    let mut body = json!({ "ok": true });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    Json(body)
}

fn internal_error(context: &'static str, e: &ParleyError) -> Response {
    tracing::error!(error = %e, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": "internal" })),
    )
        .into_response()
}

/// POST /webhook
///
/// Always answers 200 except for rate limiting (429) and storage failure
/// (500, so Telegram redelivers). A wrong secret gets the same plain
/// `{ok:true}` as an accepted update.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers
        .get(parley_telegram::SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !parley_telegram::secret_matches(state.settings.webhook_secret.as_deref(), provided) {
        metrics::counter!("parley_webhook_total", "result" => "bad_secret").increment(1);
        tracing::warn!(ip = %ip, "webhook secret mismatch, ignoring update");
        return ok_body(json!({})).into_response();
    }

    if let Err(response) = check_rate_limit(&state, RateScope::Webhook, ip).await {
        metrics::counter!("parley_webhook_total", "result" => "rate_limited").increment(1);
        return response;
    }

    let msg = match parley_telegram::parse_update(&body) {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            metrics::counter!("parley_webhook_total", "result" => "skipped").increment(1);
            tracing::debug!("unsupported update skipped");
            return ok_body(json!({ "skipped": true })).into_response();
        }
        Err(e) => {
            metrics::counter!("parley_webhook_total", "result" => "skipped").increment(1);
            tracing::debug!(error = %e, "malformed update skipped");
            return ok_body(json!({ "skipped": true })).into_response();
        }
    };

    let job = match NewJob::for_message(&state.settings.queue_name, &msg, state.settings.max_attempts)
    {
        Ok(job) => job,
        Err(e) => return internal_error("failed to encode webhook job", &e),
    };

    match state
        .storage
        .accept_update(&msg, job, parley_core::now_ms())
        .await
    {
        Ok(Some(job_id)) => {
            metrics::counter!("parley_webhook_total", "result" => "accepted").increment(1);
            tracing::info!(
                update_id = msg.update_id,
                chat_id = msg.chat_id,
                job_id,
                "update enqueued"
            );
            ok_body(json!({})).into_response()
        }
        Ok(None) => {
            metrics::counter!("parley_webhook_total", "result" => "duplicate").increment(1);
            tracing::debug!(update_id = msg.update_id, "duplicate update");
            ok_body(json!({ "duplicate": true })).into_response()
        }
        Err(e) => {
            metrics::counter!("parley_webhook_total", "result" => "error").increment(1);
            internal_error("failed to accept webhook update", &e)
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (status, detail) = match state.storage.health_check().await {
        Ok(HealthStatus::Healthy) => ("ok", None),
        Ok(HealthStatus::Degraded(reason)) => ("degraded", Some(reason)),
        Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", Some(reason)),
        Err(e) => ("unhealthy", Some(e.to_string())),
    };
    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        detail,
    };
    (code, Json(body)).into_response()
}

/// GET /queue/health
pub async fn get_queue_health(State(state): State<GatewayState>) -> Response {
    let main = match state
        .queue
        .counts(&state.settings.queue_name, parley_core::now_ms())
        .await
    {
        Ok(counts) => counts,
        Err(e) => return internal_error("failed to read queue counts", &e),
    };
    let dlq = match state.queue.dead_letter_counts().await {
        Ok(counts) => counts,
        Err(e) => return internal_error("failed to read dead-letter counts", &e),
    };
    Json(QueueHealthResponse {
        ok: true,
        queues: QueueDepths { main, dlq },
    })
    .into_response()
}

/// GET /queue/failed?limit=N
pub async fn get_failed_jobs(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state
        .queue
        .failed_jobs(&state.settings.queue_name, query.limit())
        .await
    {
        Ok(jobs) => Json(JobListResponse { ok: true, jobs }).into_response(),
        Err(e) => internal_error("failed to list failed jobs", &e),
    }
}

/// GET /queue/dlq?limit=N
pub async fn get_dead_letters(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.queue.dead_letters(query.limit()).await {
        Ok(entries) => Json(JobListResponse {
            ok: true,
            jobs: entries.iter().map(JobSnapshot::from).collect(),
        })
        .into_response(),
        Err(e) => internal_error("failed to list dead letters", &e),
    }
}

/// POST /queue/dlq/requeue/{job_id}
pub async fn post_requeue(State(state): State<GatewayState>, Path(job_id): Path<i64>) -> Response {
    match state
        .queue
        .requeue_dead_letter(job_id, parley_core::now_ms())
        .await
    {
        Ok(Some(new_job_id)) => {
            tracing::info!(job_id, new_job_id, "dead letter requeued");
            ok_body(json!({ "jobId": job_id, "newJobId": new_job_id })).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "not_found", "jobId": job_id })),
        )
            .into_response(),
        Err(e) => internal_error("failed to requeue dead letter", &e),
    }
}

/// GET /digest/status
pub async fn get_digest_status(State(state): State<GatewayState>) -> Response {
    let today = chrono::Utc::now()
        .with_timezone(&state.settings.digest_timezone)
        .format("%Y-%m-%d")
        .to_string();
    match state.storage.digest_status(&today).await {
        Ok(status) => Json(DigestStatusResponse {
            ok: true,
            today,
            status,
        })
        .into_response(),
        Err(e) => internal_error("failed to read digest status", &e),
    }
}
