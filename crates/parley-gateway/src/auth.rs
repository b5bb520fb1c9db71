// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client identification, per-IP rate limiting, and admin authentication.
//!
//! Every request is tagged with a [`ClientIp`] taken from the socket peer
//! address, or from the first `X-Forwarded-For` hop when
//! `gateway.trust_forwarded_for` is set. Admin routes are rate limited per
//! IP first and then require `Authorization: Bearer <admin_token>`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::GatewayState;

/// Fixed-window limiter scope. Each scope has its own key prefix and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Webhook,
    Admin,
}

impl RateScope {
    fn as_str(self) -> &'static str {
        match self {
            RateScope::Webhook => "webhook",
            RateScope::Admin => "admin",
        }
    }
}

/// Address the request is attributed to for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Resolves the client address and stores it as a request extension.
pub async fn client_ip_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let ip = resolve_client_ip(peer, request.headers(), state.settings.trust_forwarded_for);
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

/// First `X-Forwarded-For` hop when trusted, else the peer address.
///
/// Requests with no usable address share the unspecified address bucket.
pub fn resolve_client_ip(peer: Option<IpAddr>, headers: &HeaderMap, trust_forwarded: bool) -> IpAddr {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Consumes one request for `ip` in `scope`.
///
/// Returns the 429 response to send when the window is exhausted. A
/// limiter storage failure lets the request through.
pub async fn check_rate_limit(
    state: &GatewayState,
    scope: RateScope,
    ip: IpAddr,
) -> Result<(), Response> {
    let settings = &state.settings;
    let (limit, window_secs) = match scope {
        RateScope::Webhook => (settings.webhook_max_requests, settings.webhook_window_secs),
        RateScope::Admin => (settings.admin_max_requests, settings.admin_window_secs),
    };
    let key = format!("rl:{}:{ip}", scope.as_str());
    let window_ms = (window_secs as i64).saturating_mul(1000);

    let decision = match state
        .storage
        .consume_rate_limit(&key, limit, window_ms, parley_core::now_ms())
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(scope = scope.as_str(), error = %e, "rate limiter unavailable, allowing request");
            return Ok(());
        }
    };
    if decision.allowed {
        return Ok(());
    }

    metrics::counter!("parley_rate_limited_total", "scope" => scope.as_str()).increment(1);
    tracing::debug!(
        scope = scope.as_str(),
        ip = %ip,
        count = decision.count,
        retry_after_secs = decision.retry_after_secs,
        "rate limited"
    );
    Err(rate_limited(decision.retry_after_secs))
}

fn rate_limited(retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "ok": false,
            "error": "rate_limited",
            "retryAfterSec": retry_after_secs,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Admin gate: per-IP rate limit, then bearer token.
///
/// Without a configured `admin_token` the routes are open; config validation
/// only allows that on a loopback bind.
pub async fn admin_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |c| c.0);
    if let Err(response) = check_rate_limit(&state, RateScope::Admin, ip).await {
        return response;
    }

    if let Some(expected) = state.settings.admin_token.as_deref() {
        let provided = parse_bearer_token(request.headers());
        if !provided.is_some_and(|token| tokens_match(expected, token)) {
            tracing::warn!(ip = %ip, path = %request.uri().path(), "admin request rejected");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "ok": false, "error": "unauthorized" })),
            )
                .into_response();
        }
    }

    next.run(request).await
}

fn parse_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Length-checked comparison that does not stop at the first differing byte.
fn tokens_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_is_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer = Some("10.0.0.1".parse().unwrap());

        assert_eq!(
            resolve_client_ip(peer, &headers, false),
            "10.0.0.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolve_client_ip(peer, &headers, true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn unparseable_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        let peer = Some("192.0.2.1".parse().unwrap());
        assert_eq!(
            resolve_client_ip(peer, &headers, true),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolve_client_ip(None, &HeaderMap::new(), true),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc "));
        assert_eq!(parse_bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(parse_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(parse_bearer_token(&headers), None);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "secreT"));
        assert!(!tokens_match("secret", "secret2"));
    }
}
