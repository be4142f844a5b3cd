//! Request gateway: token gate, path normalization, and the comment-endpoint
//! rate limit.
//!
//! Runs before routing (the router is mounted behind it as a fallback
//! service), so it can rewrite the request path that routing sees.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use crate::{error::AppError, AppState};

/// Paths that bypass the token gate and normalization entirely.
const BYPASS_PATHS: [&str; 6] = [
    "/",
    "/favicon.ico",
    "/robots.txt",
    "/api/login",
    "/api/logout",
    "/api/logs",
];

fn is_bypassed(path: &str) -> bool {
    BYPASS_PATHS.contains(&path) || path.starts_with("/api/config")
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
/// address. The IPv4-mapped `::ffff:` prefix is stripped.
pub fn client_ip(req: &Request) -> String {
    let from_headers = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

    let ip = from_headers.unwrap_or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    });
    ip.trim_start_matches("::ffff:").to_string()
}

/// Strip the token prefix if present; `Err` means the token was required and
/// missing or wrong.
fn apply_token_gate<'a>(path: &'a str, token: &str, token_is_default: bool) -> Result<&'a str, ()> {
    let prefix = format!("/{token}");
    if let Some(rest) = path.strip_prefix(&prefix) {
        if rest.is_empty() {
            return Ok("/");
        }
        if rest.starts_with('/') {
            return Ok(rest);
        }
    }
    // No token prefix: only acceptable while running on the stock token.
    if token_is_default {
        Ok(path)
    } else {
        Err(())
    }
}

/// Collapse repeated `/api/v2/` prefixes and make sure the path starts with
/// one.
fn normalize_path(path: &str) -> String {
    let mut path = path.to_string();
    while let Some(rest) = path.strip_prefix("/api/v2/api/v2/") {
        path = format!("/api/v2/{rest}");
    }
    if !path.starts_with("/api/") {
        path = format!("/api/v2{path}");
    }
    path
}

pub async fn gateway(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let settings = state.orchestrator.config().settings();
    let original_path = req.uri().path().to_string();

    if is_bypassed(&original_path) {
        return next.run(req).await;
    }

    let Ok(stripped) = apply_token_gate(&original_path, &settings.token, settings.token_is_default())
    else {
        return AppError::unauthorized("invalid token").into_response();
    };
    if is_bypassed(stripped) {
        return next.run(req).await;
    }

    let normalized = normalize_path(stripped);

    // Sliding-window rate limit, comment endpoints only.
    if normalized.starts_with("/api/v2/comment") && settings.rate_limit_max_requests > 0 {
        let ip = client_ip(&req);
        if let Err(retry_after) = state
            .rate_limiter
            .check(&ip, settings.rate_limit_max_requests)
        {
            warn!(ip, retry_after, "Rate limited");
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    if normalized != original_path {
        let new_uri = match req.uri().query() {
            Some(query) => format!("{normalized}?{query}"),
            None => normalized,
        };
        if let Ok(uri) = new_uri.parse::<Uri>() {
            *req.uri_mut() = uri;
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_gate_with_custom_token() {
        assert_eq!(
            apply_token_gate("/secret/api/v2/search/anime", "secret", false),
            Ok("/api/v2/search/anime")
        );
        assert_eq!(apply_token_gate("/api/v2/search/anime", "secret", false), Err(()));
        // A token that merely prefixes another segment is not a match.
        assert_eq!(apply_token_gate("/secretx/api/v2/x", "secret", false), Err(()));
    }

    #[test]
    fn test_token_gate_with_default_token() {
        assert_eq!(
            apply_token_gate("/api/v2/search/anime", "87654321", true),
            Ok("/api/v2/search/anime")
        );
        assert_eq!(
            apply_token_gate("/87654321/api/v2/search/anime", "87654321", true),
            Ok("/api/v2/search/anime")
        );
    }

    #[test]
    fn test_normalize_path_collapses_repeats() {
        assert_eq!(
            normalize_path("/api/v2/api/v2/api/v2/search/anime"),
            "/api/v2/search/anime"
        );
        assert_eq!(normalize_path("/api/v2/comment/10001"), "/api/v2/comment/10001");
        assert_eq!(normalize_path("/search/anime"), "/api/v2/search/anime");
    }

    #[test]
    fn test_bypass_list() {
        assert!(is_bypassed("/"));
        assert!(is_bypassed("/favicon.ico"));
        assert!(is_bypassed("/api/config"));
        assert!(is_bypassed("/api/config/patch"));
        assert!(!is_bypassed("/api/v2/search/anime"));
    }
}
