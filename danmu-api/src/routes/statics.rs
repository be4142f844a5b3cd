//! Banner and crawler endpoints. None of these touch the storage tier.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

pub async fn banner(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "danmu-proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": state.orchestrator.registry().names(),
    }))
}

pub async fn favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn robots() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}
