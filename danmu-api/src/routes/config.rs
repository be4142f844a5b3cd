//! `/api/config`: read the active snapshot, apply hot patches.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

use super::success_envelope;

pub async fn get_config(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let settings = state.orchestrator.config().settings();
    let snapshot = serde_json::to_value(settings.as_ref()).map_err(danmu_core::Error::from)?;
    Ok(Json(success_envelope(json!({ "config": snapshot }))))
}

/// Apply a `{key: value}` patch: in-memory snapshot, derived state, and the
/// persisted overlay all update together.
pub async fn put_config(
    State(state): State<AppState>,
    Json(body): Json<HashMap<String, Value>>,
) -> AppResult<Json<Value>> {
    if body.is_empty() {
        return Err(AppError::bad_request("empty config patch"));
    }

    let patch: HashMap<String, String> = body
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();

    let storage = state.orchestrator.storage().clone();
    storage.ensure_ready().await;
    let overlay = state.orchestrator.config().apply_patch(&patch);
    storage.persist_overlay(&overlay).await;

    Ok(Json(success_envelope(json!({ "applied": patch.len() }))))
}
