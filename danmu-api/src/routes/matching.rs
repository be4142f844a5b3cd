//! `POST /api/v2/match`.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

use super::success_envelope;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub file_name: String,
}

pub async fn match_file(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> AppResult<Json<Value>> {
    if request.file_name.trim().is_empty() {
        return Err(AppError::bad_request("fileName is required"));
    }

    let result = state.orchestrator.match_file(&request.file_name).await;
    Ok(Json(success_envelope(json!({
        "isMatched": result.is_matched,
        "matches": result.matches,
    }))))
}
