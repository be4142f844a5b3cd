//! `/api/v2/comment` endpoints: resolve, fetch, post-process, serialize.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use danmu_core::config::OutputFormat;
use danmu_core::models::Danmaku;
use danmu_core::pipeline;

use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub format: Option<String>,
    pub url: Option<String>,
}

/// `GET /api/v2/comment/{episodeId}`.
pub async fn comment_by_id(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<CommentQuery>,
) -> AppResult<Response> {
    let catalog = state.orchestrator.catalog();
    let url = catalog
        .find_url_by_id(id)
        .ok_or_else(|| AppError::not_found(format!("episode {id} not found")))?;

    // Playing an episode is the strongest "this was the right result"
    // signal; remember it for future matches of the same query.
    if state.orchestrator.config().settings().remember_last_select {
        if let Some(anime_id) = catalog.find_anime_id_by_comment_id(id) {
            catalog.set_prefer_by_anime_id(anime_id);
        }
    }

    let comments = state.orchestrator.comments_for_url(&url).await;
    Ok(render(&state, comments, query.format.as_deref()))
}

/// `GET /api/v2/comment?url=…`.
pub async fn comment_by_url(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> AppResult<Response> {
    let url = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::bad_request("url is required"))?;

    let comments = state.orchestrator.comments_for_url(url).await;
    Ok(render(&state, comments, query.format.as_deref()))
}

/// Run the post-processing pipeline and serialize in the requested format
/// (falling back to `DANMU_OUTPUT_FORMAT`).
fn render(state: &AppState, comments: Vec<Danmaku>, format: Option<&str>) -> Response {
    let config = state.orchestrator.config();
    let settings = config.settings();
    let derived = config.derived();

    let processed = pipeline::process(comments, &settings, &derived);

    let format = match format {
        Some("xml") => OutputFormat::Xml,
        Some("json") => OutputFormat::Json,
        _ => settings.danmu_output_format,
    };

    match format {
        OutputFormat::Json => Json(pipeline::to_json(&processed)).into_response(),
        OutputFormat::Xml => match pipeline::to_xml(&processed, settings.danmu_font_size) {
            Ok(xml) => (
                [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
                xml,
            )
                .into_response(),
            Err(e) => AppError::from(e).into_response(),
        },
    }
}
