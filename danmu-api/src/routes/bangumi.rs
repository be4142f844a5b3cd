//! `GET /api/v2/bangumi/{id}`.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

use super::success_envelope;

pub async fn bangumi(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let anime_id: u32 = id
        .parse()
        .map_err(|_| AppError::bad_request("anime id must be an integer"))?;

    let anime = state
        .orchestrator
        .catalog()
        .get_anime(anime_id)
        .ok_or_else(|| AppError::not_found(format!("anime {anime_id} not found")))?;

    let episodes: Vec<Value> = anime
        .links
        .iter()
        .map(|ep| {
            json!({
                "episodeId": ep.id,
                "episodeTitle": ep.title,
            })
        })
        .collect();

    Ok(Json(success_envelope(json!({
        "bangumi": {
            "animeId": anime.anime_id,
            "bangumiId": anime.bangumi_id,
            "animeTitle": anime.anime_title,
            "imageUrl": anime.image_url,
            "type": anime.media_type,
            "typeDescription": anime.type_description,
            "isFavorited": anime.is_favorited,
            "rating": anime.rating,
            "seasons": [{
                "id": anime.bangumi_id,
                "airDate": anime.start_date,
                "name": anime.anime_title,
                "episodeCount": anime.episode_count,
            }],
            "episodes": episodes,
        },
    }))))
}
