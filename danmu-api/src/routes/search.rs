//! `/api/v2/search/*` endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

use super::success_envelope;

#[derive(Debug, Deserialize)]
pub struct AnimeQuery {
    pub keyword: Option<String>,
}

pub async fn search_anime(
    State(state): State<AppState>,
    Query(query): Query<AnimeQuery>,
) -> AppResult<Json<Value>> {
    let keyword = query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("keyword is required"))?;

    let animes = state.orchestrator.search_anime(keyword).await;
    Ok(Json(success_envelope(json!({ "animes": animes }))))
}

#[derive(Debug, Deserialize)]
pub struct EpisodesQuery {
    pub anime: Option<String>,
    /// Episode number, or `"movie"` to keep theatrical entries only.
    pub episode: Option<String>,
}

pub async fn search_episodes(
    State(state): State<AppState>,
    Query(query): Query<EpisodesQuery>,
) -> AppResult<Json<Value>> {
    let anime = query
        .anime
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("anime is required"))?;

    let episode_filter = match query.episode.as_deref().map(str::trim) {
        None | Some("") => None,
        Some("movie") => Some(EpisodeFilter::Movie),
        Some(number) => Some(EpisodeFilter::Number(
            number
                .parse::<usize>()
                .map_err(|_| AppError::bad_request("episode must be a number or \"movie\""))?,
        )),
    };

    let results = state.orchestrator.search_anime(anime).await;
    let animes: Vec<Value> = results
        .iter()
        .filter_map(|anime| {
            let episodes: Vec<Value> = match &episode_filter {
                None => anime.links.iter().map(episode_json).collect(),
                Some(EpisodeFilter::Movie) => {
                    if !anime.media_type.is_movie() {
                        return None;
                    }
                    anime.links.iter().map(episode_json).collect()
                }
                Some(EpisodeFilter::Number(n)) => anime
                    .links
                    .get(n.checked_sub(1)?)
                    .map(episode_json)
                    .into_iter()
                    .collect(),
            };
            if episodes.is_empty() {
                return None;
            }
            Some(json!({
                "animeId": anime.anime_id,
                "animeTitle": anime.anime_title,
                "type": anime.media_type,
                "episodes": episodes,
            }))
        })
        .collect();

    Ok(Json(success_envelope(json!({ "animes": animes }))))
}

enum EpisodeFilter {
    Movie,
    Number(usize),
}

fn episode_json(episode: &danmu_core::models::Episode) -> Value {
    json!({
        "episodeId": episode.id,
        "episodeTitle": episode.title,
    })
}
