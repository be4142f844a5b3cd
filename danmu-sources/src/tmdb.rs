//! TMDB metadata source (api.themoviedb.org).
//!
//! Metadata-only: it contributes no playable episodes, it exists to map
//! foreign titles to their Chinese release names for the match engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use danmu_core::config::ConfigRegistry;
use danmu_core::models::Danmaku;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::Result;

use crate::client;

const SEARCH_URL: &str = "https://api.themoviedb.org/3/search/multi";

pub struct TmdbSource {
    config: Arc<ConfigRegistry>,
}

impl TmdbSource {
    pub fn new(config: Arc<ConfigRegistry>) -> Self {
        Self { config }
    }

    /// Look up the Chinese display title for a foreign title.
    pub async fn chinese_title(&self, title: &str) -> Option<String> {
        let api_key = self.config.settings().tmdb_api_key.clone();
        if api_key.is_empty() {
            return None;
        }

        let url = format!(
            "{SEARCH_URL}?api_key={api_key}&language=zh-CN&query={}",
            percent_encoding::utf8_percent_encode(title, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, None).await.ok()?;

        for result in resp.get("results").and_then(Value::as_array)? {
            let name = result
                .get("title")
                .or_else(|| result.get("name"))
                .and_then(Value::as_str)?;
            // Only useful when TMDB actually localized the name.
            if name.chars().any(|c| matches!(c as u32, 0x4E00..=0x9FFF)) {
                return Some(name.to_string());
            }
        }
        None
    }
}

#[async_trait]
impl Source for TmdbSource {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        debug!(keyword, "TMDB is metadata-only, contributing no animes");
        Ok(Vec::new())
    }

    async fn episodes(&self, _anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        Ok(Vec::new())
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        Err(danmu_core::Error::InvalidInput(format!(
            "tmdb has no comment endpoint for {url}"
        )))
    }
}
