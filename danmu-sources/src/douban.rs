//! Douban metadata source (douban.com), the fallback title translator.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::Danmaku;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::Result;

use crate::client;

const SUGGEST_URL: &str = "https://www.douban.com/j/search_suggest";

pub struct DoubanSource;

impl DoubanSource {
    pub fn new() -> Self {
        Self
    }

    /// First suggestion whose title carries CJK text.
    pub async fn chinese_title(&self, title: &str) -> Option<String> {
        let url = format!(
            "{SUGGEST_URL}?q={}",
            percent_encoding::utf8_percent_encode(title, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://www.douban.com")).await.ok()?;

        for item in resp.get("cards").and_then(Value::as_array)? {
            let name = item.get("title").and_then(Value::as_str)?;
            if name.chars().any(|c| matches!(c as u32, 0x4E00..=0x9FFF)) {
                return Some(name.to_string());
            }
        }
        None
    }
}

impl Default for DoubanSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for DoubanSource {
    fn name(&self) -> &'static str {
        "douban"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        debug!(keyword, "Douban is metadata-only, contributing no animes");
        Ok(Vec::new())
    }

    async fn episodes(&self, _anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        Ok(Vec::new())
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        Err(danmu_core::Error::InvalidInput(format!(
            "douban has no comment endpoint for {url}"
        )))
    }
}
