//! Bahamut Anime (ani.gamer.com.tw). Results arrive in Traditional Chinese;
//! the pipeline's simplified conversion handles the script, not the adapter.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::{Danmaku, DanmakuMode, MediaType, WHITE};
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP};

const SEARCH_URL: &str = "https://api.gamer.com.tw/mobile_app/anime/v1/search.php";
const DETAIL_URL: &str = "https://api.gamer.com.tw/mobile_app/anime/v2/details.php";
const DANMU_URL: &str = "https://ani.gamer.com.tw/ajax/danmuGet.php";

static SN_FROM_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"sn=(\d+)").expect("invalid regex"));

pub struct BahamutSource;

impl BahamutSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BahamutSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for BahamutSource {
    fn name(&self) -> &'static str {
        "bahamut"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?kw={}",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://ani.gamer.com.tw")).await?;

        let mut out = Vec::new();
        for item in resp
            .pointer("/data/anime")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(sn) = item.get("anime_sn").and_then(Value::as_u64) else {
                continue;
            };
            let title = client::strip_markup(item.get("title").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let mut raw = RawAnime::new("bahamut", sn.to_string(), title);
            raw.media_type = MediaType::Anime;
            raw.type_description = "动漫".to_string();
            raw.image_url = item.get("cover").and_then(Value::as_str).unwrap_or("").to_string();
            raw.year = item
                .get("anime_year")
                .and_then(|v| v.as_u64().map(|n| n as u32).or_else(|| v.as_str().and_then(|s| s.parse().ok())));
            out.push(raw);
        }
        debug!(count = out.len(), "Bahamut search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let url = format!("{DETAIL_URL}?animeSn={}", anime.bangumi_id);
        let resp = client::get_json(&url, Some("https://ani.gamer.com.tw")).await?;

        let mut out = Vec::new();
        // Episode groups are keyed by volume ("0" is the main list).
        let groups = resp
            .pointer("/data/anime/episodes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (_, group) in groups {
            for ep in group.as_array().unwrap_or(&Vec::new()) {
                let Some(video_sn) = ep.get("videoSn").and_then(Value::as_u64) else {
                    continue;
                };
                let episode = ep
                    .get("episode")
                    .and_then(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .or_else(|| v.as_u64().map(|n| n.to_string()))
                    })
                    .unwrap_or_default();
                out.push(RawEpisode {
                    url: format!("https://ani.gamer.com.tw/animeVideo.php?sn={video_sn}"),
                    title: format!("第{episode}话"),
                    air_date: None,
                });
            }
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let sn = SN_FROM_URL
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("no sn in bahamut url {url}")))?;

        let resp: Value = HTTP
            .post(DANMU_URL)
            .header("Referer", url)
            .header("Origin", "https://ani.gamer.com.tw")
            .form(&[("sn", sn.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("bahamut danmu fetch failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        for item in resp.as_array().unwrap_or(&Vec::new()) {
            let Some(text) = item.get("text").and_then(Value::as_str) else {
                continue;
            };
            // `time` is in deciseconds.
            let Some(time) = item.get("time").and_then(Value::as_f64) else {
                continue;
            };
            let mode = match item.get("position").and_then(Value::as_i64) {
                Some(1) => DanmakuMode::Top,
                Some(2) => DanmakuMode::Bottom,
                _ => DanmakuMode::Scroll,
            };
            let color = item
                .get("color")
                .and_then(Value::as_str)
                .and_then(|hex| u32::from_str_radix(hex.trim_start_matches('#'), 16).ok())
                .unwrap_or(WHITE);
            out.push(
                Danmaku::new(time / 10.0, mode, color, normalize_text(text))
                    .with_platform("bahamut"),
            );
        }
        out.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(out)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "ani.gamer.com.tw" || host == "gamer.com.tw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sn_extraction() {
        let caps = SN_FROM_URL
            .captures("https://ani.gamer.com.tw/animeVideo.php?sn=34886")
            .unwrap();
        assert_eq!(&caps[1], "34886");
    }
}
