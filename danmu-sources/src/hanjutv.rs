//! Hanjutv (hanjutv.com), korean drama site.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::{Danmaku, DanmakuMode, MediaType, WHITE};
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client;

const SEARCH_URL: &str = "https://api.hanjutv.com/sea/searchList";
const DETAIL_URL: &str = "https://api.hanjutv.com/drama/detail";
const BARRAGE_URL: &str = "https://api.hanjutv.com/barrage/list";

pub struct HanjutvSource;

impl HanjutvSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HanjutvSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for HanjutvSource {
    fn name(&self) -> &'static str {
        "hanjutv"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?keyword={}&page=1",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://www.hanjutv.com")).await?;

        let mut out = Vec::new();
        for item in resp
            .pointer("/data/seaList")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(sid) = item
                .get("sid")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
            else {
                continue;
            };
            let title = client::strip_markup(item.get("name").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let category = item.get("category").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("hanjutv", sid, title);
            raw.media_type = if category.contains("电影") {
                MediaType::Movie
            } else {
                MediaType::Drama
            };
            raw.type_description = category.to_string();
            raw.year = item
                .get("publishTime")
                .and_then(Value::as_str)
                .and_then(client::year_of);
            raw.image_url = item.get("cover").and_then(Value::as_str).unwrap_or("").to_string();
            out.push(raw);
        }
        debug!(count = out.len(), "Hanjutv search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let url = format!("{DETAIL_URL}?sid={}", anime.bangumi_id);
        let resp = client::get_json(&url, Some("https://www.hanjutv.com")).await?;

        let mut out = Vec::new();
        for ep in resp
            .pointer("/data/dramas")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(pid) = ep
                .get("pid")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
            else {
                continue;
            };
            let number = ep
                .get("serialNo")
                .and_then(Value::as_u64)
                .unwrap_or(out.len() as u64 + 1);
            out.push(RawEpisode {
                url: format!("https://www.hanjutv.com/play/{pid}"),
                title: format!("第{number}集"),
                air_date: None,
            });
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let pid = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("no pid in hanjutv url {url}")))?;

        // Paged by start offset until the server answers empty.
        let mut out = Vec::new();
        let mut start = 0u64;
        loop {
            let page_url = format!("{BARRAGE_URL}?pid={pid}&start={start}");
            let resp = client::get_json(&page_url, Some("https://www.hanjutv.com")).await?;
            let items = resp
                .pointer("/data/barrageList")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }

            for item in &items {
                let Some(content) = item.get("content").and_then(Value::as_str) else {
                    continue;
                };
                let Some(time) = item.get("ptime").and_then(Value::as_f64) else {
                    continue;
                };
                let color = item
                    .get("color")
                    .and_then(|v| {
                        v.as_u64().map(|c| (c as u32) & 0x00FF_FFFF).or_else(|| {
                            v.as_str()
                                .and_then(|s| u32::from_str_radix(s.trim_start_matches('#'), 16).ok())
                        })
                    })
                    .unwrap_or(WHITE);
                out.push(
                    Danmaku::new(time, DanmakuMode::Scroll, color, normalize_text(content))
                        .with_platform("hanjutv"),
                );
            }

            start += items.len() as u64;
            // Hard stop: no episode carries more rows than this.
            if start > 200_000 {
                break;
            }
        }
        out.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(out)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "hanjutv.com" || host.ends_with(".hanjutv.com")
    }
}
