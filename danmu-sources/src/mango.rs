//! Mango TV (mgtv.com), source name `imgo`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::{Danmaku, DanmakuMode, MediaType, WHITE};
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client;

const SEARCH_URL: &str = "https://mobileso.bz.mgtv.com/msite/search/v2";
const EPISODE_URL: &str = "https://pcweb.api.mgtv.com/episode/list";
const VIDEO_INFO_URL: &str = "https://pcweb.api.mgtv.com/video/info";
const BARRAGE_URL: &str = "https://galaxy.bz.mgtv.com/rdbarrage";

static IDS_FROM_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"/b/(\d+)/(\d+)\.html").expect("invalid regex"));

pub struct MangoSource;

impl MangoSource {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_minute(cid: &str, vid: &str, minute: u64) -> Result<Vec<Danmaku>> {
        let url = format!("{BARRAGE_URL}?vid={vid}&cid={cid}&time={}", minute * 60 * 1000);
        let resp = client::get_json(&url, Some("https://www.mgtv.com")).await?;

        let mut out = Vec::new();
        for item in resp
            .pointer("/data/items")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(time) = item.get("time").and_then(Value::as_f64) else {
                continue;
            };
            let Some(content) = item.get("content").and_then(Value::as_str) else {
                continue;
            };
            let mode = match item.get("type").and_then(Value::as_i64) {
                Some(1) => DanmakuMode::Top,
                Some(2) => DanmakuMode::Bottom,
                _ => DanmakuMode::Scroll,
            };
            let color = item
                .pointer("/v2_color/color_left")
                .map_or(WHITE, |left| {
                    let r = left.get("r").and_then(Value::as_u64).unwrap_or(255) as u32;
                    let g = left.get("g").and_then(Value::as_u64).unwrap_or(255) as u32;
                    let b = left.get("b").and_then(Value::as_u64).unwrap_or(255) as u32;
                    (r << 16) | (g << 8) | b
                });
            out.push(
                Danmaku::new(time / 1000.0, mode, color, normalize_text(content))
                    .with_platform("imgo"),
            );
        }
        Ok(out)
    }

    /// `HH:MM:SS` or `MM:SS` to seconds.
    fn parse_clock(clock: &str) -> u64 {
        clock
            .split(':')
            .filter_map(|part| part.trim().parse::<u64>().ok())
            .fold(0, |acc, part| acc * 60 + part)
    }
}

impl Default for MangoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for MangoSource {
    fn name(&self) -> &'static str {
        "imgo"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?q={}&pc=30&pn=1&sort=-99&ty=0&du=0&pt=0&corr=1&abroad=0",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://www.mgtv.com")).await?;

        let mut out = Vec::new();
        for content in resp
            .pointer("/data/contents")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            if content.get("type").and_then(Value::as_str) != Some("media") {
                continue;
            }
            let Some(data) = content.get("data") else {
                continue;
            };
            let Some(page_url) = data.get("url").and_then(Value::as_str) else {
                continue;
            };
            // Collection id comes out of the landing URL.
            let Some(cid) = page_url
                .split('/')
                .rev()
                .find_map(|seg| {
                    let seg = seg.trim_end_matches(".html");
                    if !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit()) {
                        Some(seg.to_string())
                    } else {
                        None
                    }
                })
            else {
                continue;
            };
            let title = client::strip_markup(data.get("title").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let desc = data
                .get("desc")
                .and_then(Value::as_array)
                .and_then(|d| d.first())
                .and_then(Value::as_str)
                .unwrap_or("");
            let mut raw = RawAnime::new("imgo", cid, title);
            raw.media_type = match desc {
                d if d.contains("电视剧") => MediaType::Drama,
                d if d.contains("电影") => MediaType::Movie,
                d if d.contains("综艺") => MediaType::Variety,
                d if d.contains("动漫") || d.contains("动画") => MediaType::Anime,
                _ => MediaType::Other,
            };
            raw.type_description = desc.split('/').next().unwrap_or("").trim().to_string();
            raw.year = client::year_of(desc.trim_start_matches(|c: char| !c.is_ascii_digit()));
            raw.image_url = data.get("img").and_then(Value::as_str).unwrap_or("").to_string();
            out.push(raw);
        }
        debug!(count = out.len(), "Mango search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{EPISODE_URL}?collection_id={}&page={page}&size=50",
                anime.bangumi_id
            );
            let resp = client::get_json(&url, Some("https://www.mgtv.com")).await?;
            let list = resp
                .pointer("/data/list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if list.is_empty() {
                break;
            }

            for ep in &list {
                let Some(video_id) = ep
                    .get("video_id")
                    .and_then(|v| v.as_u64().map(|n| n.to_string()).or_else(|| v.as_str().map(str::to_string)))
                else {
                    continue;
                };
                // `isIntact` marks mainline episodes; clips and previews are
                // other values.
                if ep.get("isIntact").and_then(Value::as_str) == Some("0") {
                    continue;
                }
                let title = [
                    ep.get("t1").and_then(Value::as_str).unwrap_or(""),
                    ep.get("t2").and_then(Value::as_str).unwrap_or(""),
                ]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
                let air_date = ep
                    .get("t4")
                    .and_then(Value::as_str)
                    .filter(|s| anime.media_type == MediaType::Variety && !s.is_empty())
                    .map(str::to_string);
                out.push(RawEpisode {
                    url: format!("https://www.mgtv.com/b/{}/{video_id}.html", anime.bangumi_id),
                    title: if title.is_empty() { video_id } else { title },
                    air_date,
                });
            }

            let total = resp
                .pointer("/data/total_page")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            if page >= total {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let caps = IDS_FROM_URL
            .captures(url)
            .ok_or_else(|| Error::InvalidInput(format!("no cid/vid in mgtv url {url}")))?;
        let (cid, vid) = (caps[1].to_string(), caps[2].to_string());

        let info = client::get_json(
            &format!("{VIDEO_INFO_URL}?cid={cid}&vid={vid}"),
            Some("https://www.mgtv.com"),
        )
        .await?;
        let clock = info
            .pointer("/data/info/time")
            .and_then(Value::as_str)
            .unwrap_or("0");
        let minutes = (Self::parse_clock(clock) / 60) + 1;

        let mut comments = Vec::new();
        for chunk in (0..minutes).collect::<Vec<_>>().chunks(8) {
            let fetches = chunk.iter().map(|m| Self::fetch_minute(&cid, &vid, *m));
            for result in futures::future::join_all(fetches).await {
                match result {
                    Ok(mut list) => comments.append(&mut list),
                    Err(e) => debug!(error = %e, "Mango minute fetch failed"),
                }
            }
        }
        comments.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(comments)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "mgtv.com" || host.ends_with(".mgtv.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_from_url() {
        let caps = IDS_FROM_URL
            .captures("https://www.mgtv.com/b/336727/7056546.html")
            .unwrap();
        assert_eq!((&caps[1], &caps[2]), ("336727", "7056546"));
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(MangoSource::parse_clock("01:02:03"), 3723);
        assert_eq!(MangoSource::parse_clock("45:06"), 2706);
    }
}
