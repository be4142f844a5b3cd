//! iQiyi (iqiyi.com).
//!
//! Comment segments are zlib-compressed XML, 300 seconds per segment, sharded
//! by the last four digits of the tvid.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::{Danmaku, DanmakuMode, WHITE};
use danmu_core::models::MediaType;
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP};

const SEARCH_URL: &str = "https://search.video.iqiyi.com/o";
const ALBUM_URL: &str = "https://pcw-api.iqiyi.com/albums/album/avlistinfo";
const BASEINFO_URL: &str = "https://pcw-api.iqiyi.com/video/video/baseinfo";

static TVID_IN_PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:"tvId"|tvid)[":\s]+(\d{6,})"#).expect("invalid regex"));

pub struct IqiyiSource;

impl IqiyiSource {
    pub fn new() -> Self {
        Self
    }

    fn media_type_of(channel: &str) -> MediaType {
        match channel {
            c if c.contains("电视剧") => MediaType::Drama,
            c if c.contains("电影") => MediaType::Movie,
            c if c.contains("综艺") => MediaType::Variety,
            c if c.contains("动漫") => MediaType::Anime,
            _ => MediaType::Other,
        }
    }

    /// One `{tvid}_300_{n}.z` segment: zlib XML of `<bulletInfo>` entries.
    async fn fetch_segment(tvid: &str, segment: u32) -> Result<Vec<Danmaku>> {
        let (s1, s2) = shard_of(tvid)?;
        let url = format!("https://cmts.iqiyi.com/bullet/{s1}/{s2}/{tvid}_300_{segment}.z");
        let bytes = HTTP
            .get(&url)
            .header("Referer", "https://www.iqiyi.com")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("iqiyi bullet fetch failed: {e}")))?
            .bytes()
            .await?;
        let xml = client::inflate(&bytes)?;
        parse_bullet_xml(&xml)
    }
}

impl Default for IqiyiSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The two directory shards are the last-4/last-2 digit groups of the tvid.
fn shard_of(tvid: &str) -> Result<(String, String)> {
    if tvid.len() < 4 {
        return Err(Error::InvalidInput(format!("tvid too short: {tvid}")));
    }
    let tail = &tvid[tvid.len() - 4..];
    Ok((tail[..2].to_string(), tail[2..].to_string()))
}

fn parse_bullet_xml(xml: &str) -> Result<Vec<Danmaku>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut field = String::new();
    let (mut time, mut color, mut content): (Option<f64>, u32, Option<String>) =
        (None, WHITE, None);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|c| c.into_owned()).unwrap_or_default();
                match field.as_str() {
                    "showTime" => time = text.trim().parse().ok(),
                    "color" => {
                        color = u32::from_str_radix(text.trim().trim_start_matches('#'), 16)
                            .unwrap_or(WHITE);
                    }
                    "content" => content = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"bulletInfo" => {
                if let (Some(t), Some(text)) = (time.take(), content.take()) {
                    out.push(
                        Danmaku::new(t, DanmakuMode::Scroll, color, normalize_text(&text))
                            .with_platform("iqiyi"),
                    );
                }
                color = WHITE;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Upstream(format!("bad iqiyi bullet xml: {e}"))),
        }
    }
    Ok(out)
}

#[async_trait]
impl Source for IqiyiSource {
    fn name(&self) -> &'static str {
        "iqiyi"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?if=html5&key={}&pageNum=1&pageSize=20",
            urlencode(keyword)
        );
        let resp = client::get_json(&url, Some("https://www.iqiyi.com")).await?;

        let mut out = Vec::new();
        let docs = resp
            .pointer("/data/docinfos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for doc in docs {
            let Some(album) = doc.get("albumDocInfo") else {
                continue;
            };
            let title = client::strip_markup(
                album.get("albumTitle").and_then(Value::as_str).unwrap_or(""),
            );
            let Some(album_id) = album
                .get("albumId")
                .and_then(|v| v.as_u64().map(|n| n.to_string()).or_else(|| v.as_str().map(str::to_string)))
            else {
                continue;
            };
            if title.is_empty() {
                continue;
            }

            let channel = album.get("channel").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("iqiyi", album_id, title);
            raw.media_type = Self::media_type_of(channel);
            raw.type_description = channel.split(',').next().unwrap_or("").to_string();
            raw.year = album
                .get("year")
                .and_then(|v| v.as_u64().map(|n| n as u32).or_else(|| v.as_str().and_then(|s| s.parse().ok())));
            raw.image_url = album
                .get("albumImg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            raw.rating = album
                .get("score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            out.push(raw);
        }
        debug!(count = out.len(), "iQiyi search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let url = format!("{ALBUM_URL}?aid={}&page=1&size=200", anime.bangumi_id);
        let resp = client::get_json(&url, Some("https://www.iqiyi.com")).await?;

        let mut out = Vec::new();
        let episodes = resp
            .pointer("/data/epsodelist")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for ep in episodes {
            let Some(play_url) = ep.get("playUrl").and_then(Value::as_str) else {
                continue;
            };
            let title = ep
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| ep.get("subtitle").and_then(Value::as_str))
                .unwrap_or(play_url);
            out.push(RawEpisode {
                url: play_url.to_string(),
                title: title.to_string(),
                air_date: None,
            });
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        // The play URL carries no tvid; scrape it off the page.
        let page = client::get_text(url, Some("https://www.iqiyi.com")).await?;
        let tvid = TVID_IN_PAGE
            .captures(&page)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Upstream(format!("no tvid found in {url}")))?;

        let info = client::get_json(&format!("{BASEINFO_URL}/{tvid}"), Some("https://www.iqiyi.com")).await?;
        let duration = info
            .pointer("/data/durationSec")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let segments = (duration / 300 + 1) as u32;

        let mut comments = Vec::new();
        for chunk in (1..=segments).collect::<Vec<_>>().chunks(8) {
            let fetches = chunk.iter().map(|n| Self::fetch_segment(&tvid, *n));
            for result in futures::future::join_all(fetches).await {
                match result {
                    Ok(mut list) => comments.append(&mut list),
                    Err(e) => debug!(error = %e, "iQiyi segment fetch failed"),
                }
            }
        }
        comments.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(comments)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "iqiyi.com" || host.ends_with(".iqiyi.com") || host.ends_with(".iq.com")
    }
}

fn urlencode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_of() {
        let (s1, s2) = shard_of("1234567890").unwrap();
        assert_eq!((s1.as_str(), s2.as_str()), ("78", "90"));
        assert!(shard_of("12").is_err());
    }

    #[test]
    fn test_parse_bullet_xml() {
        let xml = r"<danmu><data><entry><list>
            <bulletInfo><contentId>1</contentId><content>第一条</content><showTime>12</showTime><color>ff0000</color></bulletInfo>
            <bulletInfo><content>第二条</content><showTime>34</showTime></bulletInfo>
        </list></entry></data></danmu>";
        let out = parse_bullet_xml(xml).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].time, 12.0);
        assert_eq!(out[0].color, 0xFF0000);
        assert_eq!(out[1].color, WHITE);
        assert_eq!(out[1].text, "第二条");
    }

    #[test]
    fn test_tvid_scrape() {
        let page = r#"window.Q = {"tvId": 4982371838274500, "albumId": 1}"#;
        let caps = TVID_IN_PAGE.captures(page).unwrap();
        assert_eq!(&caps[1], "4982371838274500");
    }
}
