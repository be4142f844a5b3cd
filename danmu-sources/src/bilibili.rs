//! Bilibili (bilibili.com, b23.tv).

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use danmu_core::config::ConfigRegistry;
use danmu_core::models::{Danmaku, MediaType};
use danmu_core::pipeline::parse_bili_xml;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP, HTTP_NO_REDIRECT};

const SEARCH_URL: &str = "https://api.bilibili.com/x/web-interface/search/type";
const SEASON_URL: &str = "https://api.bilibili.com/pgc/view/web/season";
const VIEW_URL: &str = "https://api.bilibili.com/x/web-interface/view";
const DM_LIST_URL: &str = "https://api.bilibili.com/x/v1/dm/list.so";

static RE_BVID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(BV[a-zA-Z0-9]{10})").expect("invalid regex"));
static RE_EPID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/ep(\d+)").expect("invalid regex"));
static RE_SSID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/ss(\d+)").expect("invalid regex"));

pub struct BilibiliSource {
    config: Arc<ConfigRegistry>,
}

impl BilibiliSource {
    pub fn new(config: Arc<ConfigRegistry>) -> Self {
        Self { config }
    }

    fn cookie_header(&self) -> Option<String> {
        let cookie = self.config.settings().bilibili_cookie.clone();
        if cookie.is_empty() {
            None
        } else {
            Some(cookie)
        }
    }

    fn with_cookie(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("Referer", "https://www.bilibili.com");
        match self.cookie_header() {
            Some(cookie) => req.header("Cookie", cookie),
            None => req,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .with_cookie(HTTP.get(url))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("GET {url} failed: {e}")))?;
        Ok(resp.json().await?)
    }

    async fn search_one(&self, search_type: &str, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?search_type={search_type}&keyword={}",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = self.get_json(&url).await?;

        let mut out = Vec::new();
        for item in resp
            .pointer("/data/result")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(season_id) = item.get("season_id").and_then(Value::as_u64) else {
                continue;
            };
            let title = client::strip_markup(item.get("title").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let type_name = item
                .get("season_type_name")
                .and_then(Value::as_str)
                .unwrap_or("");
            let mut raw = RawAnime::new("bilibili", format!("ss{season_id}"), title);
            raw.media_type = match type_name {
                "番剧" | "国创" => MediaType::Anime,
                "电影" => MediaType::Movie,
                "电视剧" => MediaType::Drama,
                "综艺" => MediaType::Variety,
                _ => MediaType::Other,
            };
            raw.type_description = type_name.to_string();
            raw.image_url = item
                .get("cover")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim_start_matches("//")
                .to_string();
            raw.year = item
                .get("pubtime")
                .and_then(Value::as_i64)
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| {
                    use chrono::Datelike;
                    dt.year() as u32
                });
            raw.rating = item
                .pointer("/media_score/score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            out.push(raw);
        }
        Ok(out)
    }

    /// Resolve `b23.tv` short links via the Location header.
    async fn resolve_short_link(&self, url: &str) -> Result<String> {
        let resp = HTTP_NO_REDIRECT.get(url).send().await?;
        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split('?').next().unwrap_or(s).to_string())
            .ok_or_else(|| Error::Upstream(format!("short link {url} did not redirect")))
    }

    /// Resolve any supported URL form down to the danmaku cid.
    async fn cid_of(&self, url: &str) -> Result<u64> {
        if let Some(caps) = RE_EPID.captures(url) {
            let epid = &caps[1];
            let resp = self.get_json(&format!("{SEASON_URL}?ep_id={epid}")).await?;
            let episodes = resp
                .pointer("/result/episodes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let epid: u64 = epid.parse().unwrap_or(0);
            return episodes
                .iter()
                .find(|ep| ep.get("id").and_then(Value::as_u64) == Some(epid))
                .or_else(|| episodes.first())
                .and_then(|ep| ep.get("cid").and_then(Value::as_u64))
                .ok_or_else(|| Error::Upstream(format!("no cid for ep{epid}")));
        }

        if let Some(caps) = RE_SSID.captures(url) {
            let ssid = &caps[1];
            let resp = self
                .get_json(&format!("{SEASON_URL}?season_id={ssid}"))
                .await?;
            return resp
                .pointer("/result/episodes/0/cid")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::Upstream(format!("no cid for ss{ssid}")));
        }

        if let Some(caps) = RE_BVID.captures(url) {
            let bvid = &caps[1];
            let resp = self.get_json(&format!("{VIEW_URL}?bvid={bvid}")).await?;
            // Multi-page videos: pick the page named in `?p=`.
            let page: usize = url
                .split("p=")
                .nth(1)
                .and_then(|p| p.split('&').next())
                .and_then(|p| p.parse().ok())
                .unwrap_or(1);
            let pages = resp
                .pointer("/data/pages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if let Some(cid) = pages
                .get(page.saturating_sub(1))
                .and_then(|p| p.get("cid").and_then(Value::as_u64))
            {
                return Ok(cid);
            }
            return resp
                .pointer("/data/cid")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::Upstream(format!("no cid for {bvid}")));
        }

        Err(Error::InvalidInput(format!("unrecognized bilibili url {url}")))
    }
}

#[async_trait]
impl Source for BilibiliSource {
    fn name(&self) -> &'static str {
        "bilibili"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        // Bangumi (anime) and film/tv indices are separate search types.
        let (bangumi, ft) = futures::join!(
            self.search_one("media_bangumi", keyword),
            self.search_one("media_ft", keyword)
        );

        let mut out = bangumi.unwrap_or_default();
        out.extend(ft.unwrap_or_default());
        debug!(count = out.len(), "Bilibili search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let season_id = anime.bangumi_id.trim_start_matches("ss");
        let resp = self
            .get_json(&format!("{SEASON_URL}?season_id={season_id}"))
            .await?;

        let mut out = Vec::new();
        for ep in resp
            .pointer("/result/episodes")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(id) = ep.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let long_title = ep.get("long_title").and_then(Value::as_str).unwrap_or("");
            let short_title = ep.get("title").and_then(Value::as_str).unwrap_or("");
            let title = if long_title.is_empty() {
                format!("第{short_title}话")
            } else {
                format!("第{short_title}话 {long_title}")
            };
            out.push(RawEpisode {
                url: format!("https://www.bilibili.com/bangumi/play/ep{id}"),
                title,
                air_date: None,
            });
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let url = if url.contains("b23.tv") {
            self.resolve_short_link(url).await?
        } else {
            url.to_string()
        };

        let cid = self.cid_of(&url).await?;
        let bytes = self
            .with_cookie(HTTP.get(format!("{DM_LIST_URL}?oid={cid}")))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("dm list fetch failed: {e}")))?
            .bytes()
            .await?;

        // list.so answers raw-deflate XML; an uncompressed document means an
        // error page or an empty list, try it as-is.
        let xml = match client::inflate(&bytes) {
            Ok(xml) => xml,
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        };
        parse_bili_xml(&xml, "bilibili")
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "bilibili.com" || host.ends_with(".bilibili.com") || host == "b23.tv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_regexes() {
        assert_eq!(
            RE_BVID
                .captures("https://www.bilibili.com/video/BV1xx411c7mD?p=2")
                .map(|c| c[1].to_string()),
            Some("BV1xx411c7mD".to_string())
        );
        assert_eq!(
            RE_EPID
                .captures("https://www.bilibili.com/bangumi/play/ep123456")
                .map(|c| c[1].to_string()),
            Some("123456".to_string())
        );
        assert!(RE_SSID.captures("https://www.bilibili.com/bangumi/play/ss4316").is_some());
    }
}
