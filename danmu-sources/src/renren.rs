//! Renren Video (rrmj.plus).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use danmu_core::models::{Danmaku, MediaType};
use danmu_core::pipeline::danmaku_from_value;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP};

const SEARCH_URL: &str = "https://api.rrmj.plus/m-station/search/drama";
const DRAMA_URL: &str = "https://api.rrmj.plus/m-station/drama/page";
const DANMU_URL: &str = "https://static-dm.rrmj.plus/v1/produce/danmu/EPISODE";

pub struct RenrenSource;

impl RenrenSource {
    pub fn new() -> Self {
        Self
    }

    fn app_headers(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("clientVersion", "1.0.0")
            .header("clientType", "web_pc")
            .header("Referer", "https://rrmj.plus/")
    }
}

impl Default for RenrenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for RenrenSource {
    fn name(&self) -> &'static str {
        "renren"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?keywords={}&size=20&order=match&searchAfter=&isExecuteVipActivity=true",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp: Value = Self::app_headers(HTTP.get(&url))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("renren search failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        for item in resp
            .pointer("/data/searchDramaList")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(id) = item
                .get("id")
                .and_then(|v| v.as_u64().map(|n| n.to_string()).or_else(|| v.as_str().map(str::to_string)))
            else {
                continue;
            };
            let title = client::strip_markup(item.get("title").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let classify = item.get("classify").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("renren", id, title);
            // Renren is overwhelmingly korean/overseas drama.
            raw.media_type = if classify.contains("电影") {
                MediaType::Movie
            } else {
                MediaType::Drama
            };
            raw.type_description = classify.to_string();
            raw.year = item
                .get("year")
                .and_then(|v| v.as_u64().map(|n| n as u32).or_else(|| v.as_str().and_then(|s| s.parse().ok())));
            raw.image_url = item.get("cover").and_then(Value::as_str).unwrap_or("").to_string();
            out.push(raw);
        }
        debug!(count = out.len(), "Renren search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let url = format!(
            "{DRAMA_URL}?hsdrOpen=0&isAgeLimit=0&dramaId={}&hevcOpen=1",
            anime.bangumi_id
        );
        let resp: Value = Self::app_headers(HTTP.get(&url))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("renren drama page failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        for ep in resp
            .pointer("/data/episodeList")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(sid) = ep
                .get("sid")
                .and_then(|v| v.as_u64().map(|n| n.to_string()).or_else(|| v.as_str().map(str::to_string)))
            else {
                continue;
            };
            let number = ep
                .get("episodeNo")
                .and_then(Value::as_u64)
                .unwrap_or(out.len() as u64 + 1);
            out.push(RawEpisode {
                url: format!("https://rrmj.plus/watch/{sid}"),
                title: format!("第{number}集"),
                air_date: None,
            });
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let sid = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("no episode sid in renren url {url}")))?;

        let resp: Value = Self::app_headers(HTTP.get(format!("{DANMU_URL}/{sid}")))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("renren danmu fetch failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        for item in resp.as_array().unwrap_or(&Vec::new()) {
            if let Some(d) = danmaku_from_value(item, "renren") {
                out.push(d);
            }
        }
        out.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(out)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "rrmj.plus" || host.ends_with(".rrmj.plus") || host.ends_with(".rrsp.com.cn")
    }
}
