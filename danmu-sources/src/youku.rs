//! Youku (youku.com).
//!
//! Comments need a two-phase handshake: obtain the `_m_h5_tk` token cookie,
//! then request one signed segment per minute of playback. Segments are
//! fetched in waves of `YOUKU_CONCURRENCY` with a short pause between waves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use danmu_core::config::ConfigRegistry;
use danmu_core::models::{Danmaku, DanmakuMode, MediaType, WHITE};
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP};

const APP_KEY: &str = "24679788";
const SEARCH_URL: &str = "https://search.youku.com/api/search";
const VIDEOS_URL: &str = "https://openapi.youku.com/v2/shows/videos.json";
const VIDEO_INFO_URL: &str = "https://openapi.youku.com/v2/videos/show.json";
const TOKEN_URL: &str =
    "https://acs.youku.com/h5/mtop.com.youku.aplatform.weakget/1.0/?jsv=2.5.1&appKey=24679788";
const DANMU_URL: &str = "https://acs.youku.com/h5/mopen.youku.danmu.list/1.0/";
const CLIENT_ID: &str = "53e6cc67237fc59a";
const WAVE_PAUSE: Duration = Duration::from_millis(100);

static VID_FROM_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"id_([a-zA-Z0-9=]+)").expect("invalid regex"));

pub struct YoukuSource {
    config: Arc<ConfigRegistry>,
}

impl YoukuSource {
    pub fn new(config: Arc<ConfigRegistry>) -> Self {
        Self { config }
    }

    /// Phase one: the `_m_h5_tk` token cookie pair.
    async fn fetch_token(&self) -> Result<String> {
        let resp = HTTP
            .get(TOKEN_URL)
            .header("Referer", "https://v.youku.com")
            .send()
            .await?;

        for cookie in resp.cookies() {
            if cookie.name() == "_m_h5_tk" {
                // Only the first segment of the cookie value signs requests.
                let token = cookie.value().split('_').next().unwrap_or("").to_string();
                if !token.is_empty() {
                    return Ok(token);
                }
            }
        }
        Err(Error::Upstream("youku token cookie missing".to_string()))
    }

    /// Phase two: one signed per-minute segment.
    async fn fetch_segment(&self, token: &str, vid: &str, minute: u64) -> Result<Vec<Danmaku>> {
        let ctime = chrono::Utc::now().timestamp_millis();
        let msg = json!({
            "ctime": ctime,
            "ctype": 10004,
            "cver": "v1.0",
            "guid": "danmu-proxy",
            "mat": minute,
            "mcount": 1,
            "pid": 0,
            "sver": "3.1.0",
            "type": 1,
            "vid": vid,
        });
        let msg_raw = msg.to_string();
        let msg_b64 = BASE64_STANDARD.encode(&msg_raw);
        let payload = json!({
            "pid": 0,
            "ctype": 10004,
            "sver": "3.1.0",
            "cver": "v1.0",
            "ctime": ctime,
            "guid": "danmu-proxy",
            "vid": vid,
            "mat": minute,
            "mcount": 1,
            "type": 1,
            "msg": msg_b64,
            "sign": md5_hex(&format!("{msg_b64}MkmC9SoIw6xCkSKHhJ7b5D2r51kBiREr")),
        })
        .to_string();

        let t = chrono::Utc::now().timestamp_millis();
        let sign = md5_hex(&format!("{token}&{t}&{APP_KEY}&{payload}"));
        let url = format!(
            "{DANMU_URL}?jsv=2.5.6&appKey={APP_KEY}&t={t}&sign={sign}&api=mopen.youku.danmu.list&v=1.0&type=originaljson&dataType=jsonp&timeout=20000&jsonpIncPrefix=utility"
        );

        let resp: Value = HTTP
            .post(&url)
            .header("Referer", "https://v.youku.com")
            .header("Cookie", format!("_m_h5_tk={token}_1"))
            .form(&[("data", payload.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("youku danmu fetch failed: {e}")))?
            .json()
            .await?;

        let result = resp
            .pointer("/data/result")
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .unwrap_or(Value::Null);

        let mut out = Vec::new();
        for item in result
            .pointer("/data/result")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(playat) = item.get("playat").and_then(Value::as_f64) else {
                continue;
            };
            let Some(content) = item.get("content").and_then(Value::as_str) else {
                continue;
            };
            let color = item
                .get("propertis")
                .and_then(Value::as_str)
                .and_then(|p| serde_json::from_str::<Value>(p).ok())
                .and_then(|p| p.get("color").and_then(Value::as_u64))
                .map_or(WHITE, |c| (c as u32) & 0x00FF_FFFF);
            out.push(
                Danmaku::new(playat / 1000.0, DanmakuMode::Scroll, color, normalize_text(content))
                    .with_platform("youku"),
            );
        }
        Ok(out)
    }

    async fn video_duration(&self, vid: &str) -> Result<f64> {
        let url = format!("{VIDEO_INFO_URL}?client_id={CLIENT_ID}&video_id={vid}");
        let info = client::get_json(&url, Some("https://v.youku.com")).await?;
        info.get("duration")
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
            .ok_or_else(|| Error::Upstream(format!("no duration for youku vid {vid}")))
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Source for YoukuSource {
    fn name(&self) -> &'static str {
        "youku"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?appScene=show&keyword={}",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://www.youku.com")).await?;

        let mut out = Vec::new();
        let components = resp
            .get("pageComponentList")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for component in components {
            let Some(data) = component.get("commonData") else {
                continue;
            };
            let Some(show_id) = data.get("showId").and_then(Value::as_str) else {
                continue;
            };
            let title = client::strip_markup(
                data.pointer("/titleDTO/displayName")
                    .and_then(Value::as_str)
                    .unwrap_or(""),
            );
            if title.is_empty() {
                continue;
            }

            let feature = data.get("feature").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("youku", show_id, title);
            raw.media_type = match feature {
                f if f.contains("电视剧") => MediaType::Drama,
                f if f.contains("电影") => MediaType::Movie,
                f if f.contains("综艺") => MediaType::Variety,
                f if f.contains("动漫") => MediaType::Anime,
                _ => MediaType::Other,
            };
            raw.type_description = feature.split('·').next().unwrap_or("").trim().to_string();
            raw.year = client::year_of(feature);
            raw.image_url = data
                .pointer("/posterDTO/vThumbUrl")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            out.push(raw);
        }
        debug!(count = out.len(), "Youku search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let url = format!(
            "{VIDEOS_URL}?client_id={CLIENT_ID}&package=com.huawei.hwvplayer.youku&ext=show&pagesize=100&show_id={}",
            anime.bangumi_id
        );
        let resp = client::get_json(&url, Some("https://v.youku.com")).await?;

        let mut out = Vec::new();
        for video in resp.get("videos").and_then(Value::as_array).unwrap_or(&Vec::new()) {
            let Some(vid) = video.get("id").and_then(Value::as_str) else {
                continue;
            };
            let title = video.get("title").and_then(Value::as_str).unwrap_or(vid);
            out.push(RawEpisode {
                url: format!("https://v.youku.com/v_show/id_{vid}.html"),
                title: title.to_string(),
                air_date: None,
            });
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let vid = VID_FROM_URL
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("no vid in youku url {url}")))?;

        let token = self.fetch_token().await?;
        let duration = self.video_duration(&vid).await.unwrap_or(0.0);
        let minutes = (duration / 60.0).ceil().max(1.0) as u64;

        let concurrency = self.config.settings().youku_concurrency.clamp(1, 16);
        let mut comments = Vec::new();

        // Batched waves: one chunk in flight, short pause between waves.
        let all_minutes: Vec<u64> = (0..minutes).collect();
        for (i, chunk) in all_minutes.chunks(concurrency).enumerate() {
            if i > 0 {
                tokio::time::sleep(WAVE_PAUSE).await;
            }
            let fetches = chunk.iter().map(|m| self.fetch_segment(&token, &vid, *m));
            for result in futures::future::join_all(fetches).await {
                match result {
                    Ok(mut list) => comments.append(&mut list),
                    Err(e) => debug!(error = %e, "Youku segment fetch failed"),
                }
            }
        }
        comments.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(comments)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "youku.com" || host.ends_with(".youku.com")
    }
}
