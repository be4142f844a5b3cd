//! Tencent Video (v.qq.com).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use danmu_core::models::{Danmaku, DanmakuMode, MediaType, WHITE};
use danmu_core::pipeline::normalize_text;
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client::{self, HTTP};

const SEARCH_URL: &str =
    "https://pbaccess.video.qq.com/trpc.videosearch.mobile_search.MultiTerminalSearch/MbSearch?vplatform=2";
const EPISODE_URL: &str =
    "https://pbaccess.video.qq.com/trpc.universal_backend_service.page_server_rpc.PageServer/GetPageData?video_appid=3000010&vplatform=2";
const BARRAGE_BASE: &str = "https://dm.video.qq.com/barrage/base";
const BARRAGE_SEGMENT: &str = "https://dm.video.qq.com/barrage/segment";

static VID_FROM_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"/([a-zA-Z0-9]+)\.html").expect("invalid regex"));

pub struct TencentSource;

impl TencentSource {
    pub fn new() -> Self {
        Self
    }

    fn media_type_of(type_name: &str) -> MediaType {
        match type_name {
            "电视剧" => MediaType::Drama,
            "电影" => MediaType::Movie,
            "综艺" => MediaType::Variety,
            "动漫" | "少儿" => MediaType::Anime,
            _ => MediaType::Other,
        }
    }

    async fn fetch_segment(vid: &str, segment_name: &str) -> Result<Vec<Danmaku>> {
        let url = format!("{BARRAGE_SEGMENT}/{vid}/{segment_name}");
        let body = client::get_json(&url, Some("https://v.qq.com")).await?;
        let mut out = Vec::new();
        for item in body
            .get("barrage_list")
            .and_then(Value::as_array)
            .unwrap_or(&Vec::new())
        {
            let Some(offset) = item
                .get("time_offset")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
                .and_then(|s| s.parse::<f64>().ok())
            else {
                continue;
            };
            let Some(content) = item.get("content").and_then(Value::as_str) else {
                continue;
            };
            let color = item
                .get("content_style")
                .and_then(Value::as_str)
                .and_then(|style| serde_json::from_str::<Value>(style).ok())
                .and_then(|style| {
                    style
                        .get("color")
                        .and_then(Value::as_str)
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                })
                .unwrap_or(WHITE);

            out.push(
                Danmaku::new(offset / 1000.0, DanmakuMode::Scroll, color, normalize_text(content))
                    .with_platform("tencent"),
            );
        }
        Ok(out)
    }
}

impl Default for TencentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for TencentSource {
    fn name(&self) -> &'static str {
        "tencent"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let body = json!({
            "version": "",
            "clientType": 1,
            "filterValue": "",
            "retry": 0,
            "query": keyword,
            "pagenum": 0,
            "pagesize": 20,
            "queryFrom": 4,
            "isneedQc": true,
            "platform": "23",
        });
        let resp: Value = HTTP
            .post(SEARCH_URL)
            .header("Referer", "https://v.qq.com")
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("tencent search failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        let items = resp
            .pointer("/data/normalList/itemList")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for item in items {
            let Some(info) = item.get("videoInfo") else {
                continue;
            };
            let Some(cid) = item.get("doc").and_then(|d| d.get("id")).and_then(Value::as_str) else {
                continue;
            };
            let title = client::strip_markup(info.get("title").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let type_name = info.get("typeName").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("tencent", format!("cover/{cid}"), title);
            raw.media_type = Self::media_type_of(type_name);
            raw.type_description = type_name.to_string();
            raw.year = info
                .get("year")
                .and_then(|y| y.as_u64().map(|n| n as u32).or_else(|| {
                    y.as_str().and_then(|s| s.parse().ok())
                }));
            raw.image_url = info
                .get("imgUrl")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            out.push(raw);
        }
        debug!(count = out.len(), "Tencent search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let cid = anime.bangumi_id.trim_start_matches("cover/");
        let body = json!({
            "page_params": {
                "req_from": "web_mobile",
                "page_id": "vsite_episode_list",
                "page_type": "detail_operation",
                "id_type": "1",
                "cid": cid,
                "lid": "",
                "page_size": "100",
                "page_context": "",
            },
        });
        let resp: Value = HTTP
            .post(EPISODE_URL)
            .header("Referer", "https://v.qq.com")
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Upstream(format!("tencent episode list failed: {e}")))?
            .json()
            .await?;

        let mut out = Vec::new();
        let modules = resp
            .pointer("/data/module_list_datas")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for module in modules {
            let items = module
                .pointer("/module_datas/0/item_data_lists/item_datas")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in items {
                let Some(params) = item.get("item_params") else {
                    continue;
                };
                let Some(vid) = params.get("vid").and_then(Value::as_str) else {
                    continue;
                };
                // Trailers and previews are flagged separately from the
                // mainline episodes.
                if params.get("is_trailer").and_then(Value::as_str) == Some("1") {
                    continue;
                }
                let title = params
                    .get("title")
                    .and_then(Value::as_str)
                    .or_else(|| params.get("union_title").and_then(Value::as_str))
                    .unwrap_or(vid);
                out.push(RawEpisode {
                    url: format!("https://v.qq.com/x/cover/{cid}/{vid}.html"),
                    title: title.to_string(),
                    air_date: None,
                });
            }
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        let vid = VID_FROM_URL
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("no vid in tencent url {url}")))?;

        let base: Value = client::get_json(&format!("{BARRAGE_BASE}/{vid}"), Some("https://v.qq.com")).await?;
        let segments: Vec<String> = base
            .get("segment_index")
            .and_then(Value::as_object)
            .map(|index| {
                index
                    .values()
                    .filter_map(|seg| seg.get("segment_name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Bounded fan-out over the segment list.
        let mut comments = Vec::new();
        for chunk in segments.chunks(8) {
            let fetches = chunk.iter().map(|name| Self::fetch_segment(&vid, name));
            for result in futures::future::join_all(fetches).await {
                match result {
                    Ok(mut list) => comments.append(&mut list),
                    Err(e) => debug!(error = %e, "Tencent segment fetch failed"),
                }
            }
        }
        comments.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(comments)
    }

    fn matches_host(&self, host: &str) -> bool {
        host == "v.qq.com" || host.ends_with(".v.qq.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vid_extraction() {
        let caps = VID_FROM_URL
            .captures("https://v.qq.com/x/cover/mzc002004cjap0v/x4100g3nhfi.html")
            .unwrap();
        assert_eq!(&caps[1], "x4100g3nhfi");
    }

    #[test]
    fn test_media_type_mapping() {
        assert_eq!(TencentSource::media_type_of("电视剧"), MediaType::Drama);
        assert_eq!(TencentSource::media_type_of("综艺"), MediaType::Variety);
        assert_eq!(TencentSource::media_type_of("其他"), MediaType::Other);
    }

    #[test]
    fn test_host_match() {
        let source = TencentSource::new();
        assert!(source.matches_host("v.qq.com"));
        assert!(source.matches_host("m.v.qq.com"));
        assert!(!source.matches_host("qq.com"));
    }
}
