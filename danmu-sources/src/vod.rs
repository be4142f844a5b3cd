//! Generic VOD-site family (MacCMS-style `provide/vod` JSON API).
//!
//! Servers come from `VOD_SERVERS`; `VOD_RETURN_MODE` picks between merging
//! every server's results and racing for the fastest one. Episode URLs point
//! at real platforms, so comments route by host like the 360 aggregator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use danmu_core::config::{ConfigRegistry, VodReturnMode, VodServer};
use danmu_core::models::{Danmaku, MediaType};
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client;

pub struct VodSource {
    config: Arc<ConfigRegistry>,
}

impl VodSource {
    pub fn new(config: Arc<ConfigRegistry>) -> Self {
        Self { config }
    }

    async fn search_server(server: &VodServer, keyword: &str, timeout: Duration) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{}/api.php/provide/vod/?ac=detail&wd={}",
            server.url,
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = tokio::time::timeout(timeout, client::get_json(&url, None))
            .await
            .map_err(|_| Error::Upstream(format!("vod server {} timed out", server.name)))??;

        let mut out = Vec::new();
        for item in resp.get("list").and_then(Value::as_array).unwrap_or(&Vec::new()) {
            let Some(vod_id) = item
                .get("vod_id")
                .and_then(|v| v.as_u64().map(|n| n.to_string()).or_else(|| v.as_str().map(str::to_string)))
            else {
                continue;
            };
            let title = client::strip_markup(item.get("vod_name").and_then(Value::as_str).unwrap_or(""));
            if title.is_empty() {
                continue;
            }

            let type_name = item.get("type_name").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("vod", format!("{}:{vod_id}", server.name), title);
            raw.media_type = match type_name {
                t if t.contains("剧") => MediaType::Drama,
                t if t.contains("电影") || t.contains("片") => MediaType::Movie,
                t if t.contains("综艺") => MediaType::Variety,
                t if t.contains("动漫") || t.contains("动画") => MediaType::Anime,
                _ => MediaType::Other,
            };
            raw.type_description = type_name.to_string();
            raw.year = item
                .get("vod_year")
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64().map(|n| n as u32)));
            raw.image_url = item.get("vod_pic").and_then(Value::as_str).unwrap_or("").to_string();
            // The play-url table is already in the detail response.
            raw.extra = item.get("vod_play_url").cloned().unwrap_or(Value::Null);
            out.push(raw);
        }
        Ok(out)
    }
}

/// Parse a MacCMS `vod_play_url` field: play sources separated by `$$$`,
/// episodes by `#`, each episode `title$url`. Only http(s) URLs survive.
fn parse_play_url(raw: &str) -> Vec<RawEpisode> {
    let mut best: Vec<RawEpisode> = Vec::new();
    for source_block in raw.split("$$$") {
        let mut episodes = Vec::new();
        for entry in source_block.split('#') {
            let (title, url) = match entry.split_once('$') {
                Some((title, url)) => (title, url),
                None => ("", entry),
            };
            if !url.starts_with("http") {
                continue;
            }
            episodes.push(RawEpisode {
                url: url.trim().to_string(),
                title: if title.is_empty() {
                    format!("第{}集", episodes.len() + 1)
                } else {
                    title.trim().to_string()
                },
                air_date: None,
            });
        }
        if episodes.len() > best.len() {
            best = episodes;
        }
    }
    best
}

#[async_trait]
impl Source for VodSource {
    fn name(&self) -> &'static str {
        "vod"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let settings = self.config.settings();
        let servers = settings.vod_servers();
        if servers.is_empty() {
            return Ok(Vec::new());
        }
        let timeout = Duration::from_millis(settings.vod_request_timeout_ms);

        match settings.vod_return_mode {
            VodReturnMode::All => {
                let searches = servers
                    .iter()
                    .map(|server| Self::search_server(server, keyword, timeout));
                let mut out = Vec::new();
                for (server, result) in servers.iter().zip(futures::future::join_all(searches).await)
                {
                    match result {
                        Ok(mut list) => out.append(&mut list),
                        Err(e) => warn!(server = %server.name, error = %e, "VOD server failed"),
                    }
                }
                debug!(count = out.len(), "VOD merged results");
                Ok(out)
            }
            VodReturnMode::Fastest => {
                let searches = servers
                    .iter()
                    .map(|server| Box::pin(Self::search_server(server, keyword, timeout)));
                match futures::future::select_ok(searches).await {
                    Ok((list, _)) => {
                        debug!(count = list.len(), "VOD fastest result");
                        Ok(list)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let Some(raw) = anime.extra.as_str() else {
            return Ok(Vec::new());
        };
        Ok(parse_play_url(raw))
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        Err(Error::InvalidInput(format!(
            "vod sites carry no comment endpoint for {url}"
        )))
    }

    fn matches_host(&self, _host: &str) -> bool {
        false
    }
}
