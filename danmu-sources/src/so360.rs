//! 360 Kan aggregator (so.360kan.com).
//!
//! This source owns no comment URLs of its own: every episode link it emits
//! points at one of the real platforms, so comment requests route to that
//! platform's adapter by host.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use danmu_core::models::{Danmaku, MediaType};
use danmu_core::source::{RawAnime, RawEpisode, Source};
use danmu_core::{Error, Result};

use crate::client;

const SEARCH_URL: &str = "https://api.so.360kan.com/index";

/// Aggregated sites worth surfacing, in preference order.
const SITES: [&str; 4] = ["qq", "qiyi", "youku", "imgo"];

pub struct So360Source;

impl So360Source {
    pub fn new() -> Self {
        Self
    }

    fn media_type_of(cat: &str) -> MediaType {
        match cat {
            "2" | "电视剧" => MediaType::Drama,
            "1" | "电影" => MediaType::Movie,
            "3" | "综艺" => MediaType::Variety,
            "4" | "动漫" => MediaType::Anime,
            _ => MediaType::Other,
        }
    }
}

impl Default for So360Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for So360Source {
    fn name(&self) -> &'static str {
        "360"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>> {
        let url = format!(
            "{SEARCH_URL}?force_v=1&kw={}&from=&pageno=1&v_ap=1&tab=all",
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = client::get_json(&url, Some("https://so.360kan.com")).await?;

        let mut out = Vec::new();
        let rows = resp
            .pointer("/data/longData/rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for row in rows {
            let Some(id) = row
                .get("en_id")
                .or_else(|| row.get("id"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let title = client::strip_markup(
                row.get("titleTxt")
                    .or_else(|| row.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or(""),
            );
            if title.is_empty() {
                continue;
            }

            let cat = row.get("cat_name").and_then(Value::as_str).unwrap_or("");
            let mut raw = RawAnime::new("360", id, title);
            raw.media_type = Self::media_type_of(cat);
            raw.type_description = cat.to_string();
            raw.year = row
                .get("year")
                .and_then(|v| v.as_u64().map(|n| n as u32).or_else(|| v.as_str().and_then(|s| s.parse().ok())));
            raw.image_url = row
                .get("cover")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim_start_matches("//")
                .to_string();
            // The whole playlink table rides along to the episode listing;
            // no second request needed.
            raw.extra = json!({
                "playlinks": row.get("playlinks").cloned().unwrap_or(Value::Null),
                "seriesPlaylinks": row.get("seriesPlaylinks").cloned().unwrap_or(Value::Null),
                "seriesSite": row.get("seriesSite").cloned().unwrap_or(Value::Null),
            });
            out.push(raw);
        }
        debug!(count = out.len(), "360kan search results");
        Ok(out)
    }

    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        let mut out = Vec::new();

        // Serial links (one per episode) from the preferred series site.
        if let Some(series) = anime
            .extra
            .get("seriesPlaylinks")
            .and_then(Value::as_array)
        {
            for (i, entry) in series.iter().enumerate() {
                let url = entry
                    .get("url")
                    .and_then(Value::as_str)
                    .or_else(|| entry.as_str());
                if let Some(url) = url {
                    out.push(RawEpisode {
                        url: url.to_string(),
                        title: format!("第{}集", i + 1),
                        air_date: None,
                    });
                }
            }
        }

        // Movies and one-offs only carry the per-site playlink table.
        if out.is_empty() {
            if let Some(links) = anime.extra.get("playlinks").and_then(Value::as_object) {
                for site in SITES {
                    if let Some(url) = links.get(site).and_then(Value::as_str) {
                        out.push(RawEpisode {
                            url: url.to_string(),
                            title: format!("正片({site})"),
                            air_date: None,
                        });
                    }
                }
            }
        }

        if out.is_empty() {
            return Err(Error::NotFound(format!(
                "no playlinks for 360 entry {}",
                anime.bangumi_id
            )));
        }
        Ok(out)
    }

    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>> {
        // Never reached through routing: the emitted URLs belong to other
        // platforms' hosts.
        Err(Error::InvalidInput(format!(
            "360 aggregator has no comment endpoint for {url}"
        )))
    }

    fn matches_host(&self, _host: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmu_core::catalog::Catalog;
    use danmu_core::config::{ConfigRegistry, Settings};
    use danmu_core::source::SearchContext;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_episodes_from_series_playlinks() {
        let mut raw = RawAnime::new("360", "abc", "某剧");
        raw.extra = json!({
            "playlinks": {"qq": "https://v.qq.com/x/cover/a/b.html"},
            "seriesPlaylinks": [
                {"url": "https://v.qq.com/x/cover/a/e1.html"},
                {"url": "https://v.qq.com/x/cover/a/e2.html"},
            ],
        });
        let source = So360Source::new();
        let eps = source.episodes(&raw).await.unwrap();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].title, "第1集");
        assert!(eps[1].url.ends_with("e2.html"));
    }

    #[tokio::test]
    async fn test_episodes_fall_back_to_playlinks() {
        let mut raw = RawAnime::new("360", "abc", "某电影");
        raw.extra = json!({
            "playlinks": {"qiyi": "https://www.iqiyi.com/v_abc.html"},
            "seriesPlaylinks": Value::Null,
        });
        let source = So360Source::new();
        let eps = source.episodes(&raw).await.unwrap();
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].title, "正片(qiyi)");
    }

    #[tokio::test]
    async fn test_handle_animes_uses_default_flow() {
        let catalog = Catalog::new();
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let settings = registry.settings();
        let derived = registry.derived();
        let ctx = SearchContext {
            catalog: &catalog,
            settings: &settings,
            derived: &derived,
            keyword: "某剧".to_string(),
            season: None,
        };

        let mut raw = RawAnime::new("360", "abc", "某剧");
        raw.extra = json!({
            "seriesPlaylinks": [{"url": "https://v.qq.com/x/cover/a/e1.html"}],
        });

        let source = So360Source::new();
        let mut out = Vec::new();
        source.handle_animes(&ctx, vec![raw], &mut out).await;
        assert_eq!(out.len(), 1);
        assert_eq!(catalog.anime_count(), 1);
        assert!(out[0].links[0].id >= 10001);
    }
}
