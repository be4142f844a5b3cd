//! The source plugin contract.
//!
//! One adapter per upstream platform. Quirks (token handshakes, short-link
//! resolution, cookie requirements) stay inside the adapter; the orchestrator
//! only sees this trait.

pub mod orchestrator;
pub mod registry;

use async_trait::async_trait;
use tracing::warn;

use crate::catalog::Catalog;
use crate::config::{DerivedState, Settings};
use crate::matcher;
use crate::models::{ascii_sum, Anime, Danmaku, Episode, MediaType};
use crate::Result;

pub use orchestrator::{MatchItem, MatchResult, Orchestrator};
pub use registry::SourceRegistry;

/// Raw search hit from one platform, before normalization.
#[derive(Debug, Clone)]
pub struct RawAnime {
    pub source: String,
    /// Platform-native id, opaque to everything but the owning adapter.
    pub bangumi_id: String,
    pub title: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    pub type_description: String,
    pub image_url: String,
    pub start_date: String,
    pub rating: f64,
    /// Adapter-private payload carried from search to the episode listing
    /// (e.g. the play-link table an aggregator already returned).
    pub extra: serde_json::Value,
}

impl RawAnime {
    pub fn new(source: &str, bangumi_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            bangumi_id: bangumi_id.into(),
            title: title.into(),
            year: None,
            media_type: MediaType::Other,
            type_description: String::new(),
            image_url: String::new(),
            start_date: String::new(),
            rating: 0.0,
            extra: serde_json::Value::Null,
        }
    }
}

/// Raw episode listing entry.
#[derive(Debug, Clone)]
pub struct RawEpisode {
    /// Upstream URL or opaque provider id consumed by `comments()`.
    pub url: String,
    pub title: String,
    /// Air date for variety shows (`第N期 YYYY-MM-DD` titles).
    pub air_date: Option<String>,
}

/// Shared state for one search pass.
pub struct SearchContext<'a> {
    pub catalog: &'a Catalog,
    pub settings: &'a Settings,
    pub derived: &'a DerivedState,
    /// Cleaned query title.
    pub keyword: String,
    /// Season the query asked for, when it could be parsed off the keyword.
    pub season: Option<u32>,
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier, e.g. `"tencent"`.
    fn name(&self) -> &'static str;

    /// Search the platform. Non-fatal failures come back as errors and are
    /// flattened to empty results at the orchestrator boundary.
    async fn search(&self, keyword: &str) -> Result<Vec<RawAnime>>;

    /// List the episodes of one raw search hit.
    async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>>;

    /// Fetch and normalize the comments behind one episode URL.
    async fn comments(&self, url: &str) -> Result<Vec<Danmaku>>;

    /// Whether this adapter owns comment URLs on `host`.
    fn matches_host(&self, _host: &str) -> bool {
        false
    }

    /// Tag rendered into episode titles, `【tag】...`.
    fn platform_tag(&self) -> &'static str {
        self.name()
    }

    /// Normalize raw hits into catalog entries and append them to `out`.
    ///
    /// The default flow covers every adapter without special title handling:
    /// title-filter against the query, fetch episodes, apply the episode
    /// title filter, build the [`Anime`], and register it with the catalog
    /// (which assigns the stable episode ids).
    async fn handle_animes(
        &self,
        ctx: &SearchContext<'_>,
        raw: Vec<RawAnime>,
        out: &mut Vec<Anime>,
    ) {
        for item in raw {
            if !matcher::title_matches(
                &item.title,
                &ctx.keyword,
                ctx.season,
                ctx.settings.strict_title_match,
            ) {
                continue;
            }

            let episodes = match self.episodes(&item).await {
                Ok(eps) => eps,
                Err(e) => {
                    warn!(source = self.name(), title = %item.title, error = %e, "Episode listing failed");
                    continue;
                }
            };

            if let Some(anime) = build_anime(self.platform_tag(), ctx, &item, episodes) {
                out.push(ctx.catalog.add_anime(anime));
            }
        }
    }
}

/// Construct a catalog-ready [`Anime`] from one raw hit and its episodes.
/// Returns `None` when no episode survives filtering.
pub fn build_anime(
    platform_tag: &str,
    ctx: &SearchContext<'_>,
    item: &RawAnime,
    episodes: Vec<RawEpisode>,
) -> Option<Anime> {
    let filter = if ctx.settings.enable_episode_filter {
        ctx.derived.episode_filter.as_ref()
    } else {
        None
    };

    let links: Vec<Episode> = episodes
        .into_iter()
        .filter(|ep| filter.is_none_or(|re| !re.is_match(&ep.title)))
        .map(|ep| {
            let title = match &ep.air_date {
                Some(date) => format!("【{platform_tag}】{} {date}", ep.title),
                None => format!("【{platform_tag}】{}", ep.title),
            };
            Episode {
                id: 0,
                url: ep.url,
                title,
            }
        })
        .collect();

    if links.is_empty() {
        return None;
    }

    let type_description = if item.type_description.is_empty() {
        item.media_type.as_str().to_string()
    } else {
        item.type_description.clone()
    };

    Some(Anime {
        anime_id: ascii_sum(&item.bangumi_id),
        bangumi_id: item.bangumi_id.clone(),
        anime_title: Anime::display_title(&item.title, item.year, item.media_type, &item.source),
        media_type: item.media_type,
        type_description,
        image_url: item.image_url.clone(),
        start_date: item.start_date.clone(),
        episode_count: links.len(),
        rating: item.rating,
        is_favorited: false,
        source: item.source.clone(),
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRegistry;
    use std::collections::HashMap;

    fn context<'a>(
        catalog: &'a Catalog,
        settings: &'a Settings,
        derived: &'a DerivedState,
    ) -> SearchContext<'a> {
        SearchContext {
            catalog,
            settings,
            derived,
            keyword: "Arcane".to_string(),
            season: None,
        }
    }

    #[test]
    fn test_build_anime_assigns_display_title() {
        let catalog = Catalog::new();
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let settings = registry.settings();
        let derived = registry.derived();
        let ctx = context(&catalog, &settings, &derived);

        let mut raw = RawAnime::new("tencent", "cover/abc", "Arcane");
        raw.year = Some(2021);
        raw.media_type = MediaType::Drama;

        let episodes = vec![RawEpisode {
            url: "https://v.qq.com/x/cover/abc/e1.html".into(),
            title: "第1集".into(),
            air_date: None,
        }];

        let anime = build_anime("tencent", &ctx, &raw, episodes).unwrap();
        assert_eq!(anime.anime_id, ascii_sum("cover/abc"));
        assert_eq!(anime.anime_title, "Arcane(2021)【drama】from tencent");
        assert_eq!(anime.episode_count, 1);
        assert_eq!(anime.links[0].title, "【tencent】第1集");
    }

    #[test]
    fn test_episode_filter_drops_titles_and_empty_animes() {
        let catalog = Catalog::new();
        let mut settings = Settings::default();
        settings.enable_episode_filter = true;
        let registry = ConfigRegistry::new(settings, HashMap::new());
        let settings = registry.settings();
        let derived = registry.derived();
        let ctx = context(&catalog, &settings, &derived);

        let raw = RawAnime::new("tencent", "id", "Arcane");
        let episodes = vec![
            RawEpisode {
                url: "u1".into(),
                title: "预告片".into(),
                air_date: None,
            },
            RawEpisode {
                url: "u2".into(),
                title: "第1集".into(),
                air_date: None,
            },
        ];
        let anime = build_anime("tencent", &ctx, &raw, episodes).unwrap();
        assert_eq!(anime.episode_count, 1);

        let only_noise = vec![RawEpisode {
            url: "u3".into(),
            title: "彩蛋".into(),
            air_date: None,
        }];
        assert!(build_anime("tencent", &ctx, &raw, only_noise).is_none());
    }

    #[test]
    fn test_variety_air_date_in_title() {
        let catalog = Catalog::new();
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let settings = registry.settings();
        let derived = registry.derived();
        let ctx = context(&catalog, &settings, &derived);

        let raw = RawAnime::new("imgo", "id", "Arcane");
        let episodes = vec![RawEpisode {
            url: "u1".into(),
            title: "第1期".into(),
            air_date: Some("2024-06-01".into()),
        }];
        let anime = build_anime("imgo", &ctx, &raw, episodes).unwrap();
        assert_eq!(anime.links[0].title, "【imgo】第1期 2024-06-01");
    }
}
