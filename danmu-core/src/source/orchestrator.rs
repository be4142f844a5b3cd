//! Fan-out orchestration over the enabled sources.
//!
//! Search fans out to every enabled source in parallel, then merges serially
//! in `SOURCE_ORDER` so the response order is deterministic. Per-source
//! failures and timeouts flatten to empty results; they never fail the
//! request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::config::ConfigRegistry;
use crate::matcher::{self, collapse_spaces, parse_file_name, parse_season_token};
use crate::models::{ascii_sum, Anime, Danmaku, Episode, MediaType};
use crate::storage::StorageService;

use super::{registry::SourceRegistry, SearchContext};

static URL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://)?([a-zA-Z0-9-]+\.)+[a-zA-Z]{2,6}(:\d+)?(/[^\s]*)?$")
        .expect("invalid url-keyword regex")
});

/// Optional foreign-title translation hook (TMDB with Douban fallback).
#[async_trait]
pub trait TitleTranslator: Send + Sync {
    async fn to_chinese(&self, title: &str) -> Option<String>;
}

/// One row of the match response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchItem {
    pub episode_id: u32,
    pub anime_id: u32,
    pub anime_title: String,
    pub episode_title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub shift: f64,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub is_matched: bool,
    pub matches: Vec<MatchItem>,
}

pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    catalog: Arc<Catalog>,
    config: Arc<ConfigRegistry>,
    storage: Arc<StorageService>,
    translator: Option<Arc<dyn TitleTranslator>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        catalog: Arc<Catalog>,
        config: Arc<ConfigRegistry>,
        storage: Arc<StorageService>,
    ) -> Self {
        Self {
            registry,
            catalog,
            config,
            storage,
            translator: None,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn TitleTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<ConfigRegistry> {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageService> {
        &self.storage
    }

    // ========== Search ==========

    pub async fn search_anime(&self, keyword: &str) -> Vec<Anime> {
        self.storage.ensure_ready().await;
        let settings = self.config.settings();
        let derived = self.config.derived();

        let keyword = collapse_spaces(keyword.trim());
        if keyword.is_empty() {
            return Vec::new();
        }

        if let Some(hit) = self
            .catalog
            .get_search_cache(&keyword, settings.search_cache_ttl_secs())
        {
            debug!(keyword, "Search cache hit");
            return hit;
        }

        // A URL keyword bypasses the platforms entirely: one synthetic anime
        // whose single episode is the URL itself.
        if URL_KEYWORD.is_match(&keyword) {
            let results = vec![self.synthesize_url_anime(&keyword)];
            self.catalog.set_search_cache(&keyword, results.clone());
            self.store_last_select(&results, &keyword, settings.max_last_select_map);
            self.storage.spawn_persist();
            return results;
        }

        let (base, season) = split_query_season(&keyword);

        let enabled: Vec<_> = settings
            .source_order
            .iter()
            .filter_map(|name| self.registry.get(name))
            .collect();

        // Fan out in parallel; every failure flattens to an empty list.
        let timeout = Duration::from_millis(settings.vod_request_timeout_ms);
        let searches = enabled.iter().map(|source| {
            let source = source.clone();
            let base = base.clone();
            async move {
                match tokio::time::timeout(timeout, source.search(&base)).await {
                    Ok(Ok(results)) => results,
                    Ok(Err(e)) => {
                        warn!(source = source.name(), error = %e, "Source search failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(source = source.name(), "Source search timed out");
                        Vec::new()
                    }
                }
            }
        });
        let raw_lists = futures::future::join_all(searches).await;

        // Serial merge preserving the declared order.
        let ctx = SearchContext {
            catalog: &self.catalog,
            settings: &settings,
            derived: &derived,
            keyword: base.clone(),
            season,
        };
        let mut merged = Vec::new();
        for (source, raw) in enabled.iter().zip(raw_lists) {
            source.handle_animes(&ctx, raw, &mut merged).await;
        }

        self.store_last_select(&merged, &keyword, settings.max_last_select_map);
        self.catalog.set_search_cache(&keyword, merged.clone());
        self.storage.spawn_persist();
        merged
    }

    fn synthesize_url_anime(&self, url: &str) -> Anime {
        let platform = self.registry.platform_for_url(url).unwrap_or("other");
        let anime = Anime {
            anime_id: ascii_sum(url),
            bangumi_id: url.to_string(),
            anime_title: Anime::display_title(url, None, MediaType::Other, platform),
            media_type: MediaType::Other,
            type_description: MediaType::Other.as_str().to_string(),
            image_url: String::new(),
            start_date: String::new(),
            episode_count: 1,
            rating: 0.0,
            is_favorited: false,
            source: platform.to_string(),
            links: vec![Episode {
                id: 0,
                url: url.to_string(),
                title: format!("【{platform}】{url}"),
            }],
        };
        self.catalog.add_anime(anime)
    }

    fn store_last_select(&self, results: &[Anime], keyword: &str, cap: usize) {
        if results.is_empty() {
            return;
        }
        let ids: Vec<u32> = results.iter().map(|a| a.anime_id).collect();
        self.catalog.store_anime_ids_to_map(&ids, keyword, cap);
    }

    // ========== Comments ==========

    /// Fetch the comments behind one URL, host-routed to the owning source.
    /// Source failures and unroutable hosts come back as empty lists.
    pub async fn comments_for_url(&self, url: &str) -> Vec<Danmaku> {
        self.storage.ensure_ready().await;
        let settings = self.config.settings();

        if let Some(hit) = self
            .catalog
            .get_comment_cache(url, settings.comment_cache_ttl_secs())
        {
            debug!(url, "Comment cache hit");
            return hit;
        }

        let Some(source) = self.registry.route_url(url) else {
            warn!(url, "No source claims this host");
            return Vec::new();
        };

        match source.comments(url).await {
            Ok(comments) => {
                self.catalog.set_comment_cache(url, comments.clone());
                self.storage.spawn_persist();
                comments
            }
            Err(e) => {
                warn!(source = source.name(), url, error = %e, "Comment fetch failed");
                Vec::new()
            }
        }
    }

    // ========== Match ==========

    pub async fn match_file(&self, file_name: &str) -> MatchResult {
        self.storage.ensure_ready().await;
        let settings = self.config.settings();

        let known = self.registry.names();
        let mut parsed = parse_file_name(file_name, &known);
        debug!(?parsed, "Parsed file name");
        if parsed.title.is_empty() {
            return MatchResult {
                is_matched: false,
                matches: Vec::new(),
            };
        }

        if settings.title_to_chinese {
            if let Some(translator) = &self.translator {
                if let Some(chinese) = translator.to_chinese(&parsed.title).await {
                    debug!(from = %parsed.title, to = %chinese, "Translated title");
                    parsed.title = chinese;
                }
            }
        }

        let prefer = if settings.remember_last_select {
            self.catalog.get_prefer_anime_id(&parsed.title)
        } else {
            None
        };

        let results = self.search_anime(&parsed.title).await;

        // Dynamic platform order: the file's own tag first, then the
        // configured order, then everything else.
        let mut order: Vec<String> = Vec::new();
        if let Some(platform) = &parsed.platform {
            order.push(platform.clone());
        }
        for name in settings
            .platform_order
            .iter()
            .map(String::as_str)
            .chain(known.iter().copied())
        {
            if !order.iter().any(|o| o == name) {
                order.push(name.to_string());
            }
        }

        for platform in &order {
            for anime in results.iter().filter(|a| &a.source == platform) {
                if let Some(prefer_id) = prefer {
                    if anime.anime_id != prefer_id {
                        continue;
                    }
                }
                if let Some(item) = self.try_match_anime(anime, &parsed) {
                    if settings.remember_last_select {
                        self.catalog.set_prefer_by_anime_id(anime.anime_id);
                    }
                    return MatchResult {
                        is_matched: true,
                        matches: vec![item],
                    };
                }
            }
        }

        // Fallback: the first result, platform preference notwithstanding.
        if let Some(anime) = results.first() {
            if let Some(episode) = anime.links.first() {
                return MatchResult {
                    is_matched: true,
                    matches: vec![match_item(anime, episode)],
                };
            }
        }

        MatchResult {
            is_matched: false,
            matches: Vec::new(),
        }
    }

    fn try_match_anime(&self, anime: &Anime, parsed: &matcher::ParsedFileName) -> Option<MatchItem> {
        let links = dedupe_by_title(&anime.links);

        if let (Some(season), Some(episode)) = (parsed.season, parsed.episode) {
            if !season_matches(anime.title_without_parens(), &parsed.title, season) {
                return None;
            }
            let index = episode as usize;
            if index >= 1 && links.len() >= index {
                return Some(match_item(anime, links[index - 1]));
            }
            return None;
        }

        // Movie: a theatrical type or an exact title match takes episode 1.
        let exact = collapse_spaces(&anime.title_without_parens().to_lowercase())
            == collapse_spaces(&parsed.title.to_lowercase());
        if anime.media_type.is_movie() || exact {
            return links.first().copied().map(|ep| match_item(anime, ep));
        }
        None
    }
}

fn match_item(anime: &Anime, episode: &Episode) -> MatchItem {
    MatchItem {
        episode_id: episode.id,
        anime_id: anime.anime_id,
        anime_title: anime.anime_title.clone(),
        episode_title: episode.title.clone(),
        media_type: anime.media_type,
        shift: 0.0,
        image_url: anime.image_url.clone(),
    }
}

/// Keep the first episode for each distinct title.
fn dedupe_by_title(links: &[Episode]) -> Vec<&Episode> {
    let mut seen = std::collections::HashSet::new();
    links
        .iter()
        .filter(|ep| seen.insert(ep.title.as_str()))
        .collect()
}

/// Whether an anime title names the requested season of `query`:
/// the residue after the query parses to the season number, or is empty for
/// season one.
fn season_matches(title: &str, query: &str, season: u32) -> bool {
    let t = collapse_spaces(&title.to_lowercase());
    let q = collapse_spaces(&query.to_lowercase());
    match t.strip_prefix(&q) {
        Some(rest) => match parse_season_token(rest) {
            Some(n) => n == season,
            None => rest.trim().is_empty() && season == 1,
        },
        None => false,
    }
}

/// Split a trailing season token off a query: `"亲爱的X 2"` → `("亲爱的X", 2)`.
fn split_query_season(keyword: &str) -> (String, Option<u32>) {
    if let Some((head, tail)) = keyword.rsplit_once(' ') {
        if let Some(season) = parse_season_token(tail) {
            return (head.to_string(), Some(season));
        }
    }
    if let Some(head) = keyword
        .find('第')
        .map(|i| &keyword[..i])
        .filter(|h| !h.is_empty())
    {
        if let Some(season) = parse_season_token(&keyword[head.len()..]) {
            return (head.trim().to_string(), Some(season));
        }
    }
    (keyword.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::source::{RawAnime, RawEpisode, Source};
    use crate::Result;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        name: &'static str,
        results: Vec<(RawAnime, Vec<RawEpisode>)>,
        fail_search: bool,
        search_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(name: &'static str, results: Vec<(RawAnime, Vec<RawEpisode>)>) -> Self {
            Self {
                name,
                results,
                fail_search: false,
                search_calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                results: Vec::new(),
                fail_search: true,
                search_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Source for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _keyword: &str) -> Result<Vec<RawAnime>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_search {
                return Err(crate::Error::Upstream("stub failure".into()));
            }
            Ok(self.results.iter().map(|(a, _)| a.clone()).collect())
        }

        async fn episodes(&self, anime: &RawAnime) -> Result<Vec<RawEpisode>> {
            Ok(self
                .results
                .iter()
                .find(|(a, _)| a.bangumi_id == anime.bangumi_id)
                .map(|(_, eps)| eps.clone())
                .unwrap_or_default())
        }

        async fn comments(&self, _url: &str) -> Result<Vec<Danmaku>> {
            Ok(vec![Danmaku::scrolling(1.0, "from stub")])
        }

        fn matches_host(&self, host: &str) -> bool {
            host.ends_with("stub.example.com")
        }
    }

    fn tencent_arcane() -> StubSource {
        let mut raw = RawAnime::new("tencent", "cover/abc", "Arcane");
        raw.year = Some(2021);
        raw.media_type = MediaType::Drama;
        StubSource::new(
            "tencent",
            vec![(
                raw,
                vec![
                    RawEpisode {
                        url: "https://v.stub.example.com/e1".into(),
                        title: "第1集".into(),
                        air_date: None,
                    },
                    RawEpisode {
                        url: "https://v.stub.example.com/e2".into(),
                        title: "第2集".into(),
                        air_date: None,
                    },
                ],
            )],
        )
    }

    fn orchestrator_with(
        sources: Vec<Arc<dyn Source>>,
        mutate: impl FnOnce(&mut Settings),
    ) -> Orchestrator {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }
        let registry = Arc::new(registry);
        let catalog = Arc::new(Catalog::new());
        let mut settings = Settings::default();
        mutate(&mut settings);
        let config = Arc::new(ConfigRegistry::new(settings, HashMap::new()));
        let storage = Arc::new(StorageService::new(catalog.clone(), config.clone()));
        Orchestrator::new(registry, catalog, config, storage)
    }

    #[tokio::test]
    async fn test_basic_search_scenario() {
        let orch = orchestrator_with(vec![Arc::new(tencent_arcane())], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let results = orch.search_anime("Arcane").await;
        assert_eq!(results.len(), 1);
        let anime = &results[0];
        assert_eq!(anime.anime_id, ascii_sum("cover/abc"));
        assert_eq!(anime.anime_title, "Arcane(2021)【drama】from tencent");
        assert_eq!(anime.episode_count, anime.links.len());
        assert!(anime.links.iter().all(|e| e.id >= 10001));
    }

    #[tokio::test]
    async fn test_search_cache_hit_equals_miss() {
        let orch = orchestrator_with(vec![Arc::new(tencent_arcane())], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let miss = orch.search_anime("Arcane").await;
        let hit = orch.search_anime("Arcane").await;
        assert_eq!(
            serde_json::to_string(&miss).ok(),
            serde_json::to_string(&hit).ok()
        );
    }

    #[tokio::test]
    async fn test_failed_source_does_not_fail_request() {
        let orch = orchestrator_with(
            vec![
                Arc::new(StubSource::failing("renren")),
                Arc::new(tencent_arcane()),
            ],
            |s| {
                s.source_order = vec!["renren".into(), "tencent".into()];
            },
        );

        let results = orch.search_anime("Arcane").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "tencent");
    }

    #[tokio::test]
    async fn test_merge_preserves_source_order() {
        let mut bili_raw = RawAnime::new("bilibili", "bili/1", "Arcane");
        bili_raw.media_type = MediaType::Anime;
        let bili = StubSource::new(
            "bilibili",
            vec![(
                bili_raw,
                vec![RawEpisode {
                    url: "https://b.stub.example.com/1".into(),
                    title: "第1话".into(),
                    air_date: None,
                }],
            )],
        );

        let orch = orchestrator_with(
            vec![Arc::new(tencent_arcane()), Arc::new(bili)],
            |s| {
                // Declared order puts bilibili first even though tencent
                // registered first.
                s.source_order = vec!["bilibili".into(), "tencent".into()];
            },
        );

        let results = orch.search_anime("Arcane").await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "bilibili");
        assert_eq!(results[1].source, "tencent");
    }

    #[tokio::test]
    async fn test_url_keyword_synthesizes_without_network() {
        let stub = Arc::new(tencent_arcane());
        let orch = orchestrator_with(vec![stub.clone()], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let results = orch
            .search_anime("https://v.stub.example.com/v_show/id_1.html")
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "tencent");
        assert_eq!(results[0].links.len(), 1);
        assert!(results[0].links[0].id >= 10001);
        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_comment_routing_and_cache() {
        let orch = orchestrator_with(vec![Arc::new(tencent_arcane())], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let comments = orch
            .comments_for_url("https://v.stub.example.com/e1")
            .await;
        assert_eq!(comments.len(), 1);

        let unroutable = orch.comments_for_url("https://elsewhere.net/x").await;
        assert!(unroutable.is_empty());
    }

    #[tokio::test]
    async fn test_match_series_episode() {
        let mut raw = RawAnime::new("tencent", "qinaide/2", "亲爱的X 2");
        raw.media_type = MediaType::Drama;
        let episodes: Vec<RawEpisode> = (1..=10)
            .map(|i| RawEpisode {
                url: format!("https://v.stub.example.com/s2e{i}"),
                title: format!("第{i}集"),
                air_date: None,
            })
            .collect();
        let source = StubSource::new("tencent", vec![(raw, episodes)]);

        let orch = orchestrator_with(vec![Arc::new(source)], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let result = orch.match_file("亲爱的X.S02E07.2160p.WEB-DL.mkv").await;
        assert!(result.is_matched);
        assert_eq!(result.matches.len(), 1);
        assert!(result.matches[0].episode_title.contains("第7集"));
    }

    #[tokio::test]
    async fn test_match_movie() {
        let mut raw = RawAnime::new("tencent", "movie/1", "Blood River");
        raw.media_type = MediaType::Movie;
        raw.year = Some(2023);
        let source = StubSource::new(
            "tencent",
            vec![(
                raw,
                vec![RawEpisode {
                    url: "https://v.stub.example.com/movie".into(),
                    title: "正片".into(),
                    air_date: None,
                }],
            )],
        );

        let orch = orchestrator_with(vec![Arc::new(source)], |s| {
            s.source_order = vec!["tencent".into()];
        });

        let result = orch.match_file("Blood.River.2023.1080p.BluRay.x264.mkv").await;
        assert!(result.is_matched);
        assert_eq!(
            result.matches[0].anime_title,
            "Blood River(2023)【movie】from tencent"
        );
    }

    #[tokio::test]
    async fn test_match_fallback_uses_first_result() {
        // Series file, but the only result is neither season-matching nor a
        // movie: fall back to its first episode.
        let raw = RawAnime::new("tencent", "other/1", "某某剧 特别篇");
        let source = StubSource::new(
            "tencent",
            vec![(
                raw,
                vec![RawEpisode {
                    url: "https://v.stub.example.com/o1".into(),
                    title: "第1集".into(),
                    air_date: None,
                }],
            )],
        );
        let orch = orchestrator_with(vec![Arc::new(source)], |s| {
            s.source_order = vec!["tencent".into()];
            s.strict_title_match = false;
        });

        let result = orch.match_file("某某剧.S03E01.mkv").await;
        assert!(result.is_matched);
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn test_split_query_season() {
        assert_eq!(split_query_season("亲爱的X 2"), ("亲爱的X".into(), Some(2)));
        assert_eq!(split_query_season("某剧第二季"), ("某剧".into(), Some(2)));
        assert_eq!(split_query_season("流浪地球2"), ("流浪地球2".into(), None));
    }
}
