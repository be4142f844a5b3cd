//! In-memory catalog: the process-wide identity map between player-facing
//! integer ids and upstream URLs, plus the TTL'd search/comment caches and
//! the per-query "last selected" memory.
//!
//! Ownership is linear: the bounded anime list owns its episodes, the global
//! episode index is a derived secondary index. Eviction repairs the index by
//! removing the evicted anime's URLs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Anime, Danmaku, Episode};

/// Bounded capacity of the anime list; oldest entries are evicted first.
pub const MAX_ANIMES: usize = 100;

/// First episode id handed out by a fresh process.
pub const EPISODE_ID_BASE: u32 = 10001;

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A cached value with its insertion timestamp (unix seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEntry<T> {
    pub value: T,
    pub timestamp: i64,
}

impl<T> TimedEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            timestamp: now_ts(),
        }
    }

    pub fn is_live(&self, ttl_secs: i64) -> bool {
        ttl_secs > 0 && now_ts() - self.timestamp < ttl_secs
    }
}

/// Which anime ids a query produced, and which one the user settled on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSelect {
    pub query: String,
    #[serde(rename = "animeIds")]
    pub anime_ids: Vec<u32>,
    pub prefer: Option<u32>,
    pub timestamp: i64,
}

#[derive(Default)]
struct CatalogInner {
    animes: VecDeque<Anime>,
    episodes: Vec<Episode>,
    last_select: VecDeque<LastSelect>,
    search_cache: HashMap<String, TimedEntry<Vec<Anime>>>,
    comment_cache: HashMap<String, TimedEntry<Vec<Danmaku>>>,
}

pub struct Catalog {
    inner: RwLock<CatalogInner>,
    episode_num: AtomicU32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner::default()),
            episode_num: AtomicU32::new(EPISODE_ID_BASE),
        }
    }

    // ========== Episodes ==========

    /// Register an episode URL, returning the stable record for it. A URL
    /// that is already indexed keeps its id and its original title.
    pub fn add_episode(&self, url: &str, title: &str) -> Episode {
        let mut inner = self.inner.write();
        Self::add_episode_locked(&mut inner, &self.episode_num, url, title)
    }

    fn add_episode_locked(
        inner: &mut CatalogInner,
        counter: &AtomicU32,
        url: &str,
        title: &str,
    ) -> Episode {
        if let Some(existing) = inner.episodes.iter().find(|e| e.url == url) {
            return existing.clone();
        }
        let episode = Episode {
            id: counter.fetch_add(1, Ordering::SeqCst),
            url: url.to_string(),
            title: title.to_string(),
        };
        inner.episodes.push(episode.clone());
        episode
    }

    pub fn find_url_by_id(&self, id: u32) -> Option<String> {
        self.inner
            .read()
            .episodes
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.url.clone())
    }

    pub fn find_title_by_id(&self, id: u32) -> Option<String> {
        self.inner
            .read()
            .episodes
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.title.clone())
    }

    /// Which anime a comment (episode) id belongs to.
    pub fn find_anime_id_by_comment_id(&self, id: u32) -> Option<u32> {
        let inner = self.inner.read();
        inner
            .animes
            .iter()
            .find(|a| a.links.iter().any(|e| e.id == id))
            .map(|a| a.anime_id)
    }

    pub fn episode_count(&self) -> usize {
        self.inner.read().episodes.len()
    }

    // ========== Animes ==========

    /// Insert an anime, assigning stable episode ids to its links, and
    /// return the stored record. A duplicate `anime_id` moves the existing
    /// entry to the tail (recency refresh) without re-adding episodes.
    /// Exceeding [`MAX_ANIMES`] evicts the head and unindexes its episode
    /// URLs.
    pub fn add_anime(&self, mut anime: Anime) -> Anime {
        let mut inner = self.inner.write();

        if let Some(pos) = inner.animes.iter().position(|a| a.anime_id == anime.anime_id) {
            if let Some(existing) = inner.animes.remove(pos) {
                inner.animes.push_back(existing);
            }
            // The freshly-moved tail entry.
            return inner
                .animes
                .back()
                .cloned()
                .unwrap_or(anime);
        }

        for link in &mut anime.links {
            let episode = Self::add_episode_locked(&mut inner, &self.episode_num, &link.url, &link.title);
            link.id = episode.id;
        }
        anime.episode_count = anime.links.len();
        inner.animes.push_back(anime.clone());

        while inner.animes.len() > MAX_ANIMES {
            if let Some(evicted) = inner.animes.pop_front() {
                debug!(anime_id = evicted.anime_id, title = %evicted.anime_title, "Evicting anime");
                inner
                    .episodes
                    .retain(|e| !evicted.links.iter().any(|l| l.url == e.url));
            }
        }
        anime
    }

    pub fn get_anime(&self, anime_id: u32) -> Option<Anime> {
        self.inner
            .read()
            .animes
            .iter()
            .find(|a| a.anime_id == anime_id)
            .cloned()
    }

    pub fn anime_count(&self) -> usize {
        self.inner.read().animes.len()
    }

    // ========== Last-select memory ==========

    /// Record the anime ids a query produced, unioned with any previous
    /// record and preserving its `prefer`. FIFO-evicts beyond `cap`.
    pub fn store_anime_ids_to_map(&self, anime_ids: &[u32], query: &str, cap: usize) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.last_select.iter_mut().find(|e| e.query == query) {
            for id in anime_ids {
                if !entry.anime_ids.contains(id) {
                    entry.anime_ids.push(*id);
                }
            }
            entry.timestamp = now_ts();
            return;
        }

        inner.last_select.push_back(LastSelect {
            query: query.to_string(),
            anime_ids: anime_ids.to_vec(),
            prefer: None,
            timestamp: now_ts(),
        });
        while inner.last_select.len() > cap {
            inner.last_select.pop_front();
        }
    }

    pub fn get_prefer_anime_id(&self, query: &str) -> Option<u32> {
        self.inner
            .read()
            .last_select
            .iter()
            .find(|e| e.query == query)
            .and_then(|e| e.prefer)
    }

    /// Mark `anime_id` as the user's choice for whichever query produced it.
    /// Returns the query key that was updated.
    pub fn set_prefer_by_anime_id(&self, anime_id: u32) -> Option<String> {
        let mut inner = self.inner.write();
        let entry = inner
            .last_select
            .iter_mut()
            .find(|e| e.anime_ids.contains(&anime_id))?;
        entry.prefer = Some(anime_id);
        Some(entry.query.clone())
    }

    // ========== Search cache ==========

    pub fn get_search_cache(&self, keyword: &str, ttl_secs: i64) -> Option<Vec<Anime>> {
        {
            let inner = self.inner.read();
            match inner.search_cache.get(keyword) {
                Some(entry) if entry.is_live(ttl_secs) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Stale: delete in place before reporting a miss.
        self.inner.write().search_cache.remove(keyword);
        None
    }

    pub fn set_search_cache(&self, keyword: &str, results: Vec<Anime>) {
        self.inner
            .write()
            .search_cache
            .insert(keyword.to_string(), TimedEntry::new(results));
    }

    // ========== Comment cache ==========

    pub fn get_comment_cache(&self, url: &str, ttl_secs: i64) -> Option<Vec<Danmaku>> {
        {
            let inner = self.inner.read();
            match inner.comment_cache.get(url) {
                Some(entry) if entry.is_live(ttl_secs) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().comment_cache.remove(url);
        None
    }

    pub fn set_comment_cache(&self, url: &str, comments: Vec<Danmaku>) {
        self.inner
            .write()
            .comment_cache
            .insert(url.to_string(), TimedEntry::new(comments));
    }

    // ========== Persistence snapshot ==========

    pub fn export(&self) -> CatalogSnapshot {
        let inner = self.inner.read();
        CatalogSnapshot {
            animes: inner.animes.iter().cloned().collect(),
            episode_ids: inner.episodes.clone(),
            episode_num: self.episode_num.load(Ordering::SeqCst),
            last_select_map: inner.last_select.iter().cloned().collect(),
            search_cache: inner.search_cache.clone(),
            comment_cache: inner.comment_cache.clone(),
        }
    }

    /// Restore from a persisted snapshot, dropping cache entries that are
    /// already expired under the given TTLs.
    pub fn import(&self, snapshot: CatalogSnapshot, search_ttl_secs: i64, comment_ttl_secs: i64) {
        let mut inner = self.inner.write();
        inner.animes = snapshot.animes.into_iter().collect();
        inner.episodes = snapshot.episode_ids;
        inner.last_select = snapshot.last_select_map.into_iter().collect();
        inner.search_cache = snapshot
            .search_cache
            .into_iter()
            .filter(|(_, entry)| entry.is_live(search_ttl_secs))
            .collect();
        inner.comment_cache = snapshot
            .comment_cache
            .into_iter()
            .filter(|(_, entry)| entry.is_live(comment_ttl_secs))
            .collect();

        let restored = snapshot.episode_num.max(EPISODE_ID_BASE);
        self.episode_num.store(restored, Ordering::SeqCst);
        debug!(
            animes = inner.animes.len(),
            episodes = inner.episodes.len(),
            episode_num = restored,
            "Catalog rehydrated"
        );
    }
}

/// Serialized catalog state, one field per persisted key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub animes: Vec<Anime>,
    #[serde(rename = "episodeIds")]
    pub episode_ids: Vec<Episode>,
    #[serde(rename = "episodeNum")]
    pub episode_num: u32,
    #[serde(rename = "lastSelectMap")]
    pub last_select_map: Vec<LastSelect>,
    #[serde(rename = "searchCache")]
    pub search_cache: HashMap<String, TimedEntry<Vec<Anime>>>,
    #[serde(rename = "commentCache")]
    pub comment_cache: HashMap<String, TimedEntry<Vec<Danmaku>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;

    fn anime(id_seed: &str, title: &str, urls: &[&str]) -> Anime {
        Anime {
            anime_id: crate::models::ascii_sum(id_seed),
            bangumi_id: id_seed.to_string(),
            anime_title: title.to_string(),
            media_type: MediaType::Drama,
            type_description: "drama".into(),
            image_url: String::new(),
            start_date: String::new(),
            episode_count: urls.len(),
            rating: 0.0,
            is_favorited: false,
            source: "tencent".into(),
            links: urls
                .iter()
                .enumerate()
                .map(|(i, url)| Episode {
                    id: 0,
                    url: (*url).to_string(),
                    title: format!("第{}话", i + 1),
                })
                .collect(),
        }
    }

    #[test]
    fn test_episode_id_stability() {
        let catalog = Catalog::new();
        let first = catalog.add_episode("https://example.com/v1", "one");
        let second = catalog.add_episode("https://example.com/v1", "two");
        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "one");
        assert_eq!(first.id, EPISODE_ID_BASE);
        assert_eq!(catalog.find_url_by_id(first.id).as_deref(), Some("https://example.com/v1"));
    }

    #[test]
    fn test_episode_ids_monotonic() {
        let catalog = Catalog::new();
        let a = catalog.add_episode("u1", "a");
        let b = catalog.add_episode("u2", "b");
        let c = catalog.add_episode("u3", "c");
        assert_eq!((a.id, b.id, c.id), (10001, 10002, 10003));
    }

    #[test]
    fn test_duplicate_add_moves_to_tail_without_reappending() {
        let catalog = Catalog::new();
        catalog.add_anime(anime("a1", "First", &["u1", "u2"]));
        catalog.add_anime(anime("a2", "Second", &["u3"]));
        let episodes_before = catalog.episode_count();

        catalog.add_anime(anime("a1", "First", &["u1", "u2"]));
        assert_eq!(catalog.anime_count(), 2);
        assert_eq!(catalog.episode_count(), episodes_before);

        let snapshot = catalog.export();
        assert_eq!(snapshot.animes.last().map(|a| a.anime_id), Some(crate::models::ascii_sum("a1")));
    }

    #[test]
    fn test_eviction_removes_episode_urls() {
        let catalog = Catalog::new();
        for i in 0..(MAX_ANIMES + 5) {
            let seed = format!("anime-{i}");
            let url = format!("https://example.com/{i}");
            catalog.add_anime(anime(&seed, &seed, &[url.as_str()]));
        }
        assert_eq!(catalog.anime_count(), MAX_ANIMES);

        // The first five animes' URLs are gone from the index.
        let snapshot = catalog.export();
        for i in 0..5 {
            let url = format!("https://example.com/{i}");
            assert!(!snapshot.episode_ids.iter().any(|e| e.url == url));
        }
        // Survivors are still indexed.
        assert!(snapshot.episode_ids.iter().any(|e| e.url == "https://example.com/10"));
    }

    #[test]
    fn test_last_select_union_and_prefer() {
        let catalog = Catalog::new();
        catalog.store_anime_ids_to_map(&[1, 2], "query", 10);
        catalog.store_anime_ids_to_map(&[2, 3], "query", 10);

        assert_eq!(catalog.get_prefer_anime_id("query"), None);
        assert_eq!(catalog.set_prefer_by_anime_id(3).as_deref(), Some("query"));
        assert_eq!(catalog.get_prefer_anime_id("query"), Some(3));

        // Union survives another store and prefer is untouched.
        catalog.store_anime_ids_to_map(&[4], "query", 10);
        assert_eq!(catalog.get_prefer_anime_id("query"), Some(3));
    }

    #[test]
    fn test_last_select_fifo_eviction() {
        let catalog = Catalog::new();
        for i in 0..5 {
            catalog.store_anime_ids_to_map(&[i], &format!("q{i}"), 3);
        }
        assert_eq!(catalog.get_prefer_anime_id("q0"), None);
        assert!(catalog.set_prefer_by_anime_id(0).is_none());
        assert!(catalog.set_prefer_by_anime_id(4).is_some());
    }

    #[test]
    fn test_search_cache_ttl() {
        let catalog = Catalog::new();
        catalog.set_search_cache("k", vec![]);
        assert!(catalog.get_search_cache("k", 60).is_some());
        // A zero TTL means everything is stale.
        assert!(catalog.get_search_cache("k", 0).is_none());
        // The stale get deleted the entry in place.
        assert!(catalog.get_search_cache("k", 60).is_none());
    }

    #[test]
    fn test_rehydrate_restores_counter_and_filters_stale() {
        let catalog = Catalog::new();
        catalog.add_episode("u1", "t1");
        let mut snapshot = catalog.export();
        snapshot
            .search_cache
            .insert("old".into(), TimedEntry { value: vec![], timestamp: 0 });
        snapshot.search_cache.insert(
            "fresh".into(),
            TimedEntry { value: vec![], timestamp: now_ts() },
        );

        let restored = Catalog::new();
        restored.import(snapshot, 60, 60);
        assert!(restored.get_search_cache("fresh", 60).is_some());
        assert!(restored.get_search_cache("old", 60).is_none());

        // New episodes continue after the restored counter.
        let next = restored.add_episode("u2", "t2");
        assert_eq!(next.id, 10002);
    }
}
