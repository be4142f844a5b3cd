//! Two-level write-behind persistence.
//!
//! Tier order: SQL (preferred), KV, memory-only. The backends are probed
//! exactly once per process, lazily on the first real request; writes are
//! fire-and-forget and hash-guarded so unchanged snapshots never hit the
//! database.

mod kv;
mod sql;

pub use kv::KvStore;
pub use sql::SqlStore;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogSnapshot};
use crate::config::ConfigRegistry;

const CACHE_KEYS: [&str; 6] = [
    "animes",
    "episodeIds",
    "episodeNum",
    "lastSelectMap",
    "searchCache",
    "commentCache",
];

struct Tiers {
    sql: Option<SqlStore>,
    kv: Option<KvStore>,
}

pub struct StorageService {
    catalog: Arc<Catalog>,
    config: Arc<ConfigRegistry>,
    /// Probed-once latch; static asset requests never touch this.
    tiers: OnceCell<Tiers>,
    last_hashes: Mutex<HashMap<&'static str, u64>>,
}

impl StorageService {
    pub fn new(catalog: Arc<Catalog>, config: Arc<ConfigRegistry>) -> Self {
        Self {
            catalog,
            config,
            tiers: OnceCell::new(),
            last_hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Probe the backends and rehydrate the catalog. Runs at most once per
    /// process; every caller after the first gets the cached result.
    pub async fn ensure_ready(&self) {
        self.tiers
            .get_or_init(|| async {
                let tiers = self.probe().await;
                self.rehydrate(&tiers).await;
                tiers
            })
            .await;
    }

    async fn probe(&self) -> Tiers {
        let settings = self.config.settings();

        let sql = if settings.database_url.is_empty() {
            None
        } else {
            match SqlStore::connect(&settings.database_url).await {
                Ok(store) => {
                    info!("SQL persistence tier online");
                    Some(store)
                }
                Err(e) => {
                    warn!(error = %e, "SQL tier unavailable, trying KV");
                    None
                }
            }
        };

        let kv = match KvStore::connect(&settings).await {
            Ok(Some(store)) => {
                info!("KV persistence tier online");
                Some(store)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "KV tier unavailable");
                None
            }
        };

        if sql.is_none() && kv.is_none() {
            info!("No persistence configured, running memory-only");
        }
        Tiers { sql, kv }
    }

    /// Pull every persisted key, TTL-filter the caches, restore the episode
    /// counter, and load the config overlay.
    async fn rehydrate(&self, tiers: &Tiers) {
        let mut snapshot = CatalogSnapshot::default();
        let mut found_any = false;

        for key in CACHE_KEYS {
            let Some(raw) = self.read_key(tiers, key).await else {
                continue;
            };
            found_any = true;
            let parsed: std::result::Result<(), serde_json::Error> = (|| {
                match key {
                    "animes" => snapshot.animes = serde_json::from_str(&raw)?,
                    "episodeIds" => snapshot.episode_ids = serde_json::from_str(&raw)?,
                    "episodeNum" => snapshot.episode_num = serde_json::from_str(&raw)?,
                    "lastSelectMap" => snapshot.last_select_map = serde_json::from_str(&raw)?,
                    "searchCache" => snapshot.search_cache = serde_json::from_str(&raw)?,
                    "commentCache" => snapshot.comment_cache = serde_json::from_str(&raw)?,
                    _ => {}
                }
                Ok(())
            })();
            if let Err(e) = parsed {
                warn!(key, error = %e, "Dropping unparseable persisted key");
            } else {
                // Remember what we loaded so unchanged state is not
                // immediately written back.
                self.last_hashes.lock().insert(key, str_hash(&raw));
            }
        }

        if found_any {
            let settings = self.config.settings();
            self.catalog.import(
                snapshot,
                settings.search_cache_ttl_secs(),
                settings.comment_cache_ttl_secs(),
            );
        }

        match self.load_overlay_from(tiers).await {
            Some(overlay) if !overlay.is_empty() => {
                info!(keys = overlay.len(), "Applying persisted config overlay");
                self.config.apply_patch(&overlay);
            }
            _ => {}
        }
    }

    async fn read_key(&self, tiers: &Tiers, key: &str) -> Option<String> {
        if let Some(sql) = &tiers.sql {
            match sql.get_cache(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "SQL read failed"),
            }
        }
        if let Some(kv) = &tiers.kv {
            match kv.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "KV read failed"),
            }
        }
        None
    }

    async fn load_overlay_from(&self, tiers: &Tiers) -> Option<HashMap<String, String>> {
        if let Some(sql) = &tiers.sql {
            match sql.load_env_configs().await {
                Ok(map) => return Some(map),
                Err(e) => warn!(error = %e, "Failed to load env_configs from SQL"),
            }
        }
        if let Some(kv) = &tiers.kv {
            match kv.get("env_configs").await {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(map) => return Some(map),
                    Err(e) => warn!(error = %e, "Unparseable env_configs in KV"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to load env_configs from KV"),
            }
        }
        None
    }

    /// Fire-and-forget catalog persistence. Serializes each key, skips
    /// unchanged hashes, and writes to every available tier; a write counts
    /// as long as one tier took it.
    pub fn spawn_persist(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.persist_now().await;
        });
    }

    pub async fn persist_now(&self) {
        let Some(tiers) = self.tiers.get() else {
            return;
        };
        if tiers.sql.is_none() && tiers.kv.is_none() {
            return;
        }

        let snapshot = self.catalog.export();
        let serialized: [(&'static str, String); 6] = [
            ("animes", to_json_or_empty(&snapshot.animes)),
            ("episodeIds", to_json_or_empty(&snapshot.episode_ids)),
            ("episodeNum", snapshot.episode_num.to_string()),
            ("lastSelectMap", to_json_or_empty(&snapshot.last_select_map)),
            ("searchCache", to_json_or_empty(&snapshot.search_cache)),
            ("commentCache", to_json_or_empty(&snapshot.comment_cache)),
        ];

        for (key, value) in serialized {
            let hash = str_hash(&value);
            if self.last_hashes.lock().get(key) == Some(&hash) {
                continue;
            }

            let mut ok = false;
            if let Some(sql) = &tiers.sql {
                match sql.set_cache(key, &value).await {
                    Ok(()) => ok = true,
                    Err(e) => warn!(key, error = %e, "SQL write failed"),
                }
            }
            if let Some(kv) = &tiers.kv {
                match kv.set(key, &value).await {
                    Ok(()) => ok = true,
                    Err(e) => warn!(key, error = %e, "KV write failed"),
                }
            }
            if ok {
                self.last_hashes.lock().insert(key, hash);
            }
        }
    }

    /// Persist the config overlay after a patch.
    pub async fn persist_overlay(&self, overlay: &HashMap<String, String>) {
        let Some(tiers) = self.tiers.get() else {
            return;
        };

        if let Some(sql) = &tiers.sql {
            for (key, value) in overlay {
                if let Err(e) = sql.upsert_env_config(key, value).await {
                    warn!(key, error = %e, "Failed to persist config override to SQL");
                }
            }
        }
        if let Some(kv) = &tiers.kv {
            if let Ok(raw) = serde_json::to_string(overlay) {
                if let Err(e) = kv.set("env_configs", &raw).await {
                    warn!(error = %e, "Failed to persist config overlay to KV");
                }
            }
        }
    }
}

fn to_json_or_empty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn str_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[tokio::test]
    async fn test_memory_only_persist_is_noop() {
        let catalog = Arc::new(Catalog::new());
        let config = Arc::new(ConfigRegistry::new(Settings::default(), HashMap::new()));
        let storage = Arc::new(StorageService::new(catalog.clone(), config));

        storage.ensure_ready().await;
        catalog.add_episode("u", "t");
        // No tiers configured: persisting must not fail or block.
        storage.persist_now().await;
    }

    #[tokio::test]
    async fn test_ensure_ready_runs_once() {
        let catalog = Arc::new(Catalog::new());
        let config = Arc::new(ConfigRegistry::new(Settings::default(), HashMap::new()));
        let storage = Arc::new(StorageService::new(catalog, config));

        storage.ensure_ready().await;
        storage.ensure_ready().await;
        assert!(storage.tiers.get().is_some());
    }
}
