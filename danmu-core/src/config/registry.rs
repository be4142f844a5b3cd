//! Process-wide configuration registry.
//!
//! Readers take a cheap `Arc<Settings>` snapshot; the config endpoint applies
//! patches that swap in a new snapshot and rebuild derived state (compiled
//! regexes, palette) when their source strings actually changed.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::{info, warn};

use super::{parse_comma_list, split_blocked_words, Settings};

/// Soft-tone palette used when `DANMU_COLORS` is not configured.
const DEFAULT_PALETTE: [u32; 12] = [
    0xFFCCCC, 0xFFE5CC, 0xFFFFCC, 0xE5FFCC, 0xCCFFE5, 0xCCF2FF, 0xCCD9FF, 0xE5CCFF, 0xFFCCF2,
    0xFFD9CC, 0xD9FFCC, 0xCCFFFF,
];

/// State derived from string-valued options, rebuilt on change.
pub struct DerivedState {
    pub blocked_words: Vec<Regex>,
    pub episode_filter: Option<Regex>,
    pub palette: Vec<u32>,
    blocked_hash: u64,
    episode_filter_hash: u64,
    palette_hash: u64,
}

impl DerivedState {
    fn build(settings: &Settings) -> Self {
        Self {
            blocked_words: compile_blocked_words(&settings.blocked_words),
            episode_filter: compile_episode_filter(&settings.episode_title_filter),
            palette: parse_palette(&settings.danmu_colors),
            blocked_hash: str_hash(&settings.blocked_words),
            episode_filter_hash: str_hash(&settings.episode_title_filter),
            palette_hash: str_hash(&settings.danmu_colors),
        }
    }

    fn rebuild_from(&self, settings: &Settings) -> Self {
        let blocked_hash = str_hash(&settings.blocked_words);
        let episode_filter_hash = str_hash(&settings.episode_title_filter);
        let palette_hash = str_hash(&settings.danmu_colors);

        Self {
            blocked_words: if blocked_hash == self.blocked_hash {
                self.blocked_words.clone()
            } else {
                compile_blocked_words(&settings.blocked_words)
            },
            episode_filter: if episode_filter_hash == self.episode_filter_hash {
                self.episode_filter.clone()
            } else {
                compile_episode_filter(&settings.episode_title_filter)
            },
            palette: if palette_hash == self.palette_hash {
                self.palette.clone()
            } else {
                parse_palette(&settings.danmu_colors)
            },
            blocked_hash,
            episode_filter_hash,
            palette_hash,
        }
    }
}

pub struct ConfigRegistry {
    snapshot: RwLock<Arc<Settings>>,
    derived: RwLock<Arc<DerivedState>>,
    /// Accumulated key/value overrides from the config endpoint, persisted by
    /// the storage tier.
    overlay: RwLock<HashMap<String, String>>,
}

impl ConfigRegistry {
    pub fn new(settings: Settings, overlay: HashMap<String, String>) -> Self {
        let derived = DerivedState::build(&settings);
        Self {
            snapshot: RwLock::new(Arc::new(settings)),
            derived: RwLock::new(Arc::new(derived)),
            overlay: RwLock::new(overlay),
        }
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<Settings> {
        self.snapshot.read().clone()
    }

    /// Current derived state (compiled regexes, palette).
    pub fn derived(&self) -> Arc<DerivedState> {
        self.derived.read().clone()
    }

    /// Apply a config patch: merge the pairs into the overlay, rebuild the
    /// snapshot and any derived state whose source string changed. Returns
    /// the overlay to persist.
    pub fn apply_patch(&self, patch: &HashMap<String, String>) -> HashMap<String, String> {
        let mut settings = (*self.settings()).clone();
        {
            let mut overlay = self.overlay.write();
            for (key, value) in patch {
                settings.apply_kv(key, value);
                if let Some(canonical) = super::canonical_key(key) {
                    overlay.insert(canonical.to_string(), value.clone());
                }
            }
        }

        let rebuilt = self.derived.read().rebuild_from(&settings);
        *self.derived.write() = Arc::new(rebuilt);
        *self.snapshot.write() = Arc::new(settings);
        info!(keys = patch.len(), "Applied config patch");

        self.overlay.read().clone()
    }

    pub fn overlay(&self) -> HashMap<String, String> {
        self.overlay.read().clone()
    }
}

fn str_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn compile_blocked_words(raw: &str) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pattern in split_blocked_words(raw) {
        match Regex::new(&pattern) {
            Ok(re) => compiled.push(re),
            Err(e) => warn!(pattern, error = %e, "Dropping invalid blocked-words pattern"),
        }
    }
    compiled
}

fn compile_episode_filter(raw: &str) -> Option<Regex> {
    if raw.is_empty() {
        return None;
    }
    match Regex::new(raw) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = raw, error = %e, "Invalid EPISODE_TITLE_FILTER, filtering disabled");
            None
        }
    }
}

fn parse_palette(raw: &str) -> Vec<u32> {
    let mut palette = Vec::new();
    for item in parse_comma_list(raw) {
        let hex = item.trim_start_matches('#');
        match u32::from_str_radix(hex, 16) {
            Ok(color) => palette.push(color & 0x00FF_FFFF),
            Err(_) => warn!(color = item, "Dropping invalid DANMU_COLORS entry"),
        }
    }
    if palette.is_empty() {
        palette = DEFAULT_PALETTE.to_vec();
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blocklist_compiles() {
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let derived = registry.derived();
        assert_eq!(derived.blocked_words.len(), 1);
        assert!(derived.blocked_words[0].is_match(&"a".repeat(30)));
        assert!(!derived.blocked_words[0].is_match("short"));
    }

    #[test]
    fn test_invalid_pattern_dropped_others_kept() {
        let mut settings = Settings::default();
        settings.blocked_words = "/^.{25,}$/,/[unclosed/,/spam/".to_string();
        let registry = ConfigRegistry::new(settings, HashMap::new());
        assert_eq!(registry.derived().blocked_words.len(), 2);
    }

    #[test]
    fn test_patch_swaps_snapshot_and_derived() {
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let mut patch = HashMap::new();
        patch.insert("BLOCKED_WORDS".to_string(), "/hello/".to_string());
        patch.insert("danmuLimit".to_string(), "200".to_string());
        let overlay = registry.apply_patch(&patch);

        assert_eq!(registry.settings().danmu_limit, 200);
        assert!(registry.derived().blocked_words[0].is_match("oh hello there"));
        assert_eq!(overlay.get("DANMU_LIMIT").map(String::as_str), Some("200"));
    }

    #[test]
    fn test_custom_palette() {
        let mut settings = Settings::default();
        settings.danmu_colors = "#FF0000,00FF00,bogus".to_string();
        let registry = ConfigRegistry::new(settings, HashMap::new());
        assert_eq!(registry.derived().palette, vec![0xFF0000, 0x00FF00]);
    }

    #[test]
    fn test_unchanged_derived_not_recompiled() {
        let registry = ConfigRegistry::new(Settings::default(), HashMap::new());
        let before = registry.derived();
        let mut patch = HashMap::new();
        patch.insert("DANMU_LIMIT".to_string(), "100".to_string());
        registry.apply_patch(&patch);
        let after = registry.derived();
        assert_eq!(before.blocked_words.len(), after.blocked_words.len());
    }
}
