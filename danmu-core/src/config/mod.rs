//! Runtime configuration.
//!
//! Options are merged from three layers, lowest precedence first: an optional
//! YAML file (path in `DANMU_CONFIG`), process environment, and the persisted
//! overlay written by the config endpoint. Every option has a canonical
//! UPPER_SNAKE name plus a camelCase alias.

mod registry;

pub use registry::{ConfigRegistry, DerivedState};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const DEFAULT_TOKEN: &str = "87654321";
pub const DEFAULT_SOURCE_ORDER: [&str; 4] = ["360", "vod", "renren", "hanjutv"];

/// Sources the orchestrator knows about; anything else in `SOURCE_ORDER` is
/// dropped at parse time.
pub const KNOWN_SOURCES: [&str; 12] = [
    "360", "vod", "tmdb", "douban", "tencent", "youku", "iqiyi", "imgo", "bilibili", "renren",
    "hanjutv", "bahamut",
];

/// Default episode-title noise filter, applied when `ENABLE_EPISODE_FILTER`
/// is on and `EPISODE_TITLE_FILTER` is not overridden.
pub const DEFAULT_EPISODE_TITLE_FILTER: &str =
    "预告|彩蛋|专访|幕后|花絮|特辑|纪录片|解说|影评|看点|速看|解读|盘点|片花|精华版|抢先看|路透|周边|首映礼|发布会";

/// Default blocklist: a single max-length rule.
pub const DEFAULT_BLOCKED_WORDS: &str = "/^.{25,}$/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VodReturnMode {
    All,
    Fastest,
}

/// One entry parsed out of the `VOD_SERVERS` list (`name@url,...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VodServer {
    pub name: String,
    pub url: String,
}

/// Immutable configuration snapshot. Readers hold an `Arc<Settings>`; config
/// patches swap in a whole new snapshot through [`ConfigRegistry`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub token: String,
    pub source_order: Vec<String>,
    pub platform_order: Vec<String>,
    pub vod_servers_raw: String,
    pub vod_return_mode: VodReturnMode,
    pub vod_request_timeout_ms: u64,
    pub bilibili_cookie: String,
    pub tmdb_api_key: String,
    pub title_to_chinese: bool,
    pub strict_title_match: bool,
    pub enable_episode_filter: bool,
    pub episode_title_filter: String,
    pub convert_top_bottom_to_scroll: bool,
    pub danmu_simplified: bool,
    pub remember_last_select: bool,
    pub danmu_output_format: OutputFormat,
    pub danmu_limit: i64,
    pub blocked_words: String,
    pub group_minute: u32,
    pub white_ratio: f64,
    pub danmu_colors: String,
    pub danmu_font_size: u32,
    pub youku_concurrency: usize,
    pub search_cache_minutes: i64,
    pub comment_cache_minutes: i64,
    pub max_last_select_map: usize,
    pub rate_limit_max_requests: u32,
    pub database_url: String,
    pub database_auth_token: String,
    pub redis_url: String,
    pub upstash_redis_rest_url: String,
    pub upstash_redis_rest_token: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN.to_string(),
            source_order: DEFAULT_SOURCE_ORDER.iter().map(|s| s.to_string()).collect(),
            platform_order: Vec::new(),
            vod_servers_raw: String::new(),
            vod_return_mode: VodReturnMode::All,
            vod_request_timeout_ms: 10_000,
            bilibili_cookie: String::new(),
            tmdb_api_key: String::new(),
            title_to_chinese: false,
            strict_title_match: false,
            enable_episode_filter: false,
            episode_title_filter: DEFAULT_EPISODE_TITLE_FILTER.to_string(),
            convert_top_bottom_to_scroll: false,
            danmu_simplified: false,
            remember_last_select: true,
            danmu_output_format: OutputFormat::Json,
            danmu_limit: -1,
            blocked_words: DEFAULT_BLOCKED_WORDS.to_string(),
            group_minute: 0,
            white_ratio: -1.0,
            danmu_colors: String::new(),
            danmu_font_size: 25,
            youku_concurrency: 8,
            search_cache_minutes: 1,
            comment_cache_minutes: 1,
            max_last_select_map: 1000,
            rate_limit_max_requests: 0,
            database_url: String::new(),
            database_auth_token: String::new(),
            redis_url: String::new(),
            upstash_redis_rest_url: String::new(),
            upstash_redis_rest_token: String::new(),
            host: "0.0.0.0".to_string(),
            port: 9321,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("token", &"<redacted>")
            .field("source_order", &self.source_order)
            .field("platform_order", &self.platform_order)
            .field("vod_return_mode", &self.vod_return_mode)
            .field("danmu_output_format", &self.danmu_output_format)
            .field("danmu_limit", &self.danmu_limit)
            .field("group_minute", &self.group_minute)
            .field("white_ratio", &self.white_ratio)
            .field("database_url", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Load from YAML file (optional) + environment + persisted overlay.
    pub fn load(overlay: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();

        if let Ok(path) = std::env::var("DANMU_CONFIG") {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_yaml::from_str::<HashMap<String, serde_yaml::Value>>(&raw) {
                    Ok(map) => {
                        for (key, value) in map {
                            let value = yaml_scalar_to_string(&value);
                            settings.apply_kv(&key, &value);
                        }
                    }
                    Err(e) => warn!(path, error = %e, "Failed to parse config file"),
                },
                Err(e) => warn!(path, error = %e, "Failed to read config file"),
            }
        }

        for (key, value) in std::env::vars() {
            if canonical_key(&key).is_some() {
                settings.apply_kv(&key, &value);
            }
        }

        for (key, value) in overlay {
            settings.apply_kv(key, value);
        }

        settings
    }

    /// Apply one `key=value` pair. Unknown keys are ignored; unparseable
    /// values are logged and dropped, leaving the previous value intact.
    pub fn apply_kv(&mut self, key: &str, value: &str) {
        let Some(canonical) = canonical_key(key) else {
            debug!(key, "Ignoring unrecognized config key");
            return;
        };
        let value = value.trim();

        match canonical {
            "TOKEN" => {
                if !value.is_empty() {
                    self.token = value.to_string();
                }
            }
            "SOURCE_ORDER" => self.source_order = parse_source_order(value),
            "PLATFORM_ORDER" => self.platform_order = parse_comma_list(value),
            "VOD_SERVERS" => self.vod_servers_raw = value.to_string(),
            "VOD_RETURN_MODE" => match value.to_lowercase().as_str() {
                "fastest" => self.vod_return_mode = VodReturnMode::Fastest,
                "all" => self.vod_return_mode = VodReturnMode::All,
                other => warn!(value = other, "Invalid VOD_RETURN_MODE, keeping previous"),
            },
            "VOD_REQUEST_TIMEOUT" => apply_parsed(value, canonical, &mut self.vod_request_timeout_ms),
            "BILIBILI_COOKIE" => self.bilibili_cookie = value.to_string(),
            "TMDB_API_KEY" => self.tmdb_api_key = value.to_string(),
            "TITLE_TO_CHINESE" => self.title_to_chinese = parse_bool(value),
            "STRICT_TITLE_MATCH" => self.strict_title_match = parse_bool(value),
            "ENABLE_EPISODE_FILTER" => self.enable_episode_filter = parse_bool(value),
            "EPISODE_TITLE_FILTER" => {
                if !value.is_empty() {
                    self.episode_title_filter = value.to_string();
                }
            }
            "CONVERT_TOP_BOTTOM_TO_SCROLL" => self.convert_top_bottom_to_scroll = parse_bool(value),
            "DANMU_SIMPLIFIED" => self.danmu_simplified = parse_bool(value),
            "REMEMBER_LAST_SELECT" => self.remember_last_select = parse_bool(value),
            "DANMU_OUTPUT_FORMAT" => match value.to_lowercase().as_str() {
                "xml" => self.danmu_output_format = OutputFormat::Xml,
                "json" => self.danmu_output_format = OutputFormat::Json,
                other => warn!(value = other, "Invalid DANMU_OUTPUT_FORMAT, keeping previous"),
            },
            "DANMU_LIMIT" => apply_parsed(value, canonical, &mut self.danmu_limit),
            "BLOCKED_WORDS" => self.blocked_words = value.to_string(),
            "GROUP_MINUTE" => apply_parsed(value, canonical, &mut self.group_minute),
            "WHITE_RATIO" => match value.parse::<f64>() {
                Ok(r) if (-1.0..=100.0).contains(&r) => self.white_ratio = r,
                _ => warn!(value, "WHITE_RATIO must be in [-1, 100], keeping previous"),
            },
            "DANMU_COLORS" => self.danmu_colors = value.to_string(),
            "DANMU_FONT_SIZE" => apply_parsed(value, canonical, &mut self.danmu_font_size),
            "YOUKU_CONCURRENCY" => match value.parse::<usize>() {
                Ok(n) => self.youku_concurrency = n.clamp(1, 16),
                Err(_) => warn!(value, "Invalid YOUKU_CONCURRENCY, keeping previous"),
            },
            "SEARCH_CACHE_MINUTES" => apply_parsed(value, canonical, &mut self.search_cache_minutes),
            "COMMENT_CACHE_MINUTES" => apply_parsed(value, canonical, &mut self.comment_cache_minutes),
            "MAX_LAST_SELECT_MAP" => apply_parsed(value, canonical, &mut self.max_last_select_map),
            "RATE_LIMIT_MAX_REQUESTS" => apply_parsed(value, canonical, &mut self.rate_limit_max_requests),
            "DATABASE_URL" => self.database_url = value.to_string(),
            // Recognized for compatibility with hosted-SQL deployments of the
            // predecessor; the sqlx tier authenticates through DATABASE_URL.
            "DATABASE_AUTH_TOKEN" => self.database_auth_token = value.to_string(),
            "REDIS_URL" => self.redis_url = value.to_string(),
            "UPSTASH_REDIS_REST_URL" => self.upstash_redis_rest_url = value.to_string(),
            "UPSTASH_REDIS_REST_TOKEN" => self.upstash_redis_rest_token = value.to_string(),
            "HOST" => self.host = value.to_string(),
            "PORT" => apply_parsed(value, canonical, &mut self.port),
            "LOG_LEVEL" => self.log_level = value.to_string(),
            "LOG_FORMAT" => self.log_format = value.to_string(),
            other => debug!(key = other, "Config key recognized but not handled"),
        }
    }

    /// Whether the token prefix is optional (stock token).
    pub fn token_is_default(&self) -> bool {
        self.token == DEFAULT_TOKEN
    }

    /// Parsed `VOD_SERVERS`; entries without a name get `vod-<N>`.
    pub fn vod_servers(&self) -> Vec<VodServer> {
        parse_vod_servers(&self.vod_servers_raw)
    }

    pub fn search_cache_ttl_secs(&self) -> i64 {
        self.search_cache_minutes.max(0) * 60
    }

    pub fn comment_cache_ttl_secs(&self) -> i64 {
        self.comment_cache_minutes.max(0) * 60
    }
}

fn apply_parsed<T: std::str::FromStr>(value: &str, key: &str, slot: &mut T) {
    match value.parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value, "Invalid numeric config value, keeping previous"),
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

pub fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

pub fn parse_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `SOURCE_ORDER`: unknown names are dropped, an empty result falls
/// back to the default order.
pub fn parse_source_order(value: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for name in parse_comma_list(&value.to_lowercase()) {
        if !KNOWN_SOURCES.contains(&name.as_str()) {
            warn!(source = name, "Dropping unknown source from SOURCE_ORDER");
            continue;
        }
        if !order.contains(&name) {
            order.push(name);
        }
    }
    if order.is_empty() {
        order = DEFAULT_SOURCE_ORDER.iter().map(|s| s.to_string()).collect();
    }
    order
}

/// Parse the `name1@url1,name2@url2` server list. A bare URL gets the
/// generated name `vod-<N>`.
pub fn parse_vod_servers(raw: &str) -> Vec<VodServer> {
    let mut servers = Vec::new();
    for (i, item) in parse_comma_list(raw).into_iter().enumerate() {
        let (name, url) = match item.split_once('@') {
            Some((name, url)) if !name.is_empty() => (name.to_string(), url.to_string()),
            Some((_, url)) => (format!("vod-{}", i + 1), url.to_string()),
            None => (format!("vod-{}", i + 1), item),
        };
        let url = url.trim_end_matches('/').to_string();
        if url.is_empty() {
            continue;
        }
        servers.push(VodServer { name, url });
    }
    servers
}

/// Split a `BLOCKED_WORDS` value into individual patterns. Items are
/// `/slash/`-delimited regexes separated by commas; commas inside a slash
/// pair belong to the pattern (`/^.{25,}$/`). Bare words become literal
/// matches.
pub fn split_blocked_words(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for fragment in raw.split(',') {
        if pending.is_empty() {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            if fragment.starts_with('/') && !(fragment.len() > 1 && fragment.ends_with('/')) {
                pending = fragment.to_string();
            } else {
                out.push(strip_slashes(fragment));
            }
        } else {
            pending.push(',');
            pending.push_str(fragment);
            if fragment.trim_end().ends_with('/') {
                out.push(strip_slashes(pending.trim()));
                pending.clear();
            }
        }
    }
    if !pending.is_empty() {
        // Unterminated slash item: treat what we have as a pattern anyway.
        out.push(strip_slashes(&pending));
    }
    out
}

fn strip_slashes(item: &str) -> String {
    if item.len() > 1 && item.starts_with('/') && item.ends_with('/') {
        item[1..item.len() - 1].to_string()
    } else {
        regex::escape(item)
    }
}

/// Resolve a config key (canonical or camelCase alias) to its canonical name.
pub fn canonical_key(key: &str) -> Option<&'static str> {
    const KEYS: [(&str, &str); 35] = [
        ("TOKEN", "token"),
        ("SOURCE_ORDER", "sourceOrder"),
        ("PLATFORM_ORDER", "platformOrder"),
        ("VOD_SERVERS", "vodServers"),
        ("VOD_RETURN_MODE", "vodReturnMode"),
        ("VOD_REQUEST_TIMEOUT", "vodRequestTimeout"),
        ("BILIBILI_COOKIE", "bilibiliCookie"),
        ("TMDB_API_KEY", "tmdbApiKey"),
        ("TITLE_TO_CHINESE", "titleToChinese"),
        ("STRICT_TITLE_MATCH", "strictTitleMatch"),
        ("ENABLE_EPISODE_FILTER", "enableEpisodeFilter"),
        ("EPISODE_TITLE_FILTER", "episodeTitleFilter"),
        ("CONVERT_TOP_BOTTOM_TO_SCROLL", "convertTopBottomToScroll"),
        ("DANMU_SIMPLIFIED", "danmuSimplified"),
        ("REMEMBER_LAST_SELECT", "rememberLastSelect"),
        ("DANMU_OUTPUT_FORMAT", "danmuOutputFormat"),
        ("DANMU_LIMIT", "danmuLimit"),
        ("BLOCKED_WORDS", "blockedWords"),
        ("GROUP_MINUTE", "groupMinute"),
        ("WHITE_RATIO", "whiteRatio"),
        ("DANMU_COLORS", "danmuColors"),
        ("DANMU_FONT_SIZE", "danmuFontSize"),
        ("YOUKU_CONCURRENCY", "youkuConcurrency"),
        ("SEARCH_CACHE_MINUTES", "searchCacheMinutes"),
        ("COMMENT_CACHE_MINUTES", "commentCacheMinutes"),
        ("MAX_LAST_SELECT_MAP", "maxLastSelectMap"),
        ("RATE_LIMIT_MAX_REQUESTS", "rateLimitMaxRequests"),
        ("DATABASE_URL", "databaseUrl"),
        ("DATABASE_AUTH_TOKEN", "databaseAuthToken"),
        ("REDIS_URL", "redisUrl"),
        ("UPSTASH_REDIS_REST_URL", "upstashRedisRestUrl"),
        ("UPSTASH_REDIS_REST_TOKEN", "upstashRedisRestToken"),
        ("HOST", "host"),
        ("PORT", "port"),
        ("LOG_LEVEL", "logLevel"),
    ];
    // LOG_FORMAT intentionally has no camelCase alias; it predates the alias
    // scheme and is only ever set from the environment.
    if key == "LOG_FORMAT" {
        return Some("LOG_FORMAT");
    }
    KEYS.iter()
        .find(|(canonical, alias)| *canonical == key || *alias == key)
        .map(|(canonical, _)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.token, "87654321");
        assert!(s.token_is_default());
        assert_eq!(s.danmu_limit, -1);
        assert_eq!(s.youku_concurrency, 8);
        assert_eq!(s.source_order, vec!["360", "vod", "renren", "hanjutv"]);
    }

    #[test]
    fn test_alias_keys() {
        let mut s = Settings::default();
        s.apply_kv("danmuLimit", "500");
        s.apply_kv("GROUP_MINUTE", "2");
        s.apply_kv("strictTitleMatch", "true");
        assert_eq!(s.danmu_limit, 500);
        assert_eq!(s.group_minute, 2);
        assert!(s.strict_title_match);
    }

    #[test]
    fn test_invalid_value_keeps_previous() {
        let mut s = Settings::default();
        s.apply_kv("DANMU_LIMIT", "not-a-number");
        assert_eq!(s.danmu_limit, -1);
        s.apply_kv("WHITE_RATIO", "250");
        assert_eq!(s.white_ratio, -1.0);
    }

    #[test]
    fn test_source_order_whitelist() {
        assert_eq!(
            parse_source_order("tencent,unknown,bilibili,tencent"),
            vec!["tencent", "bilibili"]
        );
        assert_eq!(
            parse_source_order("nothing,real"),
            vec!["360", "vod", "renren", "hanjutv"]
        );
    }

    #[test]
    fn test_vod_servers_parsing() {
        let servers = parse_vod_servers("main@https://vod.example.com/,https://other.example.com");
        assert_eq!(
            servers,
            vec![
                VodServer {
                    name: "main".into(),
                    url: "https://vod.example.com".into()
                },
                VodServer {
                    name: "vod-2".into(),
                    url: "https://other.example.com".into()
                },
            ]
        );
    }

    #[test]
    fn test_blocked_words_split_keeps_commas_in_patterns() {
        let items = split_blocked_words("/^.{25,}$/,/spam/,word");
        assert_eq!(items, vec!["^.{25,}$", "spam", "word"]);
    }

    #[test]
    fn test_youku_concurrency_clamped() {
        let mut s = Settings::default();
        s.apply_kv("YOUKU_CONCURRENCY", "99");
        assert_eq!(s.youku_concurrency, 16);
        s.apply_kv("YOUKU_CONCURRENCY", "0");
        assert_eq!(s.youku_concurrency, 1);
    }
}
