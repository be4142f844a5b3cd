//! Filename parsing for the match endpoint.
//!
//! Turns a player-supplied file name into a clean title plus optional
//! season/episode numbers and an optional preferred platform tag.

use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::unwrap_used)]
mod res {
    use super::{Lazy, Regex};

    pub static PLATFORM_TAG: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\[([a-zA-Z0-9]+)\]").unwrap());
    pub static SEASON_EPISODE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)[\s._\-\[]*S(\d{1,2})\s*E(\d{1,4})").unwrap());
    pub static TECH_TOKEN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)2160p|1080p|720p|H265|H264|x26[45]|WEB|BluRay|HDTV|DVDRip").unwrap()
    });
    pub static DOT_YEAR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\.((19|20)\d{2})(\.|$)").unwrap());
    pub static TRAILING_YEAR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[.\s(（]((19|20)\d{2})[)）]?$").unwrap());
    pub static YEAR_OR_RES: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)(19|20)\d{2}|2160p|1080p|720p").unwrap());
    pub static CJK_RUN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"^[\p{Han}A-Za-z0-9'"!?\-·：:、 ]+"#).unwrap());
    pub static CJK_ANYWHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Han}+").unwrap());
}

/// What a file name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Platform tag like `[tencent]` embedded in the name.
    pub platform: Option<String>,
}

impl ParsedFileName {
    pub fn is_movie(&self) -> bool {
        self.season.is_none() && self.episode.is_none()
    }
}

/// Parse a file name. `known_platforms` scopes which bracket tags count as a
/// platform preference; anything else stays part of the title.
pub fn parse_file_name(file_name: &str, known_platforms: &[&str]) -> ParsedFileName {
    let mut name = file_name.trim().to_string();

    // 1. Preferred platform tag.
    let mut platform = None;
    if let Some(caps) = res::PLATFORM_TAG.captures(&name) {
        let tag = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        if known_platforms.contains(&tag.as_str()) {
            platform = Some(tag);
            let full = caps.get(0).map_or("", |m| m.as_str()).to_string();
            name = name.replacen(&full, "", 1).trim().to_string();
        }
    }

    name = strip_extension(&name);

    // 2. Series marker.
    let (mut season, mut episode) = (None, None);
    if let Some(caps) = res::SEASON_EPISODE.captures(&name) {
        season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let start = caps.get(0).map_or(0, |m| m.start());
        name.truncate(start);
    }

    let title = extract_title(&name);
    ParsedFileName {
        title,
        season,
        episode,
        platform,
    }
}

fn strip_extension(name: &str) -> String {
    const EXTENSIONS: [&str; 8] = ["mkv", "mp4", "avi", "ts", "flv", "rmvb", "wmv", "mov"];
    if let Some((stem, ext)) = name.rsplit_once('.') {
        if EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return stem.to_string();
        }
    }
    name.to_string()
}

/// The three title heuristics, in order: CJK-leading, Latin-leading, mixed.
fn extract_title(name: &str) -> String {
    let name = name.trim();
    let Some(first) = name.chars().next() else {
        return String::new();
    };

    let mut title = if is_han(first) {
        // Leading CJK run with embedded Latin/digits/punctuation, cut at the
        // first technical token.
        let cut = res::TECH_TOKEN
            .find(name)
            .map_or(name.len(), |m| m.start());
        let head = &name[..cut];
        res::CJK_RUN
            .find(head)
            .map_or(head, |m| m.as_str())
            .trim_matches(['.', '_', '-', ' '])
            .to_string()
    } else if first.is_ascii_alphabetic() {
        // Up to the first `.YYYY` marker, dots and underscores as spaces.
        let cut = res::DOT_YEAR.find(name).map_or(name.len(), |m| m.start());
        name[..cut].replace(['.', '_'], " ").trim().to_string()
    } else {
        // Take everything before the first year/resolution, then prefer any
        // leading CJK substring.
        let cut = res::YEAR_OR_RES
            .find(name)
            .map_or(name.len(), |m| m.start());
        let head = name[..cut].trim_matches(['.', '_', '-', '[', ']', ' ']);
        match res::CJK_ANYWHERE.find(head) {
            Some(m) => m.as_str().to_string(),
            None => head.replace(['.', '_'], " ").trim().to_string(),
        }
    };

    if let Some(m) = res::TRAILING_YEAR.find(&title) {
        title.truncate(m.start());
    }
    collapse_spaces(&title)
}

fn is_han(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

/// Collapse runs of whitespace to single spaces.
pub fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_for_match(s: &str) -> String {
    collapse_spaces(&s.to_lowercase())
}

/// Map a Chinese numeral (一 through 十二) to its value.
pub fn chinese_numeral(s: &str) -> Option<u32> {
    match s {
        "一" => Some(1),
        "二" => Some(2),
        "三" => Some(3),
        "四" => Some(4),
        "五" => Some(5),
        "六" => Some(6),
        "七" => Some(7),
        "八" => Some(8),
        "九" => Some(9),
        "十" => Some(10),
        "十一" => Some(11),
        "十二" => Some(12),
        _ => None,
    }
}

/// Parse a season residue: a bare digit run, a Chinese numeral, or a
/// `第N季`-style wrapper around either.
pub fn parse_season_token(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s
        .strip_prefix('第')
        .map_or(s, |rest| rest.strip_suffix('季').unwrap_or(rest));
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok();
    }
    chinese_numeral(s)
}

/// Whether an anime title matches a query under the configured mode.
///
/// Titles and queries are whitespace-collapsed and case-folded first. A
/// residue after the query that names the requested season also matches
/// (`亲爱的X 2` for query `亲爱的X` season 2).
pub fn title_matches(title: &str, query: &str, season: Option<u32>, strict: bool) -> bool {
    let t = normalize_for_match(title);
    let q = normalize_for_match(query);
    if q.is_empty() {
        return false;
    }
    if t == q {
        return true;
    }

    if let Some(rest) = t.strip_prefix(&q) {
        if strict {
            return true;
        }
        if let (Some(season), Some(parsed)) = (season, parse_season_token(rest)) {
            if parsed == season {
                return true;
            }
        }
    }

    !strict && t.contains(&q)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLATFORMS: [&str; 5] = ["tencent", "iqiyi", "youku", "bilibili", "imgo"];

    #[test]
    fn test_movie_file_name() {
        let parsed = parse_file_name("Blood.River.2023.1080p.BluRay.x264.mkv", &PLATFORMS);
        assert_eq!(parsed.title, "Blood River");
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.episode, None);
        assert!(parsed.is_movie());
    }

    #[test]
    fn test_cjk_series_file_name() {
        let parsed = parse_file_name("亲爱的X.S02E07.2160p.WEB-DL.mkv", &PLATFORMS);
        assert_eq!(parsed.title, "亲爱的X");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, Some(7));
    }

    #[test]
    fn test_platform_tag_extracted() {
        let parsed = parse_file_name("[tencent]长安三万里.2023.4K.mkv", &PLATFORMS);
        assert_eq!(parsed.platform.as_deref(), Some("tencent"));
        assert_eq!(parsed.title, "长安三万里");
    }

    #[test]
    fn test_unknown_tag_left_alone() {
        let parsed = parse_file_name("[某字幕组]某剧.S01E01.mkv", &PLATFORMS);
        assert_eq!(parsed.platform, None);
        assert_eq!(parsed.episode, Some(1));
    }

    #[test]
    fn test_cjk_title_with_embedded_latin() {
        let parsed = parse_file_name("灌篮高手SLAM DUNK.1080p.mkv", &PLATFORMS);
        assert_eq!(parsed.title, "灌篮高手SLAM DUNK");
    }

    #[test]
    fn test_trailing_year_stripped() {
        let parsed = parse_file_name("流浪地球2.2023.mkv", &PLATFORMS);
        assert_eq!(parsed.title, "流浪地球2");
    }

    #[test]
    fn test_chinese_numerals() {
        assert_eq!(chinese_numeral("三"), Some(3));
        assert_eq!(chinese_numeral("十二"), Some(12));
        assert_eq!(chinese_numeral("百"), None);
        assert_eq!(parse_season_token("第2季"), Some(2));
        assert_eq!(parse_season_token("二"), Some(2));
        assert_eq!(parse_season_token("abc"), None);
    }

    #[test]
    fn test_title_matching_modes() {
        assert!(title_matches("亲爱的X", "亲爱的X", None, true));
        assert!(title_matches("亲爱的X 2", "亲爱的X", Some(2), false));
        // Strict mode is a starts-with match, so extra seasons still pass.
        assert!(title_matches("亲爱的X 3", "亲爱的X", Some(2), true));
        assert!(title_matches("某某亲爱的X篇", "亲爱的X", None, false));
        assert!(!title_matches("某某亲爱的X篇", "亲爱的X", None, true));
        assert!(title_matches("Arcane  Season", "arcane", None, true));
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(collapse_spaces("  a   b  "), "a b");
    }
}
