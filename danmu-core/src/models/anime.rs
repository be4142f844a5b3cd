use serde::{Deserialize, Serialize};

/// Coarse media category as exposed to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Drama,
    Movie,
    Variety,
    Anime,
    Other,
}

impl MediaType {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "drama" | "tv" | "tvseries" | "电视剧" => Self::Drama,
            "movie" | "film" | "电影" => Self::Movie,
            "variety" | "zongyi" | "综艺" => Self::Variety,
            "anime" | "cartoon" | "动漫" | "动画" => Self::Anime,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drama => "drama",
            Self::Movie => "movie",
            Self::Variety => "variety",
            Self::Anime => "anime",
            Self::Other => "other",
        }
    }

    /// Whether this category counts as a theatrical release for movie matching.
    pub fn is_movie(&self) -> bool {
        matches!(self, Self::Movie)
    }
}

/// Derive the stable 32-bit anime id from a source-native string id.
///
/// Plain byte sum: stable across restarts and cheap enough to recompute on
/// every response. Collisions between sources are tolerated because the id
/// only needs to be stable, not globally unique.
pub fn ascii_sum(s: &str) -> u32 {
    s.bytes().map(u32::from).sum()
}

/// One playable video inside an [`Anime`].
///
/// `id` is the integer players call back with; it is assigned once per unique
/// `url` and never changes for the lifetime of the process (and survives
/// restarts through the persistence tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: u32,
    pub url: String,
    pub title: String,
}

/// One title from one upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anime {
    pub anime_id: u32,
    pub bangumi_id: String,
    pub anime_title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub type_description: String,
    pub image_url: String,
    pub start_date: String,
    pub episode_count: usize,
    pub rating: f64,
    pub is_favorited: bool,
    pub source: String,
    pub links: Vec<Episode>,
}

impl Anime {
    /// Build the display title `"<title>(<year>)【<type>】from <source>"`.
    pub fn display_title(title: &str, year: Option<u32>, media_type: MediaType, source: &str) -> String {
        let year = year.map(|y| y.to_string()).unwrap_or_default();
        format!("{title}({year})【{}】from {source}", media_type.as_str())
    }

    /// The title with any trailing parenthesized segments removed, used for
    /// query comparison.
    pub fn title_without_parens(&self) -> &str {
        let t = self.anime_title.as_str();
        match t.find(['(', '（']) {
            Some(idx) => t[..idx].trim_end(),
            None => t,
        }
    }
}
