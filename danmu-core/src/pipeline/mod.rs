//! The comment post-processing pipeline.
//!
//! Raw comments go through a fixed sequence:
//! normalize → blocklist → time-window dedup → density downsample →
//! palette recolor → serialize. Every step is deterministic given the
//! configuration snapshot (the recolor palette pick is the one random
//! element, the white/palette split itself is not).

pub mod downsample;
pub mod emoji;
pub mod group;
pub mod parse;
pub mod recolor;
pub mod serialize;
pub mod simplified;

use regex::Regex;

use crate::config::{DerivedState, Settings};
use crate::models::Danmaku;

pub use parse::{danmaku_from_p, danmaku_from_value, normalize_text, parse_bili_xml};
pub use serialize::{to_json, to_xml};

/// Drop comments whose text matches any blocklist pattern.
pub fn apply_blocklist(comments: Vec<Danmaku>, patterns: &[Regex]) -> Vec<Danmaku> {
    if patterns.is_empty() {
        return comments;
    }
    comments
        .into_iter()
        .filter(|d| !patterns.iter().any(|re| re.is_match(&d.text)))
        .collect()
}

/// Run the full pipeline over raw comments from a source.
pub fn process(
    mut comments: Vec<Danmaku>,
    settings: &Settings,
    derived: &DerivedState,
) -> Vec<Danmaku> {
    for comment in &mut comments {
        comment.text = normalize_text(&comment.text);
        if settings.danmu_simplified {
            comment.text = simplified::to_simplified(&comment.text);
        }
    }
    comments.retain(|c| !c.text.is_empty());

    let mut comments = apply_blocklist(comments, &derived.blocked_words);

    comments = group::group_by_minute(comments, settings.group_minute);

    if settings.danmu_limit > 0 {
        comments = downsample::downsample(comments, settings.danmu_limit as usize);
    }

    if settings.convert_top_bottom_to_scroll {
        recolor::convert_to_scroll(&mut comments);
    }
    if (0.0..=100.0).contains(&settings.white_ratio) {
        recolor::recolor(&mut comments, settings.white_ratio, &derived.palette);
    }

    comments
}
