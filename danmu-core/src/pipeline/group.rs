//! Time-window deduplication.
//!
//! Identical texts inside one window collapse to a single comment at the
//! earliest offset, annotated `"<text> x N"`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Danmaku;

static COUNT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s[xX]\s?(\d+)$").expect("invalid count-suffix regex"));

/// Strip a trailing `" xN"` marker, returning the bare text and the count it
/// carried.
fn split_count_suffix(text: &str) -> (&str, u64) {
    match COUNT_SUFFIX.captures(text) {
        Some(caps) => {
            let count = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            let end = text.len() - caps.get(0).map_or(0, |m| m.as_str().len());
            (&text[..end], count)
        }
        None => (text, 1),
    }
}

/// Collapse duplicate texts within `window_minutes`-sized buckets. A zero
/// window bypasses grouping entirely (the list is still time-sorted).
pub fn group_by_minute(mut comments: Vec<Danmaku>, window_minutes: u32) -> Vec<Danmaku> {
    comments.sort_by(|a, b| a.time.total_cmp(&b.time));
    if window_minutes == 0 || comments.is_empty() {
        return comments;
    }

    let window_secs = f64::from(window_minutes) * 60.0;
    let mut order: Vec<(i64, String)> = Vec::new();
    let mut groups: HashMap<(i64, String), (Danmaku, u64)> = HashMap::new();

    for comment in comments {
        let bucket = (comment.time / window_secs).floor() as i64;
        let (bare, count) = split_count_suffix(&comment.text);
        let key = (bucket, bare.to_string());

        match groups.get_mut(&key) {
            Some((first, total)) => {
                *total += count;
                if comment.time < first.time {
                    first.time = comment.time;
                }
            }
            None => {
                let mut first = comment.clone();
                first.text = bare.to_string();
                order.push(key.clone());
                groups.insert(key, (first, count));
            }
        }
    }

    let mut out: Vec<Danmaku> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|(mut d, count)| {
            if count > 1 {
                d.text = format!("{} x {}", d.text, count);
            }
            d
        })
        .collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}
