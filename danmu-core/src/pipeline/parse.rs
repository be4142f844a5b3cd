//! Raw comment normalization.
//!
//! Sources hand the pipeline whatever their API returned: Bilibili-style XML
//! documents, legacy 4-field `p` strings, or one of two JSON object shapes.
//! Everything is funneled into [`Danmaku`].

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use crate::models::{Danmaku, DanmakuMode, WHITE};
use crate::{Error, Result};

/// Decode HTML numeric entities plus the named basics.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|&i| i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

/// Full text normalization: entity decode then emoji shortcode replacement.
pub fn normalize_text(text: &str) -> String {
    super::emoji::replace_shortcodes(&decode_entities(text.trim()))
        .trim()
        .to_string()
}

/// Parse a `p` attribute paired with its comment body.
///
/// Understands both the Bilibili 8-field layout
/// (`t,mode,size,color,ts,pool,userHash,id`) and the legacy 4-field layout
/// (`t,mode,color,source`).
pub fn danmaku_from_p(p: &str, text: &str, platform: &str) -> Option<Danmaku> {
    let fields: Vec<&str> = p.split(',').collect();
    if fields.len() < 3 {
        return None;
    }
    let time: f64 = fields[0].trim().parse().ok()?;
    let mode_raw: i64 = fields[1].trim().parse().unwrap_or(1);

    let color = if fields.len() >= 8 {
        // 8-field layout: color sits after the font size.
        fields[3].trim().parse().unwrap_or(WHITE)
    } else {
        fields[2].trim().parse().unwrap_or(WHITE)
    };

    let platform = if fields.len() == 4 {
        let tag = fields[3].trim().trim_matches(&['[', ']'][..]);
        if tag.is_empty() { platform } else { tag }
    } else {
        platform
    };

    Some(
        Danmaku::new(time.max(0.0), DanmakuMode::from_raw(mode_raw), color, text)
            .with_platform(platform),
    )
}

/// Parse a Bilibili-compatible XML danmaku document.
pub fn parse_bili_xml(xml: &str, platform: &str) -> Result<Vec<Danmaku>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut pending_p: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"d" => {
                pending_p = e
                    .try_get_attribute("p")
                    .ok()
                    .flatten()
                    .and_then(|a| a.unescape_value().ok())
                    .map(|v| v.into_owned());
            }
            Ok(Event::Text(t)) => {
                if let Some(p) = pending_p.take() {
                    let text = t.unescape().map(|c| c.into_owned()).unwrap_or_default();
                    if let Some(d) = danmaku_from_p(&p, &text, platform) {
                        out.push(d);
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"d" => {
                pending_p = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Upstream(format!("bad danmaku xml: {e}"))),
        }
    }
    Ok(out)
}

/// Parse one JSON item in any of the supported object shapes.
pub fn danmaku_from_value(item: &Value, platform: &str) -> Option<Danmaku> {
    // Shape 1: {p: "...", m: "..."}
    if let (Some(p), Some(m)) = (item.get("p").and_then(Value::as_str), item.get("m").and_then(Value::as_str)) {
        return danmaku_from_p(p, m, platform);
    }

    // Shape 2: {timepoint|ct, color, content}
    if let Some(text) = item.get("content").and_then(Value::as_str) {
        let time = item
            .get("timepoint")
            .or_else(|| item.get("ct"))
            .and_then(value_as_f64);
        if let Some(time) = time {
            let color = item.get("color").and_then(value_as_color).unwrap_or(WHITE);
            return Some(
                Danmaku::new(time.max(0.0), DanmakuMode::Scroll, color, text).with_platform(platform),
            );
        }

        // Shape 3: {progress (ms), mode, content}
        if let Some(progress) = item.get("progress").and_then(value_as_f64) {
            let mode = item.get("mode").and_then(Value::as_i64).unwrap_or(1);
            let color = item.get("color").and_then(value_as_color).unwrap_or(WHITE);
            return Some(
                Danmaku::new((progress / 1000.0).max(0.0), DanmakuMode::from_raw(mode), color, text)
                    .with_platform(platform),
            );
        }
    }

    None
}

fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn value_as_color(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().map(|c| (c as u32) & 0x00FF_FFFF),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix('#') {
                u32::from_str_radix(hex, 16).ok().map(|c| c & 0x00FF_FFFF)
            } else {
                s.parse::<u32>().ok().map(|c| c & 0x00FF_FFFF)
            }
        }
        _ => None,
    }
}
