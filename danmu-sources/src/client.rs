//! Shared upstream HTTP client.
//!
//! One pooled client for every adapter. Platform-specific headers (cookies,
//! referers) are layered per request by the adapters themselves.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::Value;

use danmu_core::{Error, Result};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Shared HTTP client for all upstream requests (connection pooling).
pub static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(8)
        .gzip(true)
        .build()
        .unwrap_or_default()
});

/// A client that does not follow redirects, for short-link resolution.
pub static HTTP_NO_REDIRECT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
});

pub async fn get_json(url: &str, referer: Option<&str>) -> Result<Value> {
    let mut req = HTTP.get(url);
    if let Some(referer) = referer {
        req = req.header("Referer", referer);
    }
    let resp = req.send().await?.error_for_status().map_err(|e| {
        Error::Upstream(format!("GET {url} failed: {e}"))
    })?;
    Ok(resp.json().await?)
}

pub async fn get_text(url: &str, referer: Option<&str>) -> Result<String> {
    let mut req = HTTP.get(url);
    if let Some(referer) = referer {
        req = req.header("Referer", referer);
    }
    let resp = req.send().await?.error_for_status().map_err(|e| {
        Error::Upstream(format!("GET {url} failed: {e}"))
    })?;
    Ok(resp.text().await?)
}

/// Inflate a zlib/deflate-compressed body, as served by the comment segment
/// endpoints of several platforms.
pub fn inflate(bytes: &[u8]) -> Result<String> {
    use flate2::read::{DeflateDecoder, ZlibDecoder};
    use std::io::Read;

    let mut out = String::new();
    let mut zlib = ZlibDecoder::new(bytes);
    if zlib.read_to_string(&mut out).is_ok() {
        return Ok(out);
    }

    out.clear();
    let mut deflate = DeflateDecoder::new(bytes);
    deflate
        .read_to_string(&mut out)
        .map_err(|e| Error::Upstream(format!("inflate failed: {e}")))?;
    Ok(out)
}

/// Pull a `u32` year out of a date-ish string (`2021-11-06` → 2021).
pub fn year_of(date: &str) -> Option<u32> {
    let head: String = date.chars().take_while(char::is_ascii_digit).collect();
    if head.len() == 4 {
        head.parse().ok()
    } else {
        None
    }
}

/// Strip `<em>`-style highlight markup that search APIs embed in titles.
pub fn strip_markup(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_tag = false;
    for c in title.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}
