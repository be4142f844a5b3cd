//! Palette-based color rewriting.
//!
//! A float balance walks the stream so that exactly `WHITE_RATIO` percent of
//! comments come out white, with the remainder drawn from the palette. The
//! error-diffusion walk keeps every local window close to the target ratio
//! instead of clustering.

use rand::Rng;

use crate::models::{Danmaku, DanmakuMode, WHITE};

/// Rewrite colors in place. `white_ratio` is a percentage in `[0, 100]`;
/// callers gate on `WHITE_RATIO >= 0` before invoking.
pub fn recolor(comments: &mut [Danmaku], white_ratio: f64, palette: &[u32]) {
    let ratio = (white_ratio / 100.0).clamp(0.0, 1.0);
    let mut rng = rand::thread_rng();
    let mut balance = 0.5_f64;

    for comment in comments.iter_mut() {
        balance += ratio;
        if balance >= 1.0 {
            comment.color = WHITE;
            balance -= 1.0;
        } else if !palette.is_empty() {
            comment.color = palette[rng.gen_range(0..palette.len())];
        }
    }
}

/// Rewrite fixed placements to scrolling.
pub fn convert_to_scroll(comments: &mut [Danmaku]) {
    for comment in comments.iter_mut() {
        if matches!(comment.mode, DanmakuMode::Bottom | DanmakuMode::Top) {
            comment.mode = DanmakuMode::Scroll;
        }
    }
}
