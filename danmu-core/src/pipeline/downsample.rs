//! Density-smoothed downsampling.
//!
//! Rather than a blind every-Nth stride, the limiter flattens density peaks:
//! a floating per-second threshold is found by binary search so that taking
//! at most `T` comments per second lands on the target count, then an
//! error-diffusion walk distributes the fractional remainder across seconds.

use crate::models::Danmaku;

const SEARCH_ITERATIONS: u32 = 20;

/// Reduce `comments` (already time-sorted) to at most `limit` entries with a
/// uniform per-second density. Lists at or under the limit pass through.
pub fn downsample(comments: Vec<Danmaku>, limit: usize) -> Vec<Danmaku> {
    if limit == 0 || comments.len() <= limit {
        return comments;
    }

    // 1-second buckets over the whole timeline, empty seconds included: the
    // error accumulator resets on gaps.
    let max_sec = comments
        .last()
        .map_or(0, |d| d.time.max(0.0).floor() as usize);
    let mut buckets: Vec<Vec<&Danmaku>> = vec![Vec::new(); max_sec + 1];
    for comment in &comments {
        let sec = (comment.time.max(0.0).floor() as usize).min(max_sec);
        buckets[sec].push(comment);
    }

    let max_cap = buckets.iter().map(Vec::len).max().unwrap_or(0) as f64;

    // Binary-search the floating threshold T with sum(min(cap, T)) ~= limit.
    let target = limit as f64;
    let (mut lo, mut hi) = (0.0_f64, max_cap);
    for _ in 0..SEARCH_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let kept: f64 = buckets.iter().map(|b| (b.len() as f64).min(mid)).sum();
        if kept > target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let threshold = lo;

    // Error-diffusion walk over the buckets in time order.
    let mut out = Vec::with_capacity(limit);
    let mut acc = 0.5_f64;
    for bucket in &buckets {
        if bucket.is_empty() {
            acc = 0.0;
            continue;
        }
        let cap = bucket.len() as f64;
        let raw = cap.min(threshold) + acc;
        let take = (raw.floor() as usize).min(bucket.len());
        acc = raw - take as f64;
        if take == 0 {
            continue;
        }

        // Uniform stride inside the bucket.
        let step = cap / take as f64;
        for k in 0..take {
            let idx = ((k as f64 * step).floor() as usize).min(bucket.len() - 1);
            out.push(bucket[idx].clone());
            if out.len() >= limit {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(per_sec: usize, seconds: usize) -> Vec<Danmaku> {
        let mut comments = Vec::new();
        for s in 0..seconds {
            for i in 0..per_sec {
                let t = s as f64 + i as f64 / per_sec as f64;
                comments.push(Danmaku::scrolling(t, format!("c{s}-{i}")));
            }
        }
        comments
    }

    #[test]
    fn test_under_limit_passes_through() {
        let comments = uniform(2, 10);
        let out = downsample(comments.clone(), 100);
        assert_eq!(out.len(), comments.len());
    }

    #[test]
    fn test_uniform_density_scenario() {
        // 100/sec over 100 seconds, limit 500: ~5 per second everywhere.
        let out = downsample(uniform(100, 100), 500);
        assert!(out.len() <= 500, "got {}", out.len());
        assert!(out.len() >= 490, "got {}", out.len());

        let mut per_sec = vec![0usize; 100];
        for d in &out {
            per_sec[d.time.floor() as usize] += 1;
        }
        for (sec, &n) in per_sec.iter().enumerate() {
            assert!((4..=6).contains(&n), "second {sec} kept {n}");
        }
    }

    #[test]
    fn test_output_is_time_sorted() {
        let out = downsample(uniform(50, 30), 200);
        for pair in out.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }

    #[test]
    fn test_peaks_flattened_quiet_sections_kept() {
        // 5 quiet seconds of 2/sec, then a 200-comment burst in one second.
        let mut comments = uniform(2, 5);
        for i in 0..200 {
            comments.push(Danmaku::scrolling(5.0 + f64::from(i) / 200.0, format!("burst{i}")));
        }
        let out = downsample(comments, 50);
        assert!(out.len() <= 50);
        // Quiet seconds survive untrimmed.
        let quiet: usize = out.iter().filter(|d| d.time < 5.0).count();
        assert_eq!(quiet, 10);
    }

    #[test]
    fn test_gap_resets_accumulator() {
        let mut comments = uniform(10, 2);
        for i in 0..10 {
            comments.push(Danmaku::scrolling(60.0 + f64::from(i) * 0.1, format!("late{i}")));
        }
        let out = downsample(comments, 15);
        assert!(out.len() <= 15);
        assert!(out.iter().any(|d| d.time >= 60.0));
    }
}
