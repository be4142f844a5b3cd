//! Per-client sliding-window rate limiter.
//!
//! In-memory only: limits are per-instance. Each key holds the timestamps of
//! its recent requests; expired entries are pruned lazily on access.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

const WINDOW_SECONDS: u64 = 60;

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// key -> request timestamps in ms, oldest first
    windows: Arc<DashMap<String, VecDeque<u64>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `key` and check it against `max_requests` per
    /// 60-second window. `max_requests == 0` disables limiting. Returns
    /// `Err(retry_after_seconds)` when over the limit.
    pub fn check(&self, key: &str, max_requests: u32) -> Result<(), u64> {
        if max_requests == 0 {
            return Ok(());
        }

        let now_ms = Self::now_ms();
        let window_start_ms = now_ms.saturating_sub(WINDOW_SECONDS * 1000);

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps.front().is_some_and(|&ts| ts < window_start_ms) {
            timestamps.pop_front();
        }

        if timestamps.len() >= max_requests as usize {
            let oldest = timestamps.front().copied().unwrap_or(now_ms);
            let elapsed = now_ms.saturating_sub(oldest);
            let remaining_ms = (WINDOW_SECONDS * 1000).saturating_sub(elapsed);
            return Err((remaining_ms / 1000).max(1));
        }

        timestamps.push_back(now_ms);
        Ok(())
    }

    /// Drop keys whose whole window has expired. Called opportunistically;
    /// correctness does not depend on it.
    pub fn prune(&self) {
        let cutoff = Self::now_ms().saturating_sub(WINDOW_SECONDS * 1000);
        self.windows
            .retain(|_, timestamps| timestamps.back().is_some_and(|&ts| ts >= cutoff));
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_requests_limit_three_rejects_two() {
        let limiter = RateLimiter::new();
        let mut rejected = 0;
        for _ in 0..5 {
            if limiter.check("1.2.3.4", 3).is_err() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.check("ip", 0).is_ok());
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("a", 1).is_ok());
        assert!(limiter.check("a", 1).is_err());
        assert!(limiter.check("b", 1).is_ok());
    }

    #[test]
    fn test_prune_keeps_active_windows() {
        let limiter = RateLimiter::new();
        limiter.check("live", 10).ok();
        limiter.prune();
        assert!(limiter.windows.contains_key("live"));
    }
}
