//! Sliding-window rate limiter for the HTTP surface.
//!
//! Each client gets an independent window of request timestamps; expired
//! entries are pruned on every check. Rejections carry a retry-after hint
//! derived from the oldest request still in the window.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed.
    Allowed,
    /// The request is rejected; retry after this many seconds.
    Limited {
        /// Whole seconds until the window frees a slot (at least 1).
        retry_after_s: u64,
    },
}

/// A sliding-window rate limiter keyed by client id.
pub struct RateLimiter {
    windows: RwLock<HashMap<String, Vec<Instant>>>,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given window size in seconds. Use 60 for
    /// requests-per-minute semantics.
    pub fn new(window_seconds: u64) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Check whether a request from `client` is allowed under `limit`
    /// requests per window. `limit == 0` means unlimited.
    pub fn check(&self, client: &str, limit: u32) -> RateDecision {
        if limit == 0 {
            return RateDecision::Allowed;
        }
        let now = Instant::now();
        let mut windows = self.windows.write().expect("rate limiter lock poisoned");
        let window = windows.entry(client.to_string()).or_default();

        // Timestamps are appended monotonically; drop the expired prefix.
        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        let keep_from = window.partition_point(|&t| t < cutoff);
        window.drain(..keep_from);

        if window.len() >= limit as usize {
            let oldest = window[0];
            let free_at = oldest + self.window;
            let retry_after_s = free_at
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return RateDecision::Limited { retry_after_s };
        }
        window.push(now);
        RateDecision::Allowed
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.read().expect("rate limiter lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_means_unlimited() {
        let limiter = RateLimiter::new(60);
        for _ in 0..1000 {
            assert_eq!(limiter.check("a", 0), RateDecision::Allowed);
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn limit_enforced_within_window() {
        let limiter = RateLimiter::new(60);
        assert_eq!(limiter.check("a", 2), RateDecision::Allowed);
        assert_eq!(limiter.check("a", 2), RateDecision::Allowed);
        match limiter.check("a", 2) {
            RateDecision::Limited { retry_after_s } => assert!(retry_after_s >= 1),
            RateDecision::Allowed => panic!("third request should be limited"),
        }
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(60);
        assert_eq!(limiter.check("a", 1), RateDecision::Allowed);
        assert_eq!(limiter.check("b", 1), RateDecision::Allowed);
        assert!(matches!(limiter.check("a", 1), RateDecision::Limited { .. }));
        assert!(matches!(limiter.check("b", 1), RateDecision::Limited { .. }));
    }

    #[test]
    fn window_expiry_frees_slots() {
        // A zero-length window expires entries immediately.
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.check("a", 1), RateDecision::Allowed);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.check("a", 1), RateDecision::Allowed);
    }
}
