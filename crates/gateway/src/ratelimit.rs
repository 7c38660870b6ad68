// Path: crates/gateway/src/ratelimit.rs
//! Per-caller token-bucket rate limiting.
//!
//! Buckets live in a concurrent map keyed by caller identity; each entry
//! is touched only under its own shard lock, so callers never contend
//! with each other.

use dashmap::DashMap;
use std::time::Instant;

/// One caller's bucket.
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// The admission decision of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed.
    Admitted,
    /// Over limit; retry after the hinted number of seconds.
    Limited {
        /// Seconds until one token is available again.
        retry_after_secs: u64,
    },
}

/// Token-bucket limiter, one bucket per caller.
pub struct CallerLimiter {
    buckets: DashMap<String, Bucket>,
    rate_per_sec: f64,
    burst: f64,
}

impl CallerLimiter {
    /// `limit` admissions per `window_secs`, with a burst of `burst`.
    pub fn new(limit: u32, window_secs: u64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rate_per_sec: limit as f64 / window_secs.max(1) as f64,
            burst: burst.max(1) as f64,
        }
    }

    /// Charges one token from the caller's bucket.
    pub fn check(&self, caller: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(caller.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                last: now,
            });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rate_per_sec).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            RateDecision::Admitted
        } else {
            let deficit = 1.0 - entry.tokens;
            RateDecision::Limited {
                retry_after_secs: (deficit / self.rate_per_sec).ceil() as u64,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_admits_then_limits() {
        let limiter = CallerLimiter::new(10, 60, 10);
        for i in 0..10 {
            assert_eq!(
                limiter.check("caller-1"),
                RateDecision::Admitted,
                "request {} should be admitted",
                i
            );
        }
        match limiter.check("caller-1") {
            RateDecision::Limited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[test]
    fn callers_do_not_affect_each_other() {
        let limiter = CallerLimiter::new(1, 60, 1);
        assert_eq!(limiter.check("a"), RateDecision::Admitted);
        assert!(matches!(limiter.check("a"), RateDecision::Limited { .. }));
        assert_eq!(
            limiter.check("b"),
            RateDecision::Admitted,
            "an exhausted neighbor must not affect caller b"
        );
    }
}
