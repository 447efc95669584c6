//! Fixed-window rate limiting for the execution endpoint
//!
//! One window record per client key, kept in process memory only: quotas
//! reset on restart, which is acceptable for a best-effort operator
//! console. The window is fixed, not sliding, and every check mutates the
//! window; there is no separate peek operation.

use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    started_at: Instant,
}

/// Injectable fixed-window limiter, owned by the server process and shared
/// by reference with request handlers.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    // DashMap entry locking makes the per-key read-modify-write atomic
    // under parallel request handling.
    windows: DashMap<String, WindowEntry>,
}

impl FixedWindowLimiter {
    /// Create a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
            windows: DashMap::new(),
        }
    }

    /// The configured quota, for response headers.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Check (and count) one request for a client key.
    ///
    /// First request for a key, or a window older than the window length,
    /// resets the window to a count of one. A full window denies with zero
    /// remaining.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                started_at: now,
            });

        if entry.count == 0 || now.duration_since(entry.started_at) > self.window {
            entry.count = 1;
            entry.started_at = now;
            return RateDecision {
                allowed: true,
                remaining: self.max_requests.saturating_sub(1),
            };
        }

        if entry.count >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests.saturating_sub(entry.count),
        }
    }
}

/// Derive the rate-limit key for a request.
///
/// First entry of `x-forwarded-for` when the header is present, else
/// `x-real-ip`, else a literal `"unknown"`. Clients behind a proxy that
/// sets neither header share one bucket, a known coarseness kept as-is.
#[must_use]
pub fn client_key(headers: &HeaderMap) -> String {
    if let Some(xff) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        let first = xff.split(',').next().unwrap_or("").trim();
        return if first.is_empty() {
            "unknown".to_string()
        } else {
            first.to_string()
        };
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limiter(max_requests: u32, window_ms: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(&RateLimitConfig {
            max_requests,
            window_ms,
        })
    }

    #[test]
    fn eleventh_request_in_the_window_is_denied() {
        let limiter = limiter(10, 60_000);
        for i in 0..10 {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed, "request {i} should pass");
            assert_eq!(decision.remaining, 10 - 1 - i);
        }
        let denied = limiter.check("1.2.3.4");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn keys_have_independent_windows() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn window_resets_after_it_expires() {
        let limiter = limiter(2, 30);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);

        std::thread::sleep(Duration::from_millis(40));

        let decision = limiter.check("a");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn denied_checks_do_not_extend_the_window() {
        let limiter = limiter(1, 40);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);

        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check("a").allowed);
    }

    #[test]
    fn forwarded_for_takes_the_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_key(&headers), "203.0.113.9");
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_key(&headers), "198.51.100.2");
    }

    #[test]
    fn no_headers_collapse_to_the_shared_bucket() {
        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn empty_forwarded_for_does_not_fall_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " ".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_key(&headers), "unknown");
    }
}
