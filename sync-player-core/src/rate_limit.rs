//! In-memory sliding-window rate limiting for client command floods (spec §5.4).
//!
//! There is no shared datastore in this deployment model (single process,
//! LAN-facing), so unlike a multi-replica service there is no need for a
//! Redis-backed variant — the in-memory sliding window is the only tier.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// One client exceeding 100 events in a 10-second window is cut off for a
/// further 5 seconds, per spec §5.4.
const MAX_EVENTS: u32 = 100;
const WINDOW_SECONDS: u64 = 10;
const COOLDOWN_SECONDS: u64 = 5;

#[derive(Default)]
struct Window {
    timestamps: VecDeque<u64>,
    /// Set when a flood trips the limiter; holds the cooldown's end time.
    cooldown_until_ms: Option<u64>,
}

/// Sliding-window limiter keyed by client id (or address, for pre-join
/// traffic). Requests from loopback addresses always pass, matching the
/// admin-on-localhost trust model described in spec §5.4.
#[derive(Clone, Default)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(())` if `key` may proceed, `Err` with the remaining
    /// cooldown otherwise. `source_ip` of `None` (not yet resolvable, or a
    /// non-TCP transport) is treated as non-local.
    pub fn check(&self, key: &str, source_ip: Option<IpAddr>) -> Result<(), RateLimitExceeded> {
        if source_ip.map(|ip| ip.is_loopback()).unwrap_or(false) {
            return Ok(());
        }

        let now_ms = now_ms();
        let mut entry = self.windows.entry(key.to_string()).or_default();

        if let Some(until) = entry.cooldown_until_ms {
            if now_ms < until {
                return Err(RateLimitExceeded {
                    retry_after_secs: ((until - now_ms) / 1000).max(1),
                });
            }
            entry.cooldown_until_ms = None;
            entry.timestamps.clear();
        }

        let window_start_ms = now_ms.saturating_sub(WINDOW_SECONDS * 1000);
        while entry.timestamps.front().is_some_and(|&ts| ts < window_start_ms) {
            entry.timestamps.pop_front();
        }

        if entry.timestamps.len() as u32 >= MAX_EVENTS {
            entry.cooldown_until_ms = Some(now_ms + COOLDOWN_SECONDS * 1000);
            return Err(RateLimitExceeded {
                retry_after_secs: COOLDOWN_SECONDS,
            });
        }

        entry.timestamps.push_back(now_ms);
        Ok(())
    }

    /// Drops all tracked state for `key`, used when a client disconnects.
    pub fn forget(&self, key: &str) {
        self.windows.remove(key);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_EVENTS {
            limiter.check("client-1", None).unwrap();
        }
    }

    #[test]
    fn trips_after_max_events_and_reports_cooldown() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_EVENTS {
            limiter.check("client-2", None).unwrap();
        }
        let err = limiter.check("client-2", None).unwrap_err();
        assert_eq!(err.retry_after_secs, COOLDOWN_SECONDS);
    }

    #[test]
    fn loopback_clients_bypass_the_limiter() {
        let limiter = RateLimiter::new();
        let localhost: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..(MAX_EVENTS * 2) {
            limiter.check("admin-console", Some(localhost)).unwrap();
        }
    }

    #[test]
    fn forget_clears_tracked_state() {
        let limiter = RateLimiter::new();
        for _ in 0..MAX_EVENTS {
            limiter.check("client-3", None).unwrap();
        }
        limiter.forget("client-3");
        limiter.check("client-3", None).unwrap();
    }
}
