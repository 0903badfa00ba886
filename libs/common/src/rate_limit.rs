//! Fixed-window rate limiter for brute force and abuse protection
//!
//! Counters live in process memory. Each key starts a window on its first
//! request; once `max_requests` have been admitted, further requests are
//! refused until the window (or, when configured, the ban) runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::settings::RateLimitRule;

/// Keys are pruned once the map grows past this size
const PRUNE_THRESHOLD: usize = 10_000;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Whole seconds until the caller may retry, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Allowed { .. } => 0,
            Self::Limited { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
            }
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    /// Requests admitted in the current window
    count: u32,
    window_start: Instant,
    window: Duration,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    fn is_stale(&self, now: Instant) -> bool {
        let ban_over = self.ban_expires.map_or(true, |until| now >= until);
        ban_over && now.duration_since(self.window_start) >= self.window
    }
}

/// Rate limiter
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    /// Applied when a key exceeds its limit, instead of waiting out the window
    ban_duration: Option<Duration>,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limiter that bans offending keys for `ban_duration`
    pub fn with_ban(ban_duration: Duration) -> Self {
        Self {
            ban_duration: Some(ban_duration),
            entries: Arc::default(),
        }
    }

    /// Count one request for `key` against `rule`
    pub async fn check(&self, key: &str, rule: RateLimitRule) -> RateDecision {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() > PRUNE_THRESHOLD {
            entries.retain(|_, entry| !entry.is_stale(now));
        }

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimiterEntry {
                count: 0,
                window_start: now,
                window: rule.window(),
                ban_expires: None,
            });

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return RateDecision::Limited {
                    retry_after: ban_expires - now,
                };
            }
            entry.ban_expires = None;
            entry.count = 0;
            entry.window_start = now;
        }

        entry.window = rule.window();
        if now.duration_since(entry.window_start) >= entry.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= rule.max_requests {
            let retry_after = match self.ban_duration {
                Some(ban) => {
                    entry.ban_expires = Some(now + ban);
                    info!("Banned key {} for {} seconds", key, ban.as_secs());
                    ban
                }
                None => entry.window_start + entry.window - now,
            };
            return RateDecision::Limited { retry_after };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: rule.max_requests - entry.count,
        }
    }

    /// Forget everything recorded for `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Keys with a live window or ban
    pub async fn tracked_keys(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| !entry.is_stale(now))
            .count()
    }

    /// Keys currently serving a ban
    pub async fn banned_keys(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.ban_expires.is_some_and(|until| now < until))
            .count()
    }
}
