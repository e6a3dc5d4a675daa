// File: src/cache/rate_limiter.rs
//
// Sliding-window admission control. Each key keeps the instants of its admitted
// attempts; a denied attempt is never recorded.

use std::time::{Duration, Instant};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// How many attempts a key may make inside a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    /// 5 attempts per 60 seconds, applied per (guild, user, command).
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Default age after which a key with no recent attempts is purged.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
pub struct RateLimiter {
    attempts: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { attempts: DashMap::new() }
    }

    /// Builds the composite key used at the dispatch boundary.
    pub fn key(guild_id: &str, user_id: &str, action: &str) -> String {
        format!("{guild_id}:{user_id}:{action}")
    }

    pub fn check(&self, key: &str, max_attempts: usize, window: Duration) -> bool {
        self.check_at(key, max_attempts, window, Instant::now())
    }

    pub fn check_policy(&self, key: &str, policy: &RateLimitPolicy) -> bool {
        self.check(key, policy.max_attempts, policy.window)
    }

    /// Same as `check`, evaluated at `now`.
    pub fn check_at(&self, key: &str, max_attempts: usize, window: Duration, now: Instant) -> bool {
        // The entry guard holds the shard lock, so this is atomic against
        // other checks and against `purge_expired` for the same key.
        match self.attempts.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let recent = occupied
                    .get()
                    .iter()
                    .filter(|t| now.saturating_duration_since(**t) < window)
                    .count();
                if recent >= max_attempts {
                    debug!("rate limit hit for key={} ({} in window)", key, recent);
                    return false;
                }
                let list = occupied.get_mut();
                list.retain(|t| now.saturating_duration_since(*t) < window);
                list.push(now);
                true
            }
            Entry::Vacant(vacant) => {
                if max_attempts == 0 {
                    return false;
                }
                vacant.insert(vec![now]);
                true
            }
        }
    }

    /// Administrative override: forget every attempt for the key.
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Number of attempts currently recorded for the key.
    pub fn recorded(&self, key: &str) -> usize {
        self.attempts.get(key).map(|v| v.len()).unwrap_or(0)
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }

    pub fn purge_expired(&self, retention: Duration) -> usize {
        self.purge_expired_at(retention, Instant::now())
    }

    /// Trims attempts older than `retention` and removes keys left empty.
    /// Returns the number of keys removed.
    pub fn purge_expired_at(&self, retention: Duration, now: Instant) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, list| {
            list.retain(|t| now.saturating_duration_since(*t) < retention);
            !list.is_empty()
        });
        before.saturating_sub(self.attempts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_composite() {
        assert_eq!(RateLimiter::key("g", "u", "ticket"), "g:u:ticket");
    }

    #[test]
    fn zero_budget_never_admits_or_records() {
        let rl = RateLimiter::new();
        assert!(!rl.check("k", 0, Duration::from_secs(1)));
        assert_eq!(rl.tracked_keys(), 0);
    }

    #[test]
    fn purge_only_removes_fully_expired_keys() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(60);
        assert!(rl.check_at("old", 5, window, t0));
        assert!(rl.check_at("fresh", 5, window, t0 + Duration::from_secs(3500)));

        let removed = rl.purge_expired_at(DEFAULT_RETENTION, t0 + Duration::from_secs(3601));
        assert_eq!(removed, 1);
        assert_eq!(rl.recorded("old"), 0);
        assert_eq!(rl.recorded("fresh"), 1);
    }
}
