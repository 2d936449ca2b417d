//! Jittered expiry
//!
//! A batch of resources loaded in the same second would, with a fixed TTL,
//! all expire in the same second and reload against the store together.
//! Each entry instead gets `base + U[0, max_jitter]`.

use std::time::Duration;

use rand::Rng;

use crate::config::CacheConfig;

/// Base TTL plus bounded random jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    base_ttl: Duration,
    max_jitter: Duration,
}

impl ExpiryPolicy {
    pub fn new(base_ttl: Duration, max_jitter: Duration) -> Self {
        Self {
            base_ttl,
            max_jitter,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.base_ttl(), config.max_jitter())
    }

    pub fn base_ttl(&self) -> Duration {
        self.base_ttl
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Longest TTL this policy can hand out
    pub fn max_ttl(&self) -> Duration {
        self.base_ttl.saturating_add(self.max_jitter)
    }

    /// Draw a TTL from `[base_ttl, base_ttl + max_jitter]`
    pub fn next_ttl(&self) -> Duration {
        self.next_ttl_with(&mut rand::thread_rng())
    }

    /// As [`next_ttl`](Self::next_ttl) with a caller-supplied RNG
    pub fn next_ttl_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base_ttl;
        }
        self.base_ttl
            .saturating_add(Duration::from_millis(rng.gen_range(0..=jitter_ms)))
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = ExpiryPolicy::new(Duration::from_secs(60), Duration::ZERO);
        for _ in 0..10 {
            assert_eq!(policy.next_ttl(), Duration::from_secs(60));
        }
    }

    #[test]
    fn test_ttl_within_bounds() {
        let policy = ExpiryPolicy::new(Duration::from_secs(3600), Duration::from_secs(600));
        for _ in 0..1000 {
            let ttl = policy.next_ttl();
            assert!(ttl >= policy.base_ttl());
            assert!(ttl <= policy.max_ttl());
        }
    }

    #[test]
    fn test_extreme_durations_saturate() {
        let policy = ExpiryPolicy::new(Duration::MAX, Duration::from_secs(600));
        assert_eq!(policy.next_ttl(), Duration::MAX);
        assert_eq!(policy.max_ttl(), Duration::MAX);
    }

    #[test]
    fn test_batch_spreads_across_seconds() {
        let policy = ExpiryPolicy::default();
        let seconds: HashSet<u64> = (0..100).map(|_| policy.next_ttl().as_secs()).collect();
        // 100 draws over a 600 s window landing in a single second is
        // astronomically unlikely.
        assert!(seconds.len() > 1);
    }
}
