//! Per-client request rate limiter
//!
//! Each client address gets a counter and a last-seen time. A request resets
//! the counter when the client has no entry or has been idle longer than the
//! window; otherwise the counter is incremented. Requests beyond the quota are
//! rejected. Reset is lazy; `sweep` evicts idle entries to bound memory.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RequestRateLimitConfig;

/// Time source for the rate limiter
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Configuration for the rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,

    /// Idle time after which a client's counter resets
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&RequestRateLimitConfig> for RateLimitConfig {
    fn from(config: &RequestRateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
        }
    }
}

/// Window state for one client
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    last_seen: Instant,
}

/// Rate limiter keyed by client address
///
/// The read-check-increment-write sequence runs under a single lock.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new rate limiter with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record a request from `key`
    ///
    /// Returns `true` when the request is within quota.
    pub fn check(&self, key: IpAddr) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let window = entries.entry(key).or_insert(Window {
            count: 0,
            last_seen: now,
        });

        if window.count == 0 || now.duration_since(window.last_seen) > self.config.window {
            window.count = 1;
        } else {
            window.count = window.count.saturating_add(1);
        }
        window.last_seen = now;

        window.count <= self.config.max_requests
    }

    /// Current count for `key`, 0 when untracked
    pub fn count(&self, key: IpAddr) -> u32 {
        self.entries.lock().get(&key).map_or(0, |w| w.count)
    }

    /// Evict entries idle longer than the window
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|_, window| now.duration_since(window.last_seen) <= self.config.window);

        before - entries.len()
    }

    /// Get current number of tracked clients
    pub fn tracked_keys_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Run `sweep` every `period` until the returned task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let evicted = self.sweep();
                if evicted > 0 {
                    debug!(
                        evicted = evicted,
                        remaining = self.tracked_keys_count(),
                        "Rate limiter sweep"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))
    }

    fn test_ip2() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2))
    }

    fn limiter(max_requests: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(
            RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            clock.clone(),
        );
        (limiter, clock)
    }

    // Test 1: New rate limiter is empty
    #[test]
    fn test_new_rate_limiter_is_empty() {
        let limiter = RateLimiter::with_defaults();
        assert_eq!(limiter.tracked_keys_count(), 0);
        assert_eq!(limiter.count(test_ip()), 0);
    }

    // Test 2: N requests pass, N+1th is rejected
    #[test]
    fn test_rejects_after_quota() {
        let (limiter, _clock) = limiter(3, 60);
        let ip = test_ip();

        for i in 1..=3 {
            assert!(limiter.check(ip), "request {} should pass", i);
        }
        assert!(!limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    // Test 3: Counter resets once the window elapses
    #[test]
    fn test_resets_after_window() {
        let (limiter, clock) = limiter(2, 60);
        let ip = test_ip();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));

        clock.advance(Duration::from_secs(61));

        assert!(limiter.check(ip));
        assert_eq!(limiter.count(ip), 1);
    }

    // Test 4: Age is measured from the last request, not the first
    #[test]
    fn test_window_measured_from_last_seen() {
        let (limiter, clock) = limiter(2, 60);
        let ip = test_ip();

        assert!(limiter.check(ip));
        clock.advance(Duration::from_secs(40));
        assert!(limiter.check(ip));
        clock.advance(Duration::from_secs(40));

        // 80s since first request but only 40s since the last one
        assert!(!limiter.check(ip));
    }

    // Test 5: Exactly one window of idleness does not reset
    #[test]
    fn test_reset_requires_exceeding_window() {
        let (limiter, clock) = limiter(1, 60);
        let ip = test_ip();

        assert!(limiter.check(ip));
        clock.advance(Duration::from_secs(60));
        assert!(!limiter.check(ip));
    }

    // Test 6: Different IPs are tracked separately
    #[test]
    fn test_different_ips_tracked_separately() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(limiter.check(test_ip()));
        assert!(!limiter.check(test_ip()));
        assert!(limiter.check(test_ip2()));
        assert_eq!(limiter.tracked_keys_count(), 2);
    }

    // Test 7: Sweep evicts idle entries only
    #[test]
    fn test_sweep_evicts_idle_entries() {
        let (limiter, clock) = limiter(10, 60);

        limiter.check(test_ip());
        clock.advance(Duration::from_secs(50));
        limiter.check(test_ip2());
        clock.advance(Duration::from_secs(20));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys_count(), 1);
        assert_eq!(limiter.count(test_ip2()), 1);
    }

    // Test 8: Concurrent checks never exceed the quota
    #[test]
    fn test_concurrent_checks() {
        let (limiter, _clock) = limiter(50, 60);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.check(test_ip())).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(limiter.count(test_ip()), 160);
    }

    // Test 9: Default config has expected values
    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests, 60);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(
            RateLimitConfig::from(&RequestRateLimitConfig::default()),
            config
        );
    }

    // Test 10: Sweeper task evicts in the background
    #[tokio::test(start_paused = true)]
    async fn test_spawn_sweeper() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(
            RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(1),
            },
            clock.clone(),
        ));

        limiter.check(test_ip());
        clock.advance(Duration::from_secs(5));

        let handle = limiter.clone().spawn_sweeper(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(limiter.tracked_keys_count(), 0);
        handle.abort();
    }
}
