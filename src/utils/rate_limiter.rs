// ==================== RATE LIMITER ====================
// Fixed-window limiter keyed by client IP, one limiter instance per route.
// State is process-wide and lives for the process lifetime; it is not shared
// across instances.

use crate::utils::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub points: u32,
    pub duration_secs: u64,
}

pub const DEFAULT_POLICY: RatePolicy = RatePolicy {
    points: 100,
    duration_secs: 60,
};

/// Per-route budgets; unconfigured routes fall back to DEFAULT_POLICY
pub fn policy_for_route(route: &str) -> RatePolicy {
    match route {
        "/api/v1/users/create" => RatePolicy {
            points: 5,
            duration_secs: 300,
        },
        "/api/v1/tools/{id}/save" => RatePolicy {
            points: 20,
            duration_secs: 60,
        },
        "/api/v1/user/folders" => RatePolicy {
            points: 10,
            duration_secs: 60,
        },
        "/api/v1/metadata" => RatePolicy {
            points: 10,
            duration_secs: 60,
        },
        _ => DEFAULT_POLICY,
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RouteLimiter {
    policy: RatePolicy,
    windows: Mutex<HashMap<String, Window>>,
}

impl RouteLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// Spends one point for the given client IP within the current window
    pub fn consume(&self, ip: &str) -> Result<(), AppError> {
        let window_duration = Duration::from_secs(self.policy.duration_secs);
        let mut windows = self.windows.lock().unwrap();

        let window = windows.entry(ip.to_string()).or_insert_with(|| Window {
            count: 0,
            started: Instant::now(),
        });

        if window.started.elapsed() >= window_duration {
            window.count = 0;
            window.started = Instant::now();
        }

        if window.count >= self.policy.points {
            let elapsed = window.started.elapsed().as_secs();
            let retry_after_secs = self.policy.duration_secs.saturating_sub(elapsed).max(1);
            return Err(AppError::RateLimitExceeded { retry_after_secs });
        }

        window.count += 1;
        Ok(())
    }

    /// Drops windows that already expired, keeps the table bounded
    pub fn cleanup_expired(&self) {
        let window_duration = Duration::from_secs(self.policy.duration_secs);
        let mut windows = self.windows.lock().unwrap();
        windows.retain(|_, w| w.started.elapsed() < window_duration);
    }
}

/// Lazily creates and caches one RouteLimiter per route
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RouteLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn limiter(&self, route: &str) -> Arc<RouteLimiter> {
        let mut limiters = self.limiters.lock().unwrap();
        limiters
            .entry(route.to_string())
            .or_insert_with(|| Arc::new(RouteLimiter::new(policy_for_route(route))))
            .clone()
    }

    /// Clears all limiter state (test isolation)
    pub fn reset(&self) {
        self.limiters.lock().unwrap().clear();
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_points_then_rejects() {
        let limiter = RouteLimiter::new(RatePolicy {
            points: 5,
            duration_secs: 60,
        });

        for i in 0..5 {
            assert!(
                limiter.consume("192.168.1.1").is_ok(),
                "request {} should pass",
                i + 1
            );
        }

        match limiter.consume("192.168.1.1") {
            Err(AppError::RateLimitExceeded { retry_after_secs }) => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected RateLimitExceeded, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_different_ips_have_separate_windows() {
        let limiter = RouteLimiter::new(RatePolicy {
            points: 2,
            duration_secs: 60,
        });

        assert!(limiter.consume("10.0.0.1").is_ok());
        assert!(limiter.consume("10.0.0.1").is_ok());
        assert!(limiter.consume("10.0.0.1").is_err());
        assert!(limiter.consume("10.0.0.2").is_ok());
    }

    #[test]
    fn test_window_resets_after_duration() {
        let limiter = RouteLimiter::new(RatePolicy {
            points: 1,
            duration_secs: 0,
        });

        assert!(limiter.consume("10.0.0.1").is_ok());
        // duration 0 expires immediately, so the next call starts a new window
        assert!(limiter.consume("10.0.0.1").is_ok());
    }

    #[test]
    fn test_registry_caches_per_route() {
        let registry = RateLimiterRegistry::new();
        let a = registry.limiter("/api/v1/users/create");
        let b = registry.limiter("/api/v1/users/create");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.policy().points, 5);
        assert_eq!(a.policy().duration_secs, 300);

        let default = registry.limiter("/api/v1/tools");
        assert_eq!(default.policy().points, DEFAULT_POLICY.points);
    }

    #[test]
    fn test_registry_reset_clears_state() {
        let registry = RateLimiterRegistry::new();
        let limiter = registry.limiter("/api/v1/user/folders");
        for _ in 0..10 {
            let _ = limiter.consume("10.0.0.9");
        }
        registry.reset();
        let fresh = registry.limiter("/api/v1/user/folders");
        assert!(fresh.consume("10.0.0.9").is_ok());
    }
}
