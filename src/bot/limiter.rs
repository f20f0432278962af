//! Per-user daily request quota.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

/// Requests a user may make per quota window.
pub const DEFAULT_DAILY_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuota {
    pub count: u32,
    pub last_reset: DateTime<Utc>,
}

/// Counts accepted requests per user and resets the count lazily once a day
/// has passed since the last reset.
pub struct RateLimiter {
    daily_limit: u32,
    window: TimeDelta,
    quotas: HashMap<i64, UserQuota>,
}

impl RateLimiter {
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            window: TimeDelta::days(1),
            quotas: HashMap::new(),
        }
    }

    /// Consume one request for `user_id` if the quota allows it.
    pub fn check_and_consume(&mut self, user_id: i64, now: DateTime<Utc>) -> bool {
        let quota = self.quotas.entry(user_id).or_insert(UserQuota {
            count: 0,
            last_reset: now,
        });

        if now - quota.last_reset >= self.window {
            quota.count = 0;
            quota.last_reset = now;
        }

        if quota.count >= self.daily_limit {
            return false;
        }
        quota.count += 1;
        true
    }

    pub fn quota(&self, user_id: i64) -> Option<&UserQuota> {
        self.quotas.get(&user_id)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_DAILY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_counts_accepted_requests() {
        let mut limiter = RateLimiter::default();
        for _ in 0..7 {
            assert!(limiter.check_and_consume(1, t0()));
        }
        assert_eq!(limiter.quota(1).unwrap().count, 7);
    }

    #[test]
    fn test_rejects_after_limit() {
        let mut limiter = RateLimiter::default();
        for i in 0..50 {
            assert!(limiter.check_and_consume(1, t0() + TimeDelta::minutes(i)));
        }
        assert!(!limiter.check_and_consume(1, t0() + TimeDelta::hours(2)));
        // Rejection does not increment
        assert_eq!(limiter.quota(1).unwrap().count, 50);
    }

    #[test]
    fn test_users_are_independent() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.check_and_consume(1, t0()));
        assert!(!limiter.check_and_consume(1, t0()));
        assert!(limiter.check_and_consume(2, t0()));
    }

    #[test]
    fn test_resets_after_a_day() {
        let mut limiter = RateLimiter::new(2);
        assert!(limiter.check_and_consume(1, t0()));
        assert!(limiter.check_and_consume(1, t0()));
        assert!(!limiter.check_and_consume(1, t0() + TimeDelta::hours(23)));

        let next_day = t0() + TimeDelta::days(1);
        assert!(limiter.check_and_consume(1, next_day));
        let quota = limiter.quota(1).unwrap();
        assert_eq!(quota.count, 1);
        assert_eq!(quota.last_reset, next_day);
    }

    #[test]
    fn test_window_starts_at_first_request() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.check_and_consume(1, t0()));
        // Just short of a full day is still the same window
        let almost = t0() + TimeDelta::days(1) - TimeDelta::seconds(1);
        assert!(!limiter.check_and_consume(1, almost));
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let mut limiter = RateLimiter::new(0);
        assert!(!limiter.check_and_consume(1, t0()));
        assert_eq!(limiter.quota(1).unwrap().count, 0);
    }
}
