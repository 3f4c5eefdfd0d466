// src/ratelimit/mod.rs
// Per-token token-bucket rate limiting across minute/hour/day windows,
// reset on process restart. Hand-rolled rather than built on a sliding-
// window crate, because the spec's buckets are calendar-aligned (wall-clock
// floor division), not a rolling quota.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Buckets {
    minute_key: i64,
    minute_count: u32,
    hour_key: i64,
    hour_count: u32,
    day_key: i64,
    day_count: u32,
}

pub enum Admission {
    Admitted,
    Limited { retry_after_s: u64 },
}

pub struct RateLimiter {
    limits: RateLimits,
    buckets: Mutex<HashMap<String, Buckets>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and, on admission, atomically increments all three windows for
    /// `token_id`. When the bucket identifier changes (a new minute, hour,
    /// or day), that counter resets to zero before the check.
    pub fn check_and_increment(&self, token_id: &str, now_secs: i64) -> Admission {
        let minute_key = now_secs.div_euclid(60);
        let hour_key = now_secs.div_euclid(3600);
        let day_key = now_secs.div_euclid(86400);

        let mut map = self.buckets.lock();
        let entry = map.entry(token_id.to_string()).or_default();

        if entry.minute_key != minute_key {
            entry.minute_key = minute_key;
            entry.minute_count = 0;
        }
        if entry.hour_key != hour_key {
            entry.hour_key = hour_key;
            entry.hour_count = 0;
        }
        if entry.day_key != day_key {
            entry.day_key = day_key;
            entry.day_count = 0;
        }

        if entry.minute_count >= self.limits.per_minute {
            return Admission::Limited { retry_after_s: 60 };
        }
        if entry.hour_count >= self.limits.per_hour {
            return Admission::Limited { retry_after_s: 3600 };
        }
        if entry.day_count >= self.limits.per_day {
            return Admission::Limited { retry_after_s: 86400 };
        }

        entry.minute_count += 1;
        entry.hour_count += 1;
        entry.day_count += 1;
        Admission::Admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_per_minute_then_limits() {
        let limiter = RateLimiter::new(RateLimits {
            per_minute: 10,
            per_hour: 100,
            per_day: 1000,
        });

        let now = 1_700_000_000i64;
        for _ in 0..10 {
            assert!(matches!(
                limiter.check_and_increment("tok1", now),
                Admission::Admitted
            ));
        }

        match limiter.check_and_increment("tok1", now) {
            Admission::Limited { retry_after_s } => assert_eq!(retry_after_s, 60),
            Admission::Admitted => panic!("expected rate limit on 11th request"),
        }
    }

    #[test]
    fn resets_on_new_minute() {
        let limiter = RateLimiter::new(RateLimits {
            per_minute: 1,
            per_hour: 100,
            per_day: 1000,
        });
        let minute_start = 1_700_000_000i64 - (1_700_000_000i64 % 60);

        assert!(matches!(
            limiter.check_and_increment("tok1", minute_start),
            Admission::Admitted
        ));
        assert!(matches!(
            limiter.check_and_increment("tok1", minute_start + 1),
            Admission::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_and_increment("tok1", minute_start + 60),
            Admission::Admitted
        ));
    }

    #[test]
    fn tokens_are_independent() {
        let limiter = RateLimiter::new(RateLimits {
            per_minute: 1,
            per_hour: 100,
            per_day: 1000,
        });
        let now = 1_700_000_000i64;
        assert!(matches!(limiter.check_and_increment("a", now), Admission::Admitted));
        assert!(matches!(limiter.check_and_increment("b", now), Admission::Admitted));
    }
}
