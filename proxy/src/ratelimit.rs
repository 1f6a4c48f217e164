//! Per-`(service, path)` rate limiting (§3 "Rate-limit bucket", §4.6 step
//! 7). A lazy, elapsed-time token bucket — same approach as
//! `l402_hashmail::RateLimiter` — duplicated here rather than shared since
//! the engine needs a non-blocking `try_acquire` (a request that can't get
//! a token is rejected with 429, never queued) while the hashmail one
//! blocks its caller.

use l402_common::RateLimitRule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rule: &RateLimitRule) -> Self {
        Self {
            tokens: rule.burst as f64,
            capacity: rule.burst as f64,
            refill_per_sec: rule.requests as f64 / rule.per.as_secs_f64().max(f64::MIN_POSITIVE),
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One bucket per `(service name, rule index)`, keyed lazily on first use.
pub struct RateLimiters {
    buckets: Mutex<HashMap<(String, usize), Bucket>>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiters {
    /// Checks every rule attached to `service` whose `path_regex` matches
    /// `path`. Every matching bucket must admit the request (§5's "strictest
    /// bucket acts first" ordering collapses to "all must admit" since
    /// buckets are independent locks with no shared ordering requirement
    /// beyond per-bucket arrival order).
    pub fn check(&self, service_name: &str, rules: &[RateLimitRule], path: &str) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock();
        for (index, rule) in rules.iter().enumerate() {
            if !rule.applies_to(path) {
                continue;
            }
            let key = (service_name.to_string(), index);
            let bucket = buckets.entry(key).or_insert_with(|| Bucket::new(rule));
            if !bucket.try_acquire() {
                let retry_after = Duration::from_secs_f64((1.0 / rule.requests.max(1) as f64 * rule.per.as_secs_f64()).max(1.0));
                return Err(retry_after);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(requests: u32, per_secs: u64, burst: u32) -> RateLimitRule {
        RateLimitRule::new(None, requests, Duration::from_secs(per_secs), Some(burst))
    }

    #[test]
    fn admits_up_to_burst_then_denies() {
        let limiters = RateLimiters::default();
        let rules = vec![rule(10, 60, 2)];
        assert!(limiters.check("svc", &rules, "/x").is_ok());
        assert!(limiters.check("svc", &rules, "/x").is_ok());
        assert!(limiters.check("svc", &rules, "/x").is_err());
    }

    #[test]
    fn non_matching_path_rule_is_skipped() {
        let limiters = RateLimiters::default();
        let rules = vec![RateLimitRule::new(
            Some(regex::Regex::new("^/v1").unwrap()),
            1,
            Duration::from_secs(60),
            Some(1),
        )];
        assert!(limiters.check("svc", &rules, "/v2/orders").is_ok());
        assert!(limiters.check("svc", &rules, "/v2/orders").is_ok());
    }
}
