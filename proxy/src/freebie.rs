//! Per-service, per-remote-IP freebie counter (§3 "Freebie counter", §4.6
//! step 6's `freebie(N)` auth level).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Default)]
pub struct FreebieCounters {
    remaining: Mutex<HashMap<(String, IpAddr), u32>>,
}

impl FreebieCounters {
    /// Consumes one free call for `(service, remote_ip)` if the service's
    /// budget `limit` hasn't been exhausted yet. Returns `true` if the
    /// caller may proceed without a token.
    pub fn try_consume(&self, service_name: &str, remote_ip: IpAddr, limit: u32) -> bool {
        let mut remaining = self.remaining.lock();
        let used = remaining
            .entry((service_name.to_string(), remote_ip))
            .or_insert(0);
        if *used < limit {
            *used += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_falls_back() {
        let counters = FreebieCounters::default();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(counters.try_consume("svc", ip, 2));
        assert!(counters.try_consume("svc", ip, 2));
        assert!(!counters.try_consume("svc", ip, 2));
    }

    #[test]
    fn counters_are_independent_per_service_and_ip() {
        let counters = FreebieCounters::default();
        let ip_a: IpAddr = "127.0.0.1".parse().unwrap();
        let ip_b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(counters.try_consume("svc", ip_a, 1));
        assert!(counters.try_consume("svc", ip_b, 1));
        assert!(counters.try_consume("other", ip_a, 1));
    }
}
