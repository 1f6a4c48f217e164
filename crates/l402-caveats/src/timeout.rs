use crate::Satisfier;
use l402_common::Clock;
use std::sync::Arc;

/// Satisfies the `<target_service>_timeout` caveat: a unix-second
/// timestamp after which the token is no longer valid for that service.
/// Between successive caveats, the later expiry must be no later than the
/// earlier one (§4.1).
pub struct TimeoutSatisfier {
    condition: String,
    clock: Arc<dyn Clock>,
}

impl TimeoutSatisfier {
    pub fn new(target_service: impl AsRef<str>, clock: Arc<dyn Clock>) -> Self {
        Self {
            condition: format!("{}_timeout", target_service.as_ref()),
            clock,
        }
    }

    fn parse(value: &str) -> Result<i64, String> {
        value
            .parse()
            .map_err(|_| format!("malformed timeout value '{value}'"))
    }
}

impl Satisfier for TimeoutSatisfier {
    fn condition(&self) -> &str {
        &self.condition
    }

    fn check_final(&self, value: &str) -> Result<(), String> {
        let expiry = Self::parse(value)?;
        let now = self.clock.now_unix();
        if now > expiry {
            return Err(format!("token expired at {expiry}, now is {now}"));
        }
        Ok(())
    }

    fn check_monotonic(&self, earlier: &str, later: &str) -> Result<(), String> {
        let earlier = Self::parse(earlier)?;
        let later = Self::parse(later)?;
        if later > earlier {
            return Err(format!("expiry increased from {earlier} to {later}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l402_common::clock::FixedClock;

    #[test]
    fn expired_timeout_fails_at_boundary() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1501));
        let s = TimeoutSatisfier::new("svc1", clock);
        assert!(s.check_final("1500").is_err());
    }

    #[test]
    fn timeout_still_valid_before_expiry() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1499));
        let s = TimeoutSatisfier::new("svc1", clock);
        assert!(s.check_final("1500").is_ok());
    }

    #[test]
    fn later_expiry_may_only_narrow() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let s = TimeoutSatisfier::new("svc1", clock);
        assert!(s.check_monotonic("1500", "1000").is_ok());
        assert!(s.check_monotonic("1000", "1500").is_err());
    }
}
