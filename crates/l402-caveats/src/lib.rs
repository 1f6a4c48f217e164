//! Caveat model and satisfier set (§4.1 of the spec).
//!
//! Caveats are `condition=value` strings attached to a macaroon. A
//! [`Satisfier`] knows how to evaluate the final caveat for its condition,
//! and how to check that a later caveat on the same condition only narrows
//! an earlier one. Unknown conditions are passed through unevaluated: they
//! may be meaningful to the backend, not to us.

mod capabilities;
mod services;
mod timeout;

pub use capabilities::CapabilitiesSatisfier;
pub use services::ServicesSatisfier;
pub use timeout::TimeoutSatisfier;

use l402_common::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single `condition=value` first-party caveat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caveat {
    pub condition: String,
    pub value: String,
}

impl Caveat {
    pub fn new(condition: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            value: value.into(),
        }
    }

    /// Parses a `condition=value` string. The condition is everything
    /// before the first `=`; values may themselves contain `=` (e.g. a
    /// base64 chunk), so the first `=` is the delimiter.
    pub fn parse(raw: &str) -> Option<Caveat> {
        let (condition, value) = raw.split_once('=')?;
        if condition.is_empty() {
            return None;
        }
        Some(Caveat::new(condition, value))
    }

    pub fn encode(&self) -> String {
        format!("{}={}", self.condition, self.value)
    }
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Evaluates caveats for one condition.
pub trait Satisfier: Send + Sync {
    /// The condition string this satisfier is registered under.
    fn condition(&self) -> &str;

    /// Checks the last caveat seen for this condition against present
    /// state (e.g. the clock, or the service being requested).
    fn check_final(&self, value: &str) -> Result<(), String>;

    /// Checks that `later` narrows (or is equal to) `earlier`. Both values
    /// belong to caveats with the same condition, in the order they
    /// appeared on the macaroon.
    fn check_monotonic(&self, earlier: &str, later: &str) -> Result<(), String>;
}

/// A registry of satisfiers, keyed by the condition they evaluate, scoped
/// to one `target_service` and one `Clock`.
pub struct SatisfierSet {
    satisfiers: HashMap<String, Arc<dyn Satisfier>>,
}

impl SatisfierSet {
    /// Builds the standard satisfier set for a request against
    /// `target_service`: the services satisfier (registered at
    /// `"services"`) and the timeout/capabilities satisfiers (registered at
    /// `"<target_service>_timeout"` / `"<target_service>_capabilities"`).
    pub fn for_service(target_service: &str, clock: Arc<dyn Clock>) -> Self {
        let mut satisfiers: HashMap<String, Arc<dyn Satisfier>> = HashMap::new();

        let services = Arc::new(ServicesSatisfier::new(target_service));
        satisfiers.insert(services.condition().to_string(), services);

        let timeout = Arc::new(TimeoutSatisfier::new(target_service, clock));
        satisfiers.insert(timeout.condition().to_string(), timeout);

        let capabilities = Arc::new(CapabilitiesSatisfier::new(target_service));
        satisfiers.insert(capabilities.condition().to_string(), capabilities);

        Self { satisfiers }
    }

    pub fn get(&self, condition: &str) -> Option<&Arc<dyn Satisfier>> {
        self.satisfiers.get(condition)
    }

    pub fn register(&mut self, satisfier: Arc<dyn Satisfier>) {
        self.satisfiers
            .insert(satisfier.condition().to_string(), satisfier);
    }
}

/// Verifies an ordered caveat list against `set`.
///
/// Implements the "admin token" edge case from §4.3: if no caveat carries
/// the `"services"` condition at all, the token is unscoped and authorizes
/// every service, so the services satisfier is skipped entirely. All other
/// registered satisfiers (timeout, capabilities) still apply if present.
pub fn verify(caveats: &[Caveat], set: &SatisfierSet) -> Result<(), String> {
    let is_admin_token = !caveats.iter().any(|c| c.condition == "services");

    let mut last_seen: HashMap<&str, &str> = HashMap::new();
    for caveat in caveats {
        if is_admin_token && caveat.condition == "services" {
            continue;
        }
        let Some(satisfier) = set.get(&caveat.condition) else {
            // Unknown condition: not our business, pass through.
            continue;
        };
        if let Some(prev) = last_seen.get(caveat.condition.as_str()) {
            satisfier
                .check_monotonic(prev, &caveat.value)
                .map_err(|e| format!("caveat '{}' violates monotonicity: {e}", caveat.condition))?;
        }
        last_seen.insert(caveat.condition.as_str(), caveat.value.as_str());
    }

    for (condition, value) in &last_seen {
        let satisfier = set.get(condition).expect("only known conditions are tracked");
        satisfier
            .check_final(value)
            .map_err(|e| format!("caveat '{condition}' failed: {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use l402_common::clock::FixedClock;

    #[test]
    fn parses_condition_value() {
        let c = Caveat::parse("svc1_timeout=12345").unwrap();
        assert_eq!(c.condition, "svc1_timeout");
        assert_eq!(c.value, "12345");
    }

    #[test]
    fn rejects_caveat_without_condition() {
        assert!(Caveat::parse("=nocondition").is_none());
        assert!(Caveat::parse("novalue").is_none());
    }

    #[test]
    fn admin_token_with_no_services_caveat_authorizes_everything() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1000));
        let set = SatisfierSet::for_service("svc1", clock);
        let caveats = vec![Caveat::new("svc1_timeout", "2000")];
        assert!(verify(&caveats, &set).is_ok());
    }

    #[test]
    fn unknown_condition_is_ignored() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1000));
        let set = SatisfierSet::for_service("svc1", clock);
        let caveats = vec![
            Caveat::new("services", "svc1:0"),
            Caveat::new("svc1_region", "eu"),
        ];
        assert!(verify(&caveats, &set).is_ok());
    }
}
