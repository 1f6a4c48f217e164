use crate::Satisfier;
use std::collections::HashSet;

/// Satisfies the `<target_service>_capabilities` caveat: a comma-separated
/// list of permitted capability names. There is no fixed "final" set to
/// check against here (the backend interprets capabilities itself), so
/// `check_final` always succeeds as long as the value parses; only the
/// narrowing rule between successive caveats is enforced.
pub struct CapabilitiesSatisfier {
    condition: String,
}

impl CapabilitiesSatisfier {
    pub fn new(target_service: impl AsRef<str>) -> Self {
        Self {
            condition: format!("{}_capabilities", target_service.as_ref()),
        }
    }

    fn parse(value: &str) -> HashSet<&str> {
        value.split(',').filter(|s| !s.is_empty()).collect()
    }
}

impl Satisfier for CapabilitiesSatisfier {
    fn condition(&self) -> &str {
        &self.condition
    }

    fn check_final(&self, _value: &str) -> Result<(), String> {
        Ok(())
    }

    fn check_monotonic(&self, earlier: &str, later: &str) -> Result<(), String> {
        let earlier = Self::parse(earlier);
        let later = Self::parse(later);
        if !later.is_subset(&earlier) {
            return Err("capability list is not a subset of the earlier caveat".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_capabilities_must_be_subset() {
        let s = CapabilitiesSatisfier::new("svc1");
        assert!(s.check_monotonic("read,write", "read").is_ok());
        assert!(s.check_monotonic("read", "read,write").is_err());
    }
}
