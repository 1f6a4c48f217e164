use crate::Satisfier;

/// Satisfies the `services` caveat: a comma-separated list of `name:tier`
/// pairs. The final caveat must name `target_service`; between successive
/// caveats, the later list must be a subset of the earlier one, and shared
/// tiers must be non-decreasing (§4.1).
pub struct ServicesSatisfier {
    target_service: String,
}

impl ServicesSatisfier {
    pub fn new(target_service: impl Into<String>) -> Self {
        Self {
            target_service: target_service.into(),
        }
    }
}

fn parse_list(value: &str) -> Result<Vec<(&str, u64)>, String> {
    value
        .split(',')
        .map(|entry| {
            let (name, tier) = entry
                .split_once(':')
                .ok_or_else(|| format!("malformed services entry '{entry}'"))?;
            let tier: u64 = tier
                .parse()
                .map_err(|_| format!("malformed tier in '{entry}'"))?;
            Ok((name, tier))
        })
        .collect()
}

impl Satisfier for ServicesSatisfier {
    fn condition(&self) -> &str {
        "services"
    }

    fn check_final(&self, value: &str) -> Result<(), String> {
        let entries = parse_list(value)?;
        if !entries.iter().any(|(name, _)| *name == self.target_service) {
            return Err(format!(
                "token does not authorize service '{}'",
                self.target_service
            ));
        }
        Ok(())
    }

    fn check_monotonic(&self, earlier: &str, later: &str) -> Result<(), String> {
        let earlier = parse_list(earlier)?;
        let later = parse_list(later)?;

        for (name, later_tier) in &later {
            let earlier_tier = earlier
                .iter()
                .find(|(earlier_name, _)| earlier_name == name)
                .map(|(_, tier)| *tier)
                .ok_or_else(|| format!("service '{name}' was not present in the earlier caveat"))?;
            if *later_tier < earlier_tier {
                return Err(format!(
                    "tier for '{name}' decreased from {earlier_tier} to {later_tier}"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_caveat_must_list_target_service() {
        let s = ServicesSatisfier::new("svc1");
        assert!(s.check_final("svc1:0,svc2:1").is_ok());
        assert!(s.check_final("svc2:1").is_err());
    }

    #[test]
    fn later_caveat_must_be_subset_with_nondecreasing_tiers() {
        let s = ServicesSatisfier::new("svc1");
        assert!(s.check_monotonic("svc1:0,svc2:1", "svc1:0").is_ok());
        assert!(s.check_monotonic("svc1:0,svc2:1", "svc1:2").is_ok());
        // svc3 wasn't in the earlier caveat.
        assert!(s.check_monotonic("svc1:0", "svc1:0,svc3:0").is_err());
        // tier went down.
        assert!(s.check_monotonic("svc1:5", "svc1:1").is_err());
    }
}
