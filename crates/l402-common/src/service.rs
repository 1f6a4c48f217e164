use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a [`Service`] gates unauthenticated traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    /// No token required.
    Off,
    /// `n` unauthenticated calls per remote IP are let through before the
    /// service falls back to `On` behavior.
    Freebie(u32),
    /// A valid token is always required, unless the price source quotes 0.
    On,
}

/// Scheme used to dial the upstream backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// A per-`(service, path)` token bucket rule, as named in §3's "Rate-limit
/// bucket" data model.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Only applies to requests whose path matches; `None` matches every
    /// path of the owning service.
    pub path_regex: Option<Regex>,
    pub requests: u32,
    pub per: Duration,
    pub burst: u32,
}

impl RateLimitRule {
    pub fn new(path_regex: Option<Regex>, requests: u32, per: Duration, burst: Option<u32>) -> Self {
        Self {
            path_regex,
            requests,
            per,
            burst: burst.unwrap_or(requests).max(requests),
        }
    }

    pub fn applies_to(&self, path: &str) -> bool {
        match &self.path_regex {
            Some(re) => re.is_match(path),
            None => true,
        }
    }
}

/// Context handed to a [`PriceSource`] so it can quote a price for a
/// specific request.
pub struct PriceContext<'a> {
    pub service: &'a str,
    pub path: &'a str,
}

/// A pluggable price oracle. `price_source` in §3's service record is kept
/// abstract there; this is the concrete seam (see SPEC_FULL.md's
/// "Supplemented features").
pub trait PriceSource: Send + Sync {
    fn price_sats(&self, ctx: &PriceContext<'_>) -> u64;
}

/// Always quotes the same price, regardless of request.
pub struct FixedPrice(pub u64);

impl PriceSource for FixedPrice {
    fn price_sats(&self, _ctx: &PriceContext<'_>) -> u64 {
        self.0
    }
}

/// Always free; used for `AuthLevel::Off` services or demo deployments.
pub struct FreePrice;

impl PriceSource for FreePrice {
    fn price_sats(&self, _ctx: &PriceContext<'_>) -> u64 {
        0
    }
}

/// A configured backend, as described in §3 "Service record".
#[derive(Clone)]
pub struct Service {
    pub name: String,
    pub host_regex: Regex,
    pub path_regex: Option<Regex>,
    pub address: String,
    pub protocol: Protocol,
    pub auth_level: AuthLevel,
    pub auth_whitelist_regex: Option<Regex>,
    pub capabilities: Vec<String>,
    pub constraints: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
    pub rate_limits: Vec<RateLimitRule>,
    pub price_source: Arc<dyn PriceSource>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("auth_level", &self.auth_level)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Service {
    /// True if `path` is exempt from auth regardless of `auth_level`
    /// (operator-configured allowlist, e.g. a health-check endpoint).
    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.auth_whitelist_regex
            .as_ref()
            .is_some_and(|re| re.is_match(path))
    }

    pub fn matches(&self, host: &str, path: &str) -> bool {
        if !self.host_regex.is_match(host) {
            return false;
        }
        match &self.path_regex {
            Some(re) => re.is_match(path),
            None => true,
        }
    }
}
