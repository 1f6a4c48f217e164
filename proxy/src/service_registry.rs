//! Backend selection (§4.6 steps 4-5): first-match-wins over the
//! configured services, in registration order; step 5's fallback to
//! locally-handled routes when no configured backend claims the request.

use crate::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use l402_common::Service;
use std::sync::Arc;

/// A request handler built into the proxy itself rather than proxied
/// upstream (the `/metrics` and `/admin/*` surfaces). Tried, in
/// registration order, only once no configured backend matches.
#[async_trait]
pub trait LocalService: Send + Sync {
    fn matches(&self, path: &str) -> bool;
    async fn handle(&self, state: &Arc<AppState>, request: Request<Body>) -> Response;
}

pub struct ServiceRegistry {
    services: Vec<Service>,
    local_services: Vec<Box<dyn LocalService>>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<Service>, local_services: Vec<Box<dyn LocalService>>) -> Self {
        Self {
            services,
            local_services,
        }
    }

    /// Returns the first configured service whose host/path regex matches,
    /// preserving registration order.
    pub fn match_service(&self, host: &str, path: &str) -> Option<&Service> {
        self.services.iter().find(|svc| svc.matches(host, path))
    }

    /// Returns the first local service claiming `path`, preserving
    /// registration order.
    pub fn match_local(&self, path: &str) -> Option<&dyn LocalService> {
        self.local_services
            .iter()
            .map(|svc| svc.as_ref())
            .find(|svc| svc.matches(path))
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l402_common::service::FreePrice;
    use l402_common::AuthLevel;
    use l402_common::Protocol;
    use regex::Regex;
    use std::sync::Arc;

    fn service(name: &str, host_regex: &str, path_regex: Option<&str>) -> Service {
        Service {
            name: name.to_string(),
            host_regex: Regex::new(host_regex).unwrap(),
            path_regex: path_regex.map(|p| Regex::new(p).unwrap()),
            address: "127.0.0.1:9000".to_string(),
            protocol: Protocol::Http,
            auth_level: AuthLevel::On,
            auth_whitelist_regex: None,
            capabilities: vec![],
            constraints: vec![],
            timeout: None,
            headers: vec![],
            rate_limits: vec![],
            price_source: Arc::new(FreePrice),
        }
    }

    #[test]
    fn first_registered_match_wins() {
        let registry = ServiceRegistry::new(
            vec![
                service("broad", "api\\.example\\.com", None),
                service("narrow", "api\\.example\\.com", Some("^/v2")),
            ],
            vec![],
        );

        let matched = registry.match_service("api.example.com", "/v2/orders").unwrap();
        assert_eq!(matched.name, "broad");
    }

    #[test]
    fn no_match_returns_none() {
        let registry = ServiceRegistry::new(vec![service("svc", "api\\.example\\.com", None)], vec![]);
        assert!(registry.match_service("other.example.com", "/").is_none());
    }
}
