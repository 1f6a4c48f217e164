use crate::config::Config;
use crate::engine::UpstreamClient;
use crate::freebie::FreebieCounters;
use crate::ratelimit::RateLimiters;
use crate::service_registry::ServiceRegistry;
use l402_challenger::Challenger;
use l402_hashmail::ActivityTracker;
use l402_hashmail::MailboxRegistry;
use l402_mint::Mint;
use opentelemetry_prometheus::PrometheusExporter;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state, mirroring the teacher's `AppState` shape:
/// long-lived subsystems plus a hot-reloadable settings block.
pub struct AppState {
    pub mint: Mint,
    pub challenger: Arc<Challenger>,
    pub registry: ServiceRegistry,
    pub rate_limiters: RateLimiters,
    pub freebies: FreebieCounters,
    /// Hot-reloadable: swapped in full by the `/admin/blocklist` endpoint.
    pub blocklist: RwLock<HashSet<IpAddr>>,
    pub hashmail_registry: MailboxRegistry,
    pub activity: Arc<ActivityTracker>,
    pub exporter: PrometheusExporter,
    pub client: UpstreamClient,
}

impl AppState {
    pub async fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocklist.read().await.contains(&ip)
    }

    pub fn load_blocklist(config: &Config) -> HashSet<IpAddr> {
        config
            .blocklist
            .iter()
            .filter_map(|raw| {
                raw.parse().map_err(|e| tracing::warn!(%raw, %e, "ignoring unparseable blocklist entry")).ok()
            })
            .collect()
    }
}
