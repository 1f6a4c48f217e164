use anyhow::Context;
use anyhow::Result;
use l402_common::service::FixedPrice;
use l402_common::service::FreePrice;
use l402_common::service::PriceSource;
use l402_common::service::RateLimitRule;
use l402_common::AuthLevel;
use l402_common::Protocol;
use l402_common::Service;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration, loaded from TOML plus a handful of CLI
/// overrides (§1 ambient stack, following the teacher's `Settings` shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default = "default_initial_load_timeout_secs")]
    pub initial_load_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub historical_batch_size: u64,
    #[serde(default = "default_num_retries")]
    pub store_num_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub store_retry_delay_ms: u64,
    #[serde(default = "default_hashmail_listen_addr")]
    pub hashmail_listen_addr: SocketAddr,
    #[serde(default = "default_hashmail_msg_rate")]
    pub hashmail_msg_rate_per_sec: u32,
    #[serde(default = "default_hashmail_burst")]
    pub hashmail_burst: u32,
    #[serde(default = "default_hashmail_stale_timeout_secs")]
    pub hashmail_stale_timeout_secs: Option<u64>,
    #[serde(default = "default_activity_sweep_interval_secs")]
    pub activity_sweep_interval_secs: u64,
}

fn default_initial_load_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> u64 {
    1000
}

fn default_num_retries() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_hashmail_listen_addr() -> SocketAddr {
    "0.0.0.0:50051".parse().expect("valid default socket addr")
}

fn default_hashmail_msg_rate() -> u32 {
    50
}

fn default_hashmail_burst() -> u32 {
    100
}

fn default_hashmail_stale_timeout_secs() -> Option<u64> {
    Some(300)
}

fn default_activity_sweep_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub host_regex: String,
    pub path_regex: Option<String>,
    pub address: String,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub auth_level: AuthLevelConfig,
    pub auth_whitelist_regex: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<(String, String)>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,
    /// Price in satoshis for a token covering this service; `0` makes the
    /// service free regardless of `auth_level`.
    #[serde(default)]
    pub price_sats: u64,
}

fn default_protocol() -> ProtocolConfig {
    ProtocolConfig::Http
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolConfig {
    Http,
    Https,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevelConfig {
    Off,
    Freebie { count: u32 },
    #[default]
    On,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub path_regex: Option<String>,
    pub requests: u32,
    pub per_secs: u64,
    pub burst: Option<u32>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file at {}", path.display()))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing config file at {}", path.display()))?;
        Ok(config)
    }

    pub fn compile_services(&self) -> Result<Vec<Service>> {
        self.services.iter().map(ServiceConfig::compile).collect()
    }

    /// Default mailbox settings applied to every hashmail stream created
    /// without an explicit per-stream override (§9's configuration knobs).
    pub fn hashmail_defaults(&self) -> l402_hashmail::MailboxConfig {
        l402_hashmail::MailboxConfig {
            msg_rate: Duration::from_secs(1) / self.hashmail_msg_rate_per_sec.max(1),
            burst: self.hashmail_burst,
            stale_timeout: self.hashmail_stale_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl ServiceConfig {
    pub fn compile(&self) -> Result<Service> {
        let host_regex = Regex::new(&self.host_regex)
            .with_context(|| format!("compiling host_regex for service {}", self.name))?;
        let path_regex = self
            .path_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("compiling path_regex for service {}", self.name))?;
        let auth_whitelist_regex = self
            .auth_whitelist_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("compiling auth_whitelist_regex for service {}", self.name))?;

        let auth_level = match &self.auth_level {
            AuthLevelConfig::Off => AuthLevel::Off,
            AuthLevelConfig::Freebie { count } => AuthLevel::Freebie(*count),
            AuthLevelConfig::On => AuthLevel::On,
        };

        let rate_limits = self
            .rate_limits
            .iter()
            .map(|rule| rule.compile(&self.name))
            .collect::<Result<Vec<_>>>()?;

        let price_source: Arc<dyn PriceSource> = if self.price_sats == 0 {
            Arc::new(FreePrice)
        } else {
            Arc::new(FixedPrice(self.price_sats))
        };

        Ok(Service {
            name: self.name.clone(),
            host_regex,
            path_regex,
            address: self.address.clone(),
            protocol: match self.protocol {
                ProtocolConfig::Http => Protocol::Http,
                ProtocolConfig::Https => Protocol::Https,
            },
            auth_level,
            auth_whitelist_regex,
            capabilities: self.capabilities.clone(),
            constraints: self.constraints.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
            headers: self.headers.clone(),
            rate_limits,
            price_source,
        })
    }
}

impl RateLimitConfig {
    fn compile(&self, service_name: &str) -> Result<RateLimitRule> {
        let path_regex = self
            .path_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("compiling rate-limit path_regex for service {service_name}"))?;
        Ok(RateLimitRule::new(
            path_regex,
            self.requests,
            Duration::from_secs(self.per_secs.max(1)),
            self.burst,
        ))
    }
}

/// CLI surface (§6): a single entrypoint starting the proxy with a config
/// path argument.
#[derive(Debug, clap::Parser)]
#[command(name = "proxy", version, about = "HTTP 402 reverse proxy")]
pub struct Cli {
    #[arg(long, default_value = "./proxy.toml")]
    pub config: std::path::PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
