mod admin;
mod app_error;
mod config;
mod cors;
mod dev_invoice_client;
mod engine;
mod freebie;
mod metrics;
mod ratelimit;
mod service_registry;
mod state;

use crate::config::Cli;
use crate::config::Config;
use crate::dev_invoice_client::DevInvoiceClient;
use crate::service_registry::ServiceRegistry;
use crate::state::AppState;
use anyhow::Context;
use anyhow::Result;
use axum::Router;
use clap::Parser;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;
use l402_challenger::Challenger;
use l402_challenger::ChallengerConfig;
use l402_common::clock::SystemClock;
use l402_hashmail::ActivityTracker;
use l402_hashmail::HashmailService;
use l402_hashmail::MailboxRegistry;
use l402_mint::Mint;
use l402_secret_store::DieselSecretStore;
use l402_secret_store::RetryConfig;
use opentelemetry::sdk::export::metrics::aggregation;
use opentelemetry::sdk::metrics::controllers;
use opentelemetry::sdk::metrics::processors;
use opentelemetry::sdk::metrics::selectors;
use opentelemetry_prometheus::PrometheusExporter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const HISTOGRAM_BUCKETS_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn build_exporter() -> PrometheusExporter {
    let controller = controllers::basic(processors::factory(
        selectors::simple::histogram(HISTOGRAM_BUCKETS_SECONDS.to_vec()),
        aggregation::cumulative_temporality_selector(),
    ))
    .build();
    opentelemetry_prometheus::exporter(controller).init()
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = ?err, "proxy exited with a fatal error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let services = config.compile_services()?;

    let clock = Arc::new(SystemClock);

    let pool = Pool::builder()
        .build(ConnectionManager::<PgConnection>::new(&config.database_url))
        .context("failed to build the database connection pool")?;
    let retry = RetryConfig {
        num_retries: config.store_num_retries,
        retry_delay: Duration::from_millis(config.store_retry_delay_ms),
    };
    let secret_store = Arc::new(DieselSecretStore::new(pool, retry));

    // See `dev_invoice_client`: no concrete Lightning node client is wired
    // here. Swap this for a real implementation of `InvoiceClient` before
    // taking production traffic.
    let invoice_client = Arc::new(DevInvoiceClient::new(Duration::from_secs(2)));
    let (challenger, mut fatal_rx) = Challenger::new(
        invoice_client,
        clock.clone(),
        ChallengerConfig {
            batch_size: config.historical_batch_size,
            initial_load_timeout: Duration::from_secs(config.initial_load_timeout_secs),
        },
    );

    let mint = Mint::new(secret_store, challenger.clone(), clock);

    let quit = tokio_util::sync::CancellationToken::new();

    let hashmail_registry = MailboxRegistry::new();
    let activity = Arc::new(ActivityTracker::new());

    let local_services: Vec<Box<dyn service_registry::LocalService>> =
        vec![Box::new(metrics::MetricsService), Box::new(admin::AdminService)];

    let blocklist = AppState::load_blocklist(&config);
    let app_state = Arc::new(AppState {
        mint,
        challenger: challenger.clone(),
        registry: ServiceRegistry::new(services, local_services),
        rate_limiters: Default::default(),
        freebies: Default::default(),
        blocklist: tokio::sync::RwLock::new(blocklist),
        hashmail_registry: hashmail_registry.clone(),
        activity: activity.clone(),
        exporter: build_exporter(),
        client: engine::build_upstream_client(),
    });

    let router = Router::new()
        .fallback(engine::proxy_handler)
        .with_state(app_state.clone());

    let shutdown_quit = quit.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_quit.cancel();
    });

    let server = axum::Server::bind(&config.listen_addr)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>());

    tracing::info!(addr = %config.listen_addr, "proxy listening");

    let hashmail_service =
        HashmailService::new(hashmail_registry, activity.clone(), config.hashmail_defaults());
    let hashmail_quit = quit.clone();
    let hashmail_addr = config.hashmail_listen_addr;
    let hashmail_server = tonic::transport::Server::builder()
        .add_service(hashmail_service.into_server())
        .serve_with_shutdown(hashmail_addr, async move { hashmail_quit.cancelled().await });

    tracing::info!(addr = %hashmail_addr, "hashmail relay listening");

    let sweep_quit = quit.clone();
    let sweep_interval = Duration::from_secs(config.activity_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (stream_id, state) in activity.sweep(sweep_interval) {
                        tracing::debug!(stream_id = %hex::encode(stream_id), ?state, "hashmail activity sweep");
                    }
                }
                _ = sweep_quit.cancelled() => break,
            }
        }
    });

    tokio::select! {
        result = server => {
            result.context("server exited unexpectedly")?;
        }
        result = hashmail_server => {
            result.context("hashmail server exited unexpectedly")?;
        }
        _ = quit.cancelled() => {
            tracing::info!("shutting down gracefully");
        }
        Some(fatal) = fatal_rx.recv() => {
            tracing::error!(error = %fatal, "fatal error from challenger background task");
            challenger.stop().await;
            return Err(anyhow::anyhow!(fatal));
        }
    }

    challenger.stop().await;
    Ok(())
}
