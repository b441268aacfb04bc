//! location-sync - keeps secondary fleet locations in line with the telematics platform
//!
//! Polls MyGeotab (authoritative) and Ruckit (secondary) on a fixed interval,
//! compares device coordinates and posts corrections to Ruckit.
//!
//! Module structure:
//! - `domain/` - Core types (mappings, locations, cycle summaries, errors)
//! - `io/` - External interfaces (Geotab, Ruckit, Prometheus)
//! - `services/` - Reconciliation (Resolver, Fetcher, Detector, Updater, Scheduler)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::{bail, Context};
use clap::Parser;
use location_sync::infra::{Config, Metrics};
use location_sync::io::{
    AuthoritativePlatform, GeotabClient, GeotabConfig, RuckitClient, RuckitConfig, SecondaryPlatform,
};
use location_sync::services::{SyncScheduler, SyncSettings};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Fleet location reconciler between MyGeotab and Ruckit
#[derive(Parser, Debug)]
#[command(name = "location-sync", version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"), about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single sync cycle and exit
    #[arg(long)]
    once: bool,

    /// Detect and log discrepancies without posting corrections
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "location-sync starting");

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);
    if args.dry_run {
        config = config.with_dry_run(true);
    }

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        geotab_url = %config.geotab_url(),
        geotab_database = %config.geotab_database(),
        ruckit_url = %config.ruckit_url(),
        interval_secs = %config.sync_interval_secs(),
        tolerance = %config.tolerance(),
        max_concurrency = %config.max_concurrency(),
        dry_run = %config.dry_run(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        warn!(missing = ?missing, "geotab_credentials_incomplete");
    }

    let geotab = GeotabClient::new(GeotabConfig::from_config(&config))
        .context("Failed to build Geotab client")?;
    let ruckit = RuckitClient::new(RuckitConfig::from_config(&config))
        .context("Failed to build Ruckit client")?;

    // Fail fast on bad credentials; later failures are retried every cycle
    geotab.authenticate().await.context("Initial Geotab authentication failed")?;

    let authoritative: Arc<dyn AuthoritativePlatform> = Arc::new(geotab);
    let secondary: Arc<dyn SecondaryPlatform> = Arc::new(ruckit);
    let metrics = Arc::new(Metrics::new());
    let scheduler = Arc::new(SyncScheduler::new(
        SyncSettings::from_config(&config),
        authoritative,
        secondary,
        metrics.clone(),
    ));

    if args.once {
        let summary = scheduler.run_cycle().await;
        if summary.aborted {
            bail!("sync cycle aborted: {}", summary.error.unwrap_or_default());
        }
        return Ok(());
    }

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let site_id = config.site_id().to_string();
        let state_rx = scheduler.subscribe_state();
        let prom_shutdown = scheduler.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = location_sync::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                site_id,
                state_rx,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Start metrics reporter (lock-free reads)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = scheduler.shutdown_signal();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick fires immediately; skip it so the first report has data
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics_clone.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    let handle = scheduler.start()?;

    // Handle shutdown on Ctrl+C
    let stopper = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        stopper.stop();
    });

    handle.await.context("Scheduler task failed")?;

    metrics.report().log();
    info!("location-sync shutdown complete");
    Ok(())
}
