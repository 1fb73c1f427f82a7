mod aggregator;
mod api;
mod config;
mod error;
mod fetcher;
mod format;
mod refresh;
mod reshape;
mod state;
mod synthetic;
mod types;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::error::Result;
use crate::refresh::{run_refresh, DatasetBuilder, DatasetRefresher, RefreshTrigger};
use crate::state::DatasetStore;
use crate::types::DataSource;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        "Starting dashboard: source={} history_days={} transactions={}",
        cfg.data_source, cfg.history_days, cfg.transaction_count,
    );
    if cfg.data_source == DataSource::Live {
        info!(
            "Live source: {} (concurrency={}, timeout={}s)",
            cfg.llama_api_url, cfg.fetch_concurrency, cfg.fetch_timeout_secs,
        );
    }

    // --- Shared state ---
    let store = DatasetStore::new(cfg.data_source);
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Initial load, before the API accepts requests ---
    let builder = Arc::new(DatasetBuilder::new(cfg.clone(), Arc::clone(&latency))?);
    let generation = store.begin_refresh();
    run_refresh(&builder, &store, &health, generation, RefreshTrigger::Startup).await;

    let initial = store.snapshot();
    if initial.failed_series > 0 {
        warn!(
            "{} upstream series failed during startup; affected metrics render as gaps",
            initial.failed_series,
        );
    }

    // --- Background refresher ---
    let (refresh_tx, refresh_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let refresher = DatasetRefresher::new(
        Arc::clone(&builder),
        Arc::clone(&store),
        Arc::clone(&health),
        cfg.refresh_interval_secs,
        refresh_rx,
    );
    tokio::spawn(async move { refresher.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        health,
        latency,
        refresh_tx,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
