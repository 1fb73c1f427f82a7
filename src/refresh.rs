use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, LIVE_CHAINS, PROTOCOL_SLUGS};
use crate::error::Result;
use crate::fetcher::LiveFetcher;
use crate::state::DatasetStore;
use crate::synthetic::SyntheticGenerator;
use crate::types::{DataSource, Dataset};

/// Why a refresh was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Interval,
    Manual,
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshTrigger::Startup => write!(f, "startup"),
            RefreshTrigger::Interval => write!(f, "interval"),
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetBuilder
// ---------------------------------------------------------------------------

/// Produces a complete `Dataset` from the configured source.
pub struct DatasetBuilder {
    cfg: Config,
    fetcher: Option<LiveFetcher>,
}

impl DatasetBuilder {
    pub fn new(cfg: Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let fetcher = match cfg.data_source {
            DataSource::Live => Some(LiveFetcher::from_config(&cfg)?.with_latency(latency)),
            DataSource::Synthetic => None,
        };
        Ok(Self { cfg, fetcher })
    }

    /// Protocol rows come from the configured source; pool and transaction
    /// tables are always synthetic since DefiLlama has no equivalent.
    pub async fn build(&self) -> Dataset {
        let mut generator = SyntheticGenerator::new(self.cfg.synthetic_seed);

        let (protocols, failed_series) = match &self.fetcher {
            Some(fetcher) => {
                let report = fetcher
                    .fetch_and_normalize(PROTOCOL_SLUGS, LIVE_CHAINS, self.cfg.history_days)
                    .await;
                (report.rows, report.failed_series)
            }
            None => (generator.generate_protocol_series(), 0),
        };

        Dataset {
            source: self.cfg.data_source,
            generated_at: Utc::now(),
            protocols,
            pools: generator.generate_pool_series(),
            transactions: generator.generate_transactions(self.cfg.transaction_count),
            failed_series,
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetRefresher
// ---------------------------------------------------------------------------

/// Rebuilds the dataset on request and on an optional interval.
///
/// At most one refresh runs at a time: a new trigger aborts the in-flight task,
/// which cancels its pending upstream requests. The store's generation check
/// covers the window where an aborted task has already built its dataset.
pub struct DatasetRefresher {
    builder: Arc<DatasetBuilder>,
    store: Arc<DatasetStore>,
    health: Arc<HealthState>,
    refresh_interval: Option<Duration>,
    rx: mpsc::Receiver<RefreshTrigger>,
    in_flight: Option<JoinHandle<()>>,
}

impl DatasetRefresher {
    pub fn new(
        builder: Arc<DatasetBuilder>,
        store: Arc<DatasetStore>,
        health: Arc<HealthState>,
        refresh_interval_secs: u64,
        rx: mpsc::Receiver<RefreshTrigger>,
    ) -> Self {
        Self {
            builder,
            store,
            health,
            refresh_interval: (refresh_interval_secs > 0).then(|| Duration::from_secs(refresh_interval_secs)),
            rx,
            in_flight: None,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = self.refresh_interval.map(|period| {
            let mut t = interval(period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        if let Some(t) = ticker.as_mut() {
            t.tick().await; // skip immediate first tick; startup already loaded
        }

        loop {
            let trigger = tokio::select! {
                req = self.rx.recv() => match req {
                    Some(trigger) => trigger,
                    None => break,
                },
                _ = next_tick(&mut ticker) => RefreshTrigger::Interval,
            };
            self.start(trigger);
        }

        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        info!("Refresh channel closed, refresher stopping");
    }

    /// Spawn a refresh, superseding whatever is running.
    fn start(&mut self, trigger: RefreshTrigger) {
        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                handle.abort();
                self.health.inc_superseded();
                info!(trigger = %trigger, "Superseding in-flight refresh");
            }
        }

        let generation = self.store.begin_refresh();
        let builder = Arc::clone(&self.builder);
        let store = Arc::clone(&self.store);
        let health = Arc::clone(&self.health);

        self.in_flight = Some(tokio::spawn(async move {
            run_refresh(&builder, &store, &health, generation, trigger).await;
        }));
    }
}

/// Build and publish one generation.
pub async fn run_refresh(
    builder: &DatasetBuilder,
    store: &DatasetStore,
    health: &HealthState,
    generation: u64,
    trigger: RefreshTrigger,
) {
    let dataset = builder.build().await;
    let (protocol_rows, pool_rows, tx_rows, failed) = (
        dataset.protocols.len(),
        dataset.pools.len(),
        dataset.transactions.len(),
        dataset.failed_series,
    );

    if store.publish(generation, dataset) {
        health.record_refresh(now_secs());
        info!(
            generation,
            trigger = %trigger,
            protocol_rows,
            pool_rows,
            tx_rows,
            failed_series = failed,
            "Dataset refreshed: {protocol_rows} protocol rows, {pool_rows} pool rows, {tx_rows} transactions",
        );
    } else {
        warn!(generation, "Discarding stale refresh result");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
