use std::collections::BTreeMap;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct FiltersResponse {
    pub source: String,
    pub protocols: Vec<String>,
    pub chains: Vec<String>,
    pub versions: Vec<String>,
    pub metrics: Vec<String>,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct SummaryResponse {
    pub as_of: Option<String>,
    pub total_tvl: f64,
    pub total_fees: f64,
    pub total_revenue: f64,
    pub total_volume: f64,
    pub active_chains: usize,
    pub active_protocols: usize,
    pub total_tvl_display: String,
    pub total_fees_display: String,
    pub total_revenue_display: String,
    pub total_volume_display: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct SeriesResponse {
    pub data_type: String,
    pub metrics: Vec<String>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ChainShare {
    pub chain: String,
    pub value: f64,
    pub value_display: String,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct ChainsResponse {
    pub data_type: String,
    pub metric: String,
    pub chains: Vec<ChainShare>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct TransactionView {
    pub timestamp: String,
    pub protocol: String,
    pub chain: String,
    pub wallet_address: String,
    pub action: String,
    pub amount_usd: String,
    pub gas_fee_usd: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
    pub source: String,
    pub generated_at: String,
    pub generation: u64,
    pub refresh_pending: bool,
    pub last_refresh_at_secs: u64,
    pub refreshes_completed: u64,
    pub refreshes_superseded: u64,
    pub failed_series: usize,
    pub protocol_rows: usize,
    pub pool_rows: usize,
    pub transaction_rows: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct LatencyResponse {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: Option<i64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

pub const METRICS: [&str; 5] = ["tvl", "fees", "revenue", "expenses", "volume"];
pub const DATA_TYPES: [&str; 3] = ["protocol", "pool", "transaction"];

/// Sidebar selections. `protocol == None` means every protocol.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub protocol: Option<usize>,
    /// (chain, selected); populated from GET /filters.
    pub chains: Vec<(String, bool)>,
    pub data_type: usize,
    pub metric: usize,
}

impl Filters {
    pub fn metric(&self) -> &'static str {
        METRICS[self.metric % METRICS.len()]
    }

    pub fn data_type(&self) -> &'static str {
        DATA_TYPES[self.data_type % DATA_TYPES.len()]
    }

    /// The recent transactions listing belongs to the transaction view only.
    pub fn shows_transactions(&self) -> bool {
        self.data_type() == "transaction"
    }

    /// Query pairs shared by the chart endpoints.
    pub fn query(&self, protocols: &[String]) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if let Some(name) = self.protocol.and_then(|i| protocols.get(i)) {
            q.push(("protocol", name.clone()));
        }
        if !self.chains.is_empty() {
            let selected: Vec<&str> = self
                .chains
                .iter()
                .filter(|(_, on)| *on)
                .map(|(c, _)| c.as_str())
                .collect();
            q.push(("chains", selected.join(",")));
        }
        q
    }

    pub fn cycle_protocol(&mut self, count: usize) {
        self.protocol = match self.protocol {
            None if count > 0 => Some(0),
            Some(i) if i + 1 < count => Some(i + 1),
            _ => None,
        };
    }

    pub fn toggle_chain(&mut self, idx: usize) {
        if let Some((_, on)) = self.chains.get_mut(idx) {
            *on = !*on;
        }
    }

    /// Adopt the server's chain list, keeping existing toggles by name.
    pub fn sync_chains(&mut self, chains: &[String]) {
        let previous = std::mem::take(&mut self.chains);
        self.chains = chains
            .iter()
            .map(|c| {
                let on = previous.iter().find(|(p, _)| p == c).map_or(true, |(_, on)| *on);
                (c.clone(), on)
            })
            .collect();
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub filters: Filters,
    pub available: FiltersResponse,
    pub summary: SummaryResponse,
    pub series: SeriesResponse,
    pub chains: ChainsResponse,
    pub transactions: Vec<TransactionView>,
    pub health: HealthResponse,
    pub latency: LatencyResponse,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            filters: Filters::default(),
            available: FiltersResponse::default(),
            summary: SummaryResponse::default(),
            series: SeriesResponse::default(),
            chains: ChainsResponse::default(),
            transactions: Vec::new(),
            health: HealthResponse::default(),
            latency: LatencyResponse::default(),
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    pub fn selected_protocol(&self) -> &str {
        self.filters
            .protocol
            .and_then(|i| self.available.protocols.get(i))
            .map_or("All protocols", |p| p.as_str())
    }

    /// Ask the server to rebuild its dataset. The next refresh picks it up.
    pub async fn request_rebuild(&mut self, client: &reqwest::Client) {
        let url = format!("{}/refresh", self.base_url);
        if let Err(e) = client.post(&url).send().await {
            self.status = ConnectionStatus::Error(format!("{e}"));
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let filters_url = format!("{}/filters", self.base_url);
        match client.get(&filters_url).send().await {
            Ok(resp) => match resp.json::<FiltersResponse>().await {
                Ok(f) => {
                    self.filters.sync_chains(&f.chains);
                    if self.filters.protocol.is_some_and(|i| i >= f.protocols.len()) {
                        self.filters.protocol = None;
                    }
                    self.available = f;
                }
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                    return;
                }
            },
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        }

        let base = self.filters.query(&self.available.protocols);
        let data_type = self.filters.data_type();
        let metric = self.filters.metric();

        let mut series_q = base.clone();
        series_q.push(("metrics", metric.to_string()));
        series_q.push(("data_type", data_type.to_string()));
        let mut chains_q = base.clone();
        chains_q.push(("metric", metric.to_string()));
        chains_q.push(("data_type", data_type.to_string()));

        let url = |path: &str| format!("{}{}", self.base_url, path);
        let (summary_res, series_res, chains_res, tx_res, health_res, latency_res) = tokio::join!(
            client.get(url("/summary")).query(&base).send(),
            client.get(url("/series")).query(&series_q).send(),
            client.get(url("/chains")).query(&chains_q).send(),
            client.get(url("/transactions/recent")).query(&base).send(),
            client.get(url("/health")).send(),
            client.get(url("/stats/latency")).send(),
        );

        let (summary_res, series_res, chains_res, tx_res) = match (summary_res, series_res, chains_res, tx_res) {
            (Ok(s), Ok(se), Ok(c), Ok(t)) => (s, se, c, t),
            (Err(e), _, _, _) | (_, Err(e), _, _) | (_, _, Err(e), _) | (_, _, _, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (summary, series, chains, transactions) = tokio::join!(
            summary_res.json::<SummaryResponse>(),
            series_res.json::<SeriesResponse>(),
            chains_res.json::<ChainsResponse>(),
            tx_res.json::<Vec<TransactionView>>(),
        );

        match (summary, series, chains, transactions) {
            (Ok(s), Ok(se), Ok(c), Ok(t)) => {
                self.summary = s;
                self.series = se;
                self.chains = c;
                self.transactions = t;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();

                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
                if let Ok(l) = latency_res {
                    if let Ok(latency) = l.json::<LatencyResponse>().await {
                        self.latency = latency;
                    }
                }
            }
            (Err(e), _, _, _) | (_, Err(e), _, _) | (_, _, Err(e), _) | (_, _, _, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }

    /// Series values for the selected metric, scaled to u64 for the sparkline.
    pub fn sparkline_data(&self) -> Vec<u64> {
        let metric = self.filters.metric();
        self.series
            .points
            .iter()
            .map(|p| p.values.get(metric).copied().unwrap_or(0.0).max(0.0) as u64)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_share(pct: f64) -> String {
    format!("{pct:.1}%")
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[allow(dead_code)]
fn main() {
    // Helpers for the tui binary; entry point lives in src/bin/tui.rs
}
