use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::aggregator::{
    chain_breakdown, recent_transactions, summarize_selection, time_series, ChainShare, Selection,
    SeriesPoint, Summary, TransactionView,
};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::RECENT_TRANSACTIONS_LIMIT;
use crate::error::AppError;
use crate::format::format_currency;
use crate::refresh::RefreshTrigger;
use crate::state::DatasetStore;
use crate::types::{DataType, Dataset, Metric};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<DatasetStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub refresh_tx: mpsc::Sender<RefreshTrigger>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/filters", get(get_filters))
        .route("/summary", get(get_summary))
        .route("/series", get(get_series))
        .route("/chains", get(get_chains))
        .route("/transactions/recent", get(get_recent_transactions))
        .route("/refresh", post(post_refresh))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

/// Filter parameters shared by the chart endpoints. All optional; `chains`
/// is comma-separated and an empty value selects no chains.
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub protocol: Option<String>,
    pub chains: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub metrics: Option<String>,
    pub metric: Option<String>,
    pub data_type: Option<String>,
    pub version: Option<String>,
    pub limit: Option<usize>,
}

impl FilterQuery {
    pub fn selection(&self) -> Result<Selection, AppError> {
        Ok(Selection {
            protocol: self.protocol.clone().filter(|p| !p.is_empty()),
            chains: self.chains.as_deref().map(parse_list),
            start: parse_date(self.start_date.as_deref(), "start_date")?,
            end: parse_date(self.end_date.as_deref(), "end_date")?,
            version: self.version.clone().filter(|v| !v.is_empty()),
        })
    }

    /// Selected metrics; defaults to tvl, fees, revenue like the dashboard checklist.
    pub fn metrics(&self) -> Result<Vec<Metric>, AppError> {
        match self.metrics.as_deref() {
            None => Ok(vec![Metric::Tvl, Metric::Fees, Metric::Revenue]),
            Some(raw) => parse_list(raw)
                .iter()
                .map(|m| m.parse::<Metric>().map_err(AppError::InvalidQuery))
                .collect(),
        }
    }

    /// Single metric for the chain charts: `metric`, else the first of `metrics`, else tvl.
    pub fn primary_metric(&self) -> Result<Metric, AppError> {
        if let Some(m) = self.metric.as_deref() {
            return m.parse::<Metric>().map_err(AppError::InvalidQuery);
        }
        Ok(self.metrics()?.first().copied().unwrap_or(Metric::Tvl))
    }

    pub fn data_type(&self) -> Result<DataType, AppError> {
        match self.data_type.as_deref() {
            None | Some("") => Ok(DataType::Protocol),
            Some(raw) => raw.parse::<DataType>().map_err(AppError::InvalidQuery),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::InvalidQuery(format!("{field} must be YYYY-MM-DD, got '{s}'"))),
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct FiltersResponse {
    pub source: String,
    pub protocols: Vec<String>,
    pub chains: Vec<String>,
    pub versions: Vec<String>,
    pub metrics: Vec<Metric>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub summary: Summary,
    pub total_tvl_display: String,
    pub total_fees_display: String,
    pub total_revenue_display: String,
    pub total_volume_display: String,
}

#[derive(Serialize)]
pub struct SeriesResponse {
    pub data_type: DataType,
    pub metrics: Vec<Metric>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Serialize)]
pub struct ChainShareView {
    #[serde(flatten)]
    pub share: ChainShare,
    pub value_display: String,
}

impl From<ChainShare> for ChainShareView {
    fn from(share: ChainShare) -> Self {
        Self {
            value_display: format_currency(share.value),
            share,
        }
    }
}

#[derive(Serialize)]
pub struct ChainsResponse {
    pub data_type: DataType,
    pub metric: Metric,
    pub chains: Vec<ChainShareView>,
}

#[derive(Serialize)]
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

#[derive(Serialize)]
pub struct LatencyResponse {
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub sample_count: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_filters(State(state): State<ApiState>) -> Json<FiltersResponse> {
    Json(filters(&state.store.snapshot()))
}

fn filters(dataset: &Dataset) -> FiltersResponse {
    let protocols: BTreeSet<&str> = dataset.protocols.iter().map(|r| r.protocol.as_str()).collect();
    let chains: BTreeSet<&str> = dataset.protocols.iter().map(|r| r.chain.as_str()).collect();
    let versions: BTreeSet<&str> = dataset.pools.iter().map(|r| r.version.as_str()).collect();

    FiltersResponse {
        source: dataset.source.to_string(),
        protocols: protocols.into_iter().map(String::from).collect(),
        chains: chains.into_iter().map(String::from).collect(),
        versions: versions.into_iter().map(String::from).collect(),
        metrics: Metric::ALL.to_vec(),
        min_date: dataset.protocols.iter().map(|r| r.date).min(),
        max_date: dataset.protocols.iter().map(|r| r.date).max(),
    }
}

/// Metric cards always summarize the protocol-level table.
async fn get_summary(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    let selection = params.selection()?;
    let dataset = state.store.snapshot();
    let summary = summarize_selection(&dataset.protocols, &selection);

    Ok(Json(SummaryResponse {
        total_tvl_display: format_currency(summary.total_tvl),
        total_fees_display: format_currency(summary.total_fees),
        total_revenue_display: format_currency(summary.total_revenue),
        total_volume_display: format_currency(summary.total_volume),
        summary,
    }))
}

async fn get_series(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<SeriesResponse>, AppError> {
    let selection = params.selection()?;
    let metrics = params.metrics()?;
    let data_type = params.data_type()?;
    let dataset = state.store.snapshot();

    let points = series_points(&dataset, &selection, &metrics, data_type);
    Ok(Json(SeriesResponse { data_type, metrics, points }))
}

async fn get_chains(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<ChainsResponse>, AppError> {
    let selection = params.selection()?;
    let metric = params.primary_metric()?;
    let data_type = params.data_type()?;
    let dataset = state.store.snapshot();

    let chains = chain_shares(&dataset, &selection, metric, data_type);
    Ok(Json(ChainsResponse { data_type, metric, chains }))
}

/// Transactions carry no daily metrics, so the transaction view charts the
/// pool table alongside its listing.
fn series_points(dataset: &Dataset, selection: &Selection, metrics: &[Metric], data_type: DataType) -> Vec<SeriesPoint> {
    match data_type {
        DataType::Protocol => time_series(&selection.apply(&dataset.protocols), metrics),
        DataType::Pool | DataType::Transaction => time_series(&selection.apply(&dataset.pools), metrics),
    }
}

fn chain_shares(dataset: &Dataset, selection: &Selection, metric: Metric, data_type: DataType) -> Vec<ChainShareView> {
    let shares = match data_type {
        DataType::Protocol => chain_breakdown(&selection.apply(&dataset.protocols), metric),
        DataType::Pool | DataType::Transaction => chain_breakdown(&selection.apply(&dataset.pools), metric),
    };
    shares.into_iter().map(ChainShareView::from).collect()
}

async fn get_recent_transactions(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let selection = params.selection()?;
    let limit = params.limit.unwrap_or(RECENT_TRANSACTIONS_LIMIT);
    let dataset = state.store.snapshot();
    Ok(Json(recent_transactions(&dataset.transactions, &selection, limit)))
}

async fn post_refresh(State(state): State<ApiState>) -> StatusCode {
    match state.refresh_tx.try_send(RefreshTrigger::Manual) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(_)) => {
            // a refresh is already queued and will supersede the running one
            StatusCode::ACCEPTED
        }
        Err(e) => {
            warn!("Refresh request dropped: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let dataset = state.store.snapshot();
    Json(HealthResponse {
        source: dataset.source.to_string(),
        generated_at: dataset.generated_at.to_rfc3339(),
        generation: state.store.published_generation(),
        refresh_pending: state.store.refresh_pending(),
        last_refresh_at_secs: state.health.last_refresh_at_secs(),
        refreshes_completed: state.health.refreshes_completed(),
        refreshes_superseded: state.health.refreshes_superseded(),
        failed_series: dataset.failed_series,
        protocol_rows: dataset.protocols.len(),
        pool_rows: dataset.pools.len(),
        transaction_rows: dataset.transactions.len(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(LatencyResponse {
        p50_ms: p50,
        p95_ms: p95,
        p99_ms: p99,
        sample_count: state.latency.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticGenerator;
    use crate::types::DataSource;
    use chrono::{DateTime, Utc};

    fn query(chains: Option<&str>) -> FilterQuery {
        FilterQuery {
            chains: chains.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn absent_chains_means_all_and_empty_means_none() {
        assert_eq!(query(None).selection().unwrap().chains, None);
        assert_eq!(query(Some("")).selection().unwrap().chains, Some(Vec::new()));
        assert_eq!(
            query(Some("Ethereum, Base")).selection().unwrap().chains,
            Some(vec!["Ethereum".to_string(), "Base".to_string()])
        );
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let q = FilterQuery { end_date: Some("2024/01/01".to_string()), ..Default::default() };
        assert!(matches!(q.selection(), Err(AppError::InvalidQuery(_))));

        let q = FilterQuery { metrics: Some("tvl,apy".to_string()), ..Default::default() };
        assert!(matches!(q.metrics(), Err(AppError::InvalidQuery(_))));

        let q = FilterQuery { data_type: Some("block".to_string()), ..Default::default() };
        assert!(matches!(q.data_type(), Err(AppError::InvalidQuery(_))));
    }

    #[test]
    fn metric_defaults() {
        assert_eq!(FilterQuery::default().metrics().unwrap(), vec![Metric::Tvl, Metric::Fees, Metric::Revenue]);
        assert_eq!(FilterQuery::default().primary_metric().unwrap(), Metric::Tvl);
        let q = FilterQuery { metrics: Some("volume,fees".to_string()), ..Default::default() };
        assert_eq!(q.primary_metric().unwrap(), Metric::Volume);
    }

    fn anchor() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-30T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn dataset() -> Dataset {
        let mut generator = SyntheticGenerator::anchored(Some(9), anchor());
        Dataset {
            protocols: generator.generate_protocol_series(),
            pools: generator.generate_pool_series(),
            ..Dataset::empty(DataSource::Synthetic)
        }
    }

    #[test]
    fn transaction_view_charts_pool_data() {
        let dataset = dataset();
        let selection = Selection::default();
        let metrics = [Metric::Tvl];

        let pool = series_points(&dataset, &selection, &metrics, DataType::Pool);
        let tx = series_points(&dataset, &selection, &metrics, DataType::Transaction);
        let protocol = series_points(&dataset, &selection, &metrics, DataType::Protocol);
        assert_eq!(tx, pool);
        assert_ne!(tx, protocol);

        let pool_chains = chain_shares(&dataset, &selection, Metric::Tvl, DataType::Pool);
        let tx_chains = chain_shares(&dataset, &selection, Metric::Tvl, DataType::Transaction);
        assert_eq!(
            tx_chains.iter().map(|c| &c.share).collect::<Vec<_>>(),
            pool_chains.iter().map(|c| &c.share).collect::<Vec<_>>()
        );
    }

    #[test]
    fn chain_shares_carry_formatted_values() {
        let view = ChainShareView::from(ChainShare {
            chain: "Base".to_string(),
            value: 2_500_000.0,
            share_pct: 25.0,
        });
        assert_eq!(view.value_display, "$2.50M");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["chain"], "Base");
        assert_eq!(json["value"], 2_500_000.0);
        assert_eq!(json["value_display"], "$2.50M");
    }

    #[test]
    fn filters_come_from_the_dataset() {
        let now = anchor();
        let dataset = dataset();
        let f = filters(&dataset);
        assert_eq!(f.protocols.len(), 5);
        assert_eq!(f.chains.len(), 5);
        assert_eq!(f.versions, vec!["v2", "v3", "v4"]);
        assert_eq!(f.max_date, Some(now.date_naive()));
    }
}
