//! Turns DefiLlama payloads into per-day series and joins them onto a calendar grid.
//!
//! Everything here is synchronous and pure; the fetcher owns the I/O.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::types::MetricRow;

/// Day → value. Later points on the same day overwrite earlier ones.
pub type DailySeries = BTreeMap<NaiveDate, f64>;

// ---------------------------------------------------------------------------
// Upstream schemas
// ---------------------------------------------------------------------------

/// `GET /protocol/{slug}`. Only the per-chain TVL history is read; the inner
/// chain objects are kept raw so one malformed chain can't poison the others.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolPayload {
    #[serde(default)]
    pub chain_tvls: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChainTvl {
    tvl: Vec<TvlPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvlPoint {
    date: f64,
    #[serde(rename = "totalLiquidityUSD")]
    total_liquidity_usd: Option<f64>,
}

/// `GET /summary/fees/{slug}` and `GET /summary/dexs/{slug}`: a list of
/// `[epoch_secs, {chain_lower: {component: value}}]` pairs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownPayload {
    #[serde(default)]
    pub total_data_chart_breakdown: Vec<(f64, HashMap<String, serde_json::Value>)>,
}

// ---------------------------------------------------------------------------
// Reshaping
// ---------------------------------------------------------------------------

/// Convert Unix epoch seconds to a UTC calendar day.
pub fn epoch_to_date(secs: f64) -> Option<NaiveDate> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs.floor() as i64, 0).map(|dt| dt.date_naive())
}

/// Per-day TVL for one chain. A chain missing from `chainTvls` is an empty
/// series, not an error; a chain entry with the wrong shape is an error.
pub fn tvl_series(payload: &ProtocolPayload, chain: &str) -> Result<DailySeries> {
    let Some(raw) = payload.chain_tvls.get(chain) else {
        return Ok(DailySeries::new());
    };
    let parsed: ChainTvl = serde_json::from_value(raw.clone())?;

    let mut series = DailySeries::new();
    for point in parsed.tvl {
        let Some(value) = point.total_liquidity_usd else { continue };
        let date = epoch_to_date(point.date)
            .ok_or_else(|| AppError::Payload(format!("TVL timestamp out of range: {}", point.date)))?;
        series.insert(date, value);
    }
    Ok(series)
}

/// Per-day sum over all components of one chain in a fees/revenue/volume breakdown.
/// Days where the chain is absent or has no components are skipped.
pub fn breakdown_series(payload: &BreakdownPayload, chain: &str) -> Result<DailySeries> {
    let key = chain.to_lowercase();
    let mut series = DailySeries::new();

    for (timestamp, by_chain) in &payload.total_data_chart_breakdown {
        let components: HashMap<String, f64> = match by_chain.get(&key) {
            None | Some(serde_json::Value::Null) => continue,
            Some(raw) => serde_json::from_value(raw.clone())?,
        };
        if components.is_empty() {
            continue;
        }
        let date = epoch_to_date(*timestamp)
            .ok_or_else(|| AppError::Payload(format!("breakdown timestamp out of range: {timestamp}")))?;
        series.insert(date, components.values().sum());
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// Calendar grid
// ---------------------------------------------------------------------------

/// Every day in `[end - days, end]`, ascending. Both ends are included.
/// A span reaching past the earliest representable date yields an empty grid.
pub fn calendar_grid(end: NaiveDate, days: i64) -> Vec<NaiveDate> {
    let Some(start) = end.checked_sub_days(Days::new(days.max(0) as u64)) else {
        return Vec::new();
    };
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Propagate the last seen value over later gaps. Leading gaps stay `None`.
pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for slot in values.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
}

/// Look each grid day up in `series`, then forward-fill.
fn join_column(grid: &[NaiveDate], series: &DailySeries) -> Vec<Option<f64>> {
    let mut column: Vec<Option<f64>> = grid.iter().map(|d| series.get(d).copied()).collect();
    forward_fill(&mut column);
    column
}

/// The four reshaped series for one (protocol, chain).
#[derive(Debug, Default, Clone)]
pub struct ChainSeries {
    pub tvl: DailySeries,
    pub fees: DailySeries,
    pub revenue: DailySeries,
    pub volume: DailySeries,
}

/// Left-join the four series onto `grid`, forward-fill each column and derive
/// `expenses = fees - revenue`. Exactly one row per grid day.
pub fn normalize(protocol: &str, chain: &str, grid: &[NaiveDate], series: &ChainSeries) -> Vec<MetricRow> {
    let tvl = join_column(grid, &series.tvl);
    let fees = join_column(grid, &series.fees);
    let revenue = join_column(grid, &series.revenue);
    let volume = join_column(grid, &series.volume);

    grid.iter()
        .enumerate()
        .map(|(i, date)| MetricRow {
            date: *date,
            protocol: protocol.to_string(),
            chain: chain.to_string(),
            tvl: tvl[i],
            fees: fees[i],
            revenue: revenue[i],
            expenses: match (fees[i], revenue[i]) {
                (Some(f), Some(r)) => Some(f - r),
                _ => None,
            },
            volume: volume[i],
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
