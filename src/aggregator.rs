use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::format::{elide_hex, format_usd};
use crate::types::{Metric, MetricRecord, TransactionRow};

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Filter state coming from the display layer. `chains = None` means every
/// chain; `Some(vec![])` means none.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub protocol: Option<String>,
    pub chains: Option<Vec<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Pool version; `None` or "all" keeps every version.
    pub version: Option<String>,
}

impl Selection {
    fn protocol_matches(&self, protocol: &str) -> bool {
        self.protocol.as_deref().map_or(true, |p| p == protocol)
    }

    fn chain_matches(&self, chain: &str) -> bool {
        self.chains
            .as_ref()
            .map_or(true, |cs| cs.iter().any(|c| c == chain))
    }

    fn version_matches(&self, version: Option<&str>) -> bool {
        match (self.version.as_deref(), version) {
            (None, _) | (Some("all"), _) | (_, None) => true,
            (Some(want), Some(have)) => want == have,
        }
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn matches<R: MetricRecord>(&self, row: &R) -> bool {
        self.protocol_matches(row.protocol())
            && self.chain_matches(row.chain())
            && self.version_matches(row.version())
            && self.date_matches(row.date())
    }

    pub fn apply<'a, R: MetricRecord>(&self, rows: &'a [R]) -> Vec<&'a R> {
        rows.iter().filter(|r| self.matches(*r)).collect()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Latest date present in the input; `None` when the input is empty.
    pub as_of: Option<NaiveDate>,
    pub total_tvl: f64,
    pub total_fees: f64,
    pub total_revenue: f64,
    pub total_volume: f64,
    pub active_chains: usize,
    pub active_protocols: usize,
}

/// Totals over the rows dated on the latest date in `rows`. Missing values are
/// skipped; empty input gives an all-zero summary.
pub fn summarize<R: MetricRecord>(rows: &[&R]) -> Summary {
    let Some(as_of) = rows.iter().map(|r| r.date()).max() else {
        return Summary::default();
    };

    let latest: Vec<&&R> = rows.iter().filter(|r| r.date() == as_of).collect();
    let total = |m: Metric| latest.iter().filter_map(|r| r.metric(m)).sum::<f64>();

    Summary {
        as_of: Some(as_of),
        total_tvl: total(Metric::Tvl),
        total_fees: total(Metric::Fees),
        total_revenue: total(Metric::Revenue),
        total_volume: total(Metric::Volume),
        active_chains: latest.iter().map(|r| r.chain()).collect::<BTreeSet<_>>().len(),
        active_protocols: latest.iter().map(|r| r.protocol()).collect::<BTreeSet<_>>().len(),
    }
}

/// Metric cards: the selection's protocol and chains, as of the latest date on
/// or before `selection.end`. The start date is ignored.
pub fn summarize_selection<R: MetricRecord>(rows: &[R], selection: &Selection) -> Summary {
    let scoped = Selection {
        start: None,
        ..selection.clone()
    };
    summarize(&scoped.apply(rows))
}

// ---------------------------------------------------------------------------
// Chart aggregations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<Metric, f64>,
}

/// Sum each metric per date, ascending by date.
pub fn time_series<R: MetricRecord>(rows: &[&R], metrics: &[Metric]) -> Vec<SeriesPoint> {
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<Metric, f64>> = BTreeMap::new();
    for row in rows {
        let values = by_date.entry(row.date()).or_default();
        for &m in metrics {
            *values.entry(m).or_default() += row.metric(m).unwrap_or(0.0);
        }
    }
    by_date
        .into_iter()
        .map(|(date, values)| SeriesPoint { date, values })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainShare {
    pub chain: String,
    pub value: f64,
    /// Percentage of the total across returned chains (0 when the total is 0).
    pub share_pct: f64,
}

/// Per-chain totals of `metric`, largest first.
pub fn chain_breakdown<R: MetricRecord>(rows: &[&R], metric: Metric) -> Vec<ChainShare> {
    let mut by_chain: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *by_chain.entry(row.chain()).or_default() += row.metric(metric).unwrap_or(0.0);
    }

    let total: f64 = by_chain.values().sum();
    let mut shares: Vec<ChainShare> = by_chain
        .into_iter()
        .map(|(chain, value)| ChainShare {
            chain: chain.to_string(),
            value,
            share_pct: if total != 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();
    shares.sort_by(|a, b| b.value.total_cmp(&a.value));
    shares
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A transaction formatted for the listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
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

impl From<&TransactionRow> for TransactionView {
    fn from(tx: &TransactionRow) -> Self {
        Self {
            timestamp: tx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            protocol: tx.protocol.clone(),
            chain: tx.chain.clone(),
            wallet_address: elide_hex(&tx.wallet_address),
            action: tx.action.to_string(),
            amount_usd: format_usd(tx.amount_usd),
            gas_fee_usd: format_usd(tx.gas_fee_usd),
            transaction_hash: elide_hex(&tx.transaction_hash),
        }
    }
}

/// Newest `limit` transactions matching the selection's protocol and chains.
pub fn recent_transactions(txs: &[TransactionRow], selection: &Selection, limit: usize) -> Vec<TransactionView> {
    let mut matching: Vec<&TransactionRow> = txs
        .iter()
        .filter(|tx| selection.protocol_matches(&tx.protocol) && selection.chain_matches(&tx.chain))
        .collect();
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matching.into_iter().take(limit).map(TransactionView::from).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, MetricRow, PoolRow};
    use chrono::{DateTime, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(d: u32, protocol: &str, chain: &str, tvl: Option<f64>) -> MetricRow {
        MetricRow {
            date: day(d),
            protocol: protocol.to_string(),
            chain: chain.to_string(),
            tvl,
            fees: Some(10.0),
            revenue: Some(4.0),
            expenses: Some(6.0),
            volume: None,
        }
    }

    fn table() -> Vec<MetricRow> {
        vec![
            row(1, "Aave", "Ethereum", Some(100.0)),
            row(1, "Aave", "Base", Some(50.0)),
            row(2, "Aave", "Ethereum", Some(110.0)),
            row(2, "Aave", "Base", None),
            row(2, "Drift", "Solana", Some(30.0)),
            row(3, "Drift", "Solana", Some(35.0)),
        ]
    }

    fn all(rows: &[MetricRow]) -> Vec<&MetricRow> {
        rows.iter().collect()
    }

    #[test]
    fn summary_uses_only_latest_date() {
        let rows = table();
        let s = summarize(&all(&rows));
        assert_eq!(s.as_of, Some(day(3)));
        assert_eq!(s.total_tvl, 35.0);
        assert_eq!(s.total_fees, 10.0);
        assert_eq!(s.active_chains, 1);
        assert_eq!(s.active_protocols, 1);
    }

    #[test]
    fn summary_tvl_equals_sum_on_max_date() {
        let rows = table();
        let selection = Selection {
            protocol: Some("Aave".to_string()),
            ..Default::default()
        };
        let s = summarize_selection(&rows, &selection);
        let expected: f64 = rows
            .iter()
            .filter(|r| r.protocol == "Aave" && r.date == day(2))
            .filter_map(|r| r.tvl)
            .sum();
        assert_eq!(s.total_tvl, expected);
        assert_eq!(s.active_chains, 2);
        assert_eq!(s.total_volume, 0.0);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let rows: Vec<MetricRow> = Vec::new();
        assert_eq!(summarize(&all(&rows)), Summary::default());
    }

    #[test]
    fn zero_chains_selected_is_zero_not_error() {
        let rows = table();
        let selection = Selection {
            chains: Some(Vec::new()),
            ..Default::default()
        };
        let s = summarize_selection(&rows, &selection);
        assert_eq!(s.total_tvl, 0.0);
        assert_eq!(s.total_fees, 0.0);
        assert_eq!(s.total_revenue, 0.0);
        assert_eq!(s.total_volume, 0.0);
        assert_eq!(s.active_chains, 0);
        assert_eq!(s.as_of, None);
    }

    #[test]
    fn end_date_caps_the_summary() {
        let rows = table();
        let selection = Selection {
            end: Some(day(1)),
            start: Some(day(3)),
            ..Default::default()
        };
        let s = summarize_selection(&rows, &selection);
        assert_eq!(s.as_of, Some(day(1)));
        assert_eq!(s.total_tvl, 150.0);
    }

    #[test]
    fn time_series_sums_by_date() {
        let rows = table();
        let selection = Selection {
            chains: Some(vec!["Ethereum".to_string(), "Base".to_string()]),
            ..Default::default()
        };
        let points = time_series(&selection.apply(&rows), &[Metric::Tvl, Metric::Fees]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].values[&Metric::Tvl], 150.0);
        assert_eq!(points[1].values[&Metric::Tvl], 110.0);
        assert_eq!(points[1].values[&Metric::Fees], 20.0);
        assert!(!points[0].values.contains_key(&Metric::Volume));
    }

    #[test]
    fn chain_breakdown_sorted_with_shares() {
        let rows = table();
        let shares = chain_breakdown(&all(&rows), Metric::Tvl);
        assert_eq!(shares[0].chain, "Ethereum");
        assert_eq!(shares[0].value, 210.0);
        let pct: f64 = shares.iter().map(|s| s.share_pct).sum();
        assert!((pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn chain_breakdown_with_zero_total() {
        let rows = table();
        let shares = chain_breakdown(&all(&rows), Metric::Volume);
        assert!(shares.iter().all(|s| s.value == 0.0 && s.share_pct == 0.0));
    }

    #[test]
    fn pool_version_filter() {
        let pool = |version: &str, tvl: f64| PoolRow {
            date: day(1),
            protocol: "Uniswap".to_string(),
            chain: "Base".to_string(),
            pool_name: "ETH-USDC".to_string(),
            version: version.to_string(),
            tvl,
            fees: 1.0,
            volume: 2.0,
            utilization_rate: None,
            supply_rate: None,
            borrow_rate: None,
        };
        let pools = vec![pool("v2", 1.0), pool("v3", 2.0)];

        let v3 = Selection { version: Some("v3".to_string()), ..Default::default() };
        assert_eq!(v3.apply(&pools).len(), 1);
        let any = Selection { version: Some("all".to_string()), ..Default::default() };
        assert_eq!(any.apply(&pools).len(), 2);
        // pools have no revenue
        assert_eq!(summarize(&any.apply(&pools)).total_revenue, 0.0);
    }

    #[test]
    fn recent_transactions_newest_first_and_elided() {
        let tx = |secs: i64, protocol: &str| TransactionRow {
            timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            protocol: protocol.to_string(),
            chain: "Ethereum".to_string(),
            wallet_address: format!("0xabcd{}1234", "0".repeat(32)),
            action: Action::Swap,
            amount_usd: 1234.5,
            gas_fee_usd: 7.0,
            transaction_hash: format!("0x{}", "e".repeat(64)),
        };
        let txs: Vec<TransactionRow> = (0..15).map(|i| tx(1_704_067_200 + i * 60, "Uniswap")).chain([tx(1_800_000_000, "Aave")]).collect();

        let selection = Selection {
            protocol: Some("Uniswap".to_string()),
            ..Default::default()
        };
        let views = recent_transactions(&txs, &selection, 10);
        assert_eq!(views.len(), 10);
        assert_eq!(views[0].timestamp, "2024-01-01 00:14:00");
        assert_eq!(views[0].wallet_address, "0xabcd...1234");
        assert_eq!(views[0].amount_usd, "$1234.50");
        assert!(views.iter().all(|v| v.protocol == "Uniswap"));
    }
}
