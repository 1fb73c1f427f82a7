use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::error::Result;
use crate::reshape::{
    breakdown_series, calendar_grid, normalize, tvl_series, BreakdownPayload, ChainSeries,
    DailySeries, ProtocolPayload,
};
use crate::types::MetricRow;

/// The four upstream series fetched per protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Tvl,
    Fees,
    Revenue,
    Volume,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 4] = [
        SeriesKind::Tvl,
        SeriesKind::Fees,
        SeriesKind::Revenue,
        SeriesKind::Volume,
    ];

    fn path(self, slug: &str) -> String {
        match self {
            SeriesKind::Tvl => format!("/protocol/{slug}"),
            SeriesKind::Fees => format!("/summary/fees/{slug}?dataType=dailyFees"),
            SeriesKind::Revenue => format!("/summary/fees/{slug}?dataType=dailyRevenue"),
            SeriesKind::Volume => format!(
                "/summary/dexs/{slug}?excludeTotalDataChart=true&excludeTotalDataChartBreakdown=false&dataType=dailyVolume"
            ),
        }
    }
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SeriesKind::Tvl => "tvl",
            SeriesKind::Fees => "fees",
            SeriesKind::Revenue => "revenue",
            SeriesKind::Volume => "volume",
        };
        write!(f, "{s}")
    }
}

/// Raw payloads for one protocol. `None` = the request failed or the body
/// didn't match the endpoint schema.
#[derive(Debug, Default)]
pub struct ProtocolPayloads {
    pub tvl: Option<ProtocolPayload>,
    pub fees: Option<BreakdownPayload>,
    pub revenue: Option<BreakdownPayload>,
    pub volume: Option<BreakdownPayload>,
}

/// Result of one live fetch: the normalized table plus how many
/// (protocol, chain, metric) series degraded to empty.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub rows: Vec<MetricRow>,
    pub failed_series: usize,
}

enum Fetched {
    Tvl(Option<ProtocolPayload>),
    Breakdown(SeriesKind, Option<BreakdownPayload>),
}

pub struct LiveFetcher {
    client: reqwest::Client,
    base_url: String,
    concurrency: usize,
    latency: Option<Arc<LatencyStats>>,
}

impl LiveFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration, concurrency: usize) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            concurrency: concurrency.max(1),
            latency: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.llama_api_url.clone(),
            Duration::from_secs(cfg.fetch_timeout_secs),
            cfg.fetch_concurrency,
        )
    }

    /// Record every upstream round trip into `stats`.
    pub fn with_latency(mut self, stats: Arc<LatencyStats>) -> Self {
        self.latency = Some(stats);
        self
    }

    /// Fetch every protocol in `protocols` (name, slug) and normalize each
    /// (protocol, chain) onto the grid ending today (UTC).
    pub async fn fetch_and_normalize(
        &self,
        protocols: &[(&str, &str)],
        chains: &[&str],
        days: i64,
    ) -> FetchReport {
        let today = Utc::now().date_naive();
        self.fetch_and_normalize_as_of(protocols, chains, days, today).await
    }

    pub async fn fetch_and_normalize_as_of(
        &self,
        protocols: &[(&str, &str)],
        chains: &[&str],
        days: i64,
        today: NaiveDate,
    ) -> FetchReport {
        let started = Instant::now();
        let mut payloads = self.fetch_all(protocols).await;
        let grid = calendar_grid(today, days);

        let mut report = FetchReport::default();
        for (i, (name, _)) in protocols.iter().enumerate() {
            let p = std::mem::take(&mut payloads[i]);
            for chain in chains {
                let (series, failed) = reshape_chain(name, chain, &p);
                report.failed_series += failed;
                report.rows.extend(normalize(name, chain, &grid, &series));
            }
        }

        info!(
            protocols = protocols.len(),
            chains = chains.len(),
            rows = report.rows.len(),
            failed_series = report.failed_series,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Live fetch complete: {} rows, {} degraded series",
            report.rows.len(),
            report.failed_series,
        );
        report
    }

    /// Issue all 4 × N requests with at most `concurrency` in flight.
    async fn fetch_all(&self, protocols: &[(&str, &str)]) -> Vec<ProtocolPayloads> {
        // Owned slugs keep the request futures `Send` for spawned refreshes.
        let requests: Vec<(usize, String, SeriesKind)> = protocols
            .iter()
            .enumerate()
            .flat_map(|(i, (_, slug))| {
                SeriesKind::ALL.into_iter().map(move |kind| (i, slug.to_string(), kind))
            })
            .collect();

        let results: Vec<(usize, Fetched)> = stream::iter(requests)
            .map(|(i, slug, kind)| async move {
                let fetched = match kind {
                    SeriesKind::Tvl => Fetched::Tvl(self.fetch_json(&slug, kind).await),
                    _ => Fetched::Breakdown(kind, self.fetch_json(&slug, kind).await),
                };
                (i, fetched)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut payloads: Vec<ProtocolPayloads> =
            protocols.iter().map(|_| ProtocolPayloads::default()).collect();
        for (i, fetched) in results {
            let slot = &mut payloads[i];
            match fetched {
                Fetched::Tvl(p) => slot.tvl = p,
                Fetched::Breakdown(SeriesKind::Fees, p) => slot.fees = p,
                Fetched::Breakdown(SeriesKind::Revenue, p) => slot.revenue = p,
                Fetched::Breakdown(_, p) => slot.volume = p,
            }
        }
        payloads
    }

    /// GET one endpoint and decode it. Every failure is logged and becomes `None`.
    async fn fetch_json<T: DeserializeOwned>(&self, slug: &str, kind: SeriesKind) -> Option<T> {
        let url = format!("{}{}", self.base_url, kind.path(slug));
        let started = Instant::now();
        let resp = self.client.get(&url).send().await;
        if let Some(stats) = &self.latency {
            stats.record(started.elapsed());
        }

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!(slug, metric = %kind, "Failed to fetch {kind} for {slug}: {e}");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(slug, metric = %kind, status = status.as_u16(), "Failed to fetch {kind} for {slug}: HTTP {status}");
            return None;
        }

        match resp.json::<T>().await {
            Ok(v) => {
                debug!(slug, metric = %kind, "Fetched {kind} for {slug}");
                Some(v)
            }
            Err(e) => {
                warn!(slug, metric = %kind, "Malformed {kind} payload for {slug}: {e}");
                None
            }
        }
    }
}

/// Reshape the payloads of one protocol for one chain. A missing payload or a
/// malformed chain entry gives an empty series; returns the count of such series.
pub fn reshape_chain(protocol: &str, chain: &str, p: &ProtocolPayloads) -> (ChainSeries, usize) {
    let mut failed = 0;
    let mut take = |kind: SeriesKind, result: Option<Result<DailySeries>>| match result {
        Some(Ok(series)) => series,
        Some(Err(e)) => {
            warn!(protocol, chain, metric = %kind, "Dropping malformed {kind} series for {protocol}/{chain}: {e}");
            failed += 1;
            DailySeries::new()
        }
        None => {
            failed += 1;
            DailySeries::new()
        }
    };

    let series = ChainSeries {
        tvl: take(SeriesKind::Tvl, p.tvl.as_ref().map(|x| tvl_series(x, chain))),
        fees: take(SeriesKind::Fees, p.fees.as_ref().map(|x| breakdown_series(x, chain))),
        revenue: take(SeriesKind::Revenue, p.revenue.as_ref().map(|x| breakdown_series(x, chain))),
        volume: take(SeriesKind::Volume, p.volume.as_ref().map(|x| breakdown_series(x, chain))),
    };
    (series, failed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-01-01T00:00:00Z
    const JAN_1: i64 = 1_704_067_200;
    const DAY: i64 = 86_400;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    fn breakdown_body(chain_lower: &str, values: &[(i64, f64)]) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = values
            .iter()
            .map(|(ts, v)| serde_json::json!([ts, { chain_lower: { "core": v } }]))
            .collect();
        serde_json::json!({ "totalDataChartBreakdown": entries })
    }

    async fn mount_breakdowns(server: &MockServer, slug: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/summary/fees/{slug}")))
            .and(query_param("dataType", "dailyFees"))
            .respond_with(ResponseTemplate::new(200).set_body_json(breakdown_body(
                "ethereum",
                &[(JAN_1, 10.0), (JAN_1 + DAY, 20.0), (JAN_1 + 2 * DAY, 30.0)],
            )))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/summary/fees/{slug}")))
            .and(query_param("dataType", "dailyRevenue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(breakdown_body(
                "ethereum",
                &[(JAN_1, 4.0), (JAN_1 + 2 * DAY, 6.0)],
            )))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/summary/dexs/{slug}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(breakdown_body(
                "ethereum",
                &[(JAN_1 + DAY, 1000.0)],
            )))
            .mount(server)
            .await;
    }

    fn fetcher(server: &MockServer) -> LiveFetcher {
        LiveFetcher::new(server.uri(), Duration::from_secs(5), 2).unwrap()
    }

    #[tokio::test]
    async fn tvl_outage_leaves_other_metrics_intact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protocol/aave"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_breakdowns(&server, "aave").await;

        let report = fetcher(&server)
            .fetch_and_normalize_as_of(&[("Aave", "aave")], &["Ethereum"], 2, today())
            .await;

        assert_eq!(report.rows.len(), 3);
        assert!(report.rows.iter().all(|r| r.tvl.is_none()));
        assert!(report.rows.iter().all(|r| r.fees.is_some() && r.revenue.is_some()));
        assert_eq!(report.rows[0].volume, None);
        assert_eq!(report.rows[1].volume, Some(1000.0));
        // volume forward-filled into day 3
        assert_eq!(report.rows[2].volume, Some(1000.0));
        // revenue forward-filled into day 2
        assert_eq!(report.rows[1].revenue, Some(4.0));
        assert_eq!(report.rows[1].expenses, Some(16.0));
        assert_eq!(report.failed_series, 1);
    }

    #[tokio::test]
    async fn everything_failing_still_yields_a_full_grid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let report = fetcher(&server)
            .fetch_and_normalize_as_of(&[("Aave", "aave"), ("Drift", "drift")], &["Ethereum", "Base"], 5, today())
            .await;

        // 2 protocols × 2 chains × 6 days
        assert_eq!(report.rows.len(), 24);
        assert!(report.rows.iter().all(|r| r.tvl.is_none() && r.fees.is_none()));
        assert_eq!(report.failed_series, 16);
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_empty_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protocol/aave"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        mount_breakdowns(&server, "aave").await;

        let report = fetcher(&server)
            .fetch_and_normalize_as_of(&[("Aave", "aave")], &["Ethereum"], 2, today())
            .await;

        assert!(report.rows.iter().all(|r| r.tvl.is_none()));
        assert_eq!(report.rows[2].fees, Some(30.0));
    }

    #[tokio::test]
    async fn tvl_is_read_per_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protocol/fluid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chainTvls": {
                    "Ethereum": { "tvl": [
                        { "date": JAN_1, "totalLiquidityUSD": 1.0e9 },
                        { "date": JAN_1 + 2 * DAY, "totalLiquidityUSD": 1.2e9 }
                    ]},
                    "Base": { "tvl": [{ "date": JAN_1 + DAY, "totalLiquidityUSD": 5.0e6 }] }
                }
            })))
            .mount(&server)
            .await;
        mount_breakdowns(&server, "fluid").await;

        let report = fetcher(&server)
            .fetch_and_normalize_as_of(&[("Fluid", "fluid")], &["Ethereum", "Base"], 2, today())
            .await;

        let eth: Vec<_> = report.rows.iter().filter(|r| r.chain == "Ethereum").map(|r| r.tvl).collect();
        let base: Vec<_> = report.rows.iter().filter(|r| r.chain == "Base").map(|r| r.tvl).collect();
        assert_eq!(eth, vec![Some(1.0e9), Some(1.0e9), Some(1.2e9)]);
        assert_eq!(base, vec![None, Some(5.0e6), Some(5.0e6)]);
        // the breakdown mocks only carry ethereum
        assert!(report.rows.iter().filter(|r| r.chain == "Base").all(|r| r.fees.is_none()));
    }

    #[test]
    fn missing_payloads_count_as_failed() {
        let (series, failed) = reshape_chain("Aave", "Ethereum", &ProtocolPayloads::default());
        assert_eq!(failed, 4);
        assert!(series.tvl.is_empty() && series.volume.is_empty());
    }
}
