//! Randomized protocol, pool and transaction tables for demos and tests.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{SYNTHETIC_CHAINS, SYNTHETIC_HISTORY_DAYS, SYNTHETIC_PROTOCOLS};
use crate::reshape::calendar_grid;
use crate::types::{Action, MetricRow, PoolRow, TransactionRow};

/// (protocol, pool name, version)
pub const POOLS: &[(&str, &str, &str)] = &[
    ("Uniswap", "ETH-USDC", "v3"),
    ("Uniswap", "ETH-USDT", "v3"),
    ("Uniswap", "BTC-ETH", "v3"),
    ("Uniswap", "ETH-DAI", "v2"),
    ("Aave", "ETH Supply", "v3"),
    ("Aave", "USDC Supply", "v3"),
    ("Aave", "DAI Borrow", "v2"),
    ("Compound", "ETH Supply", "v3"),
    ("Compound", "USDC Borrow", "v3"),
    ("Curve", "3pool", "v2"),
    ("Curve", "stETH-ETH", "v2"),
    ("dYdX", "ETH-USD", "v4"),
];

const LENDING_PROTOCOLS: &[&str] = &["Aave", "Compound"];
const SWAP_ONLY_PROTOCOLS: &[&str] = &["Uniswap", "Curve"];
const DYDX_CHAINS: &[&str] = &["Ethereum", "Base"];

/// Chance that a (pool, chain) is missing on a given day.
const POOL_OMISSION_PROBABILITY: f64 = 0.4;

const HEX: &[u8] = b"0123456789abcdef";

pub struct SyntheticGenerator {
    rng: StdRng,
    now: DateTime<Utc>,
}

impl SyntheticGenerator {
    /// `seed = None` draws from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        Self::anchored(seed, Utc::now())
    }

    /// Generator whose calendar ends at `now`. Same seed and anchor give identical tables.
    pub fn anchored(seed: Option<u64>, now: DateTime<Utc>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng, now }
    }

    fn grid(&self) -> Vec<NaiveDate> {
        calendar_grid(self.now.date_naive(), SYNTHETIC_HISTORY_DAYS)
    }

    /// Linear drift centred on the middle of the grid.
    fn trend(i: usize, n: usize) -> f64 {
        1.0 + 0.001 * (i as f64 - n as f64 / 2.0)
    }

    /// Per-chain allocation is drawn independently per (protocol, chain) and
    /// not normalized, so chain rows do not add back up to the protocol base.
    pub fn generate_protocol_series(&mut self) -> Vec<MetricRow> {
        let grid = self.grid();
        let n = grid.len();
        let mut rows = Vec::with_capacity(n * SYNTHETIC_PROTOCOLS.len() * SYNTHETIC_CHAINS.len());

        for protocol in SYNTHETIC_PROTOCOLS {
            let base_tvl = self.rng.gen_range(1.0e8..5.0e9);
            let base_fees = self.rng.gen_range(5.0e4..2.0e6);
            let revenue_share = self.rng.gen_range(0.1..0.6);
            let base_volume = self.rng.gen_range(1.0e7..1.0e9);

            let allocations: Vec<f64> = SYNTHETIC_CHAINS
                .iter()
                .map(|_| self.rng.gen_range(0.05..0.6))
                .collect();

            for (i, date) in grid.iter().enumerate() {
                let trend = Self::trend(i, n);
                for (chain, share) in SYNTHETIC_CHAINS.iter().zip(&allocations) {
                    let tvl = base_tvl * trend * share * self.rng.gen_range(0.95..1.05);
                    let fees = base_fees * trend * share * self.rng.gen_range(0.9..1.1);
                    let revenue = fees * revenue_share * self.rng.gen_range(0.9..1.1);
                    let volume = base_volume * trend * share * self.rng.gen_range(0.85..1.15);

                    rows.push(MetricRow {
                        date: *date,
                        protocol: protocol.to_string(),
                        chain: chain.to_string(),
                        tvl: Some(tvl),
                        fees: Some(fees),
                        revenue: Some(revenue),
                        expenses: Some(fees - revenue),
                        volume: Some(volume),
                    });
                }
            }
        }
        rows
    }

    pub fn generate_pool_series(&mut self) -> Vec<PoolRow> {
        let grid = self.grid();
        let n = grid.len();
        let mut rows = Vec::new();

        for &(protocol, pool_name, version) in POOLS {
            let is_supply = pool_name.contains("Supply");
            let is_borrow = pool_name.contains("Borrow");
            let is_lending = LENDING_PROTOCOLS.contains(&protocol);

            let base_tvl = self.rng.gen_range(1.0e7..5.0e8);
            let base_fees = self.rng.gen_range(5.0e3..1.0e5);
            let base_volume = self.rng.gen_range(1.0e6..5.0e7);
            let base_utilization = (is_supply || is_borrow).then(|| self.rng.gen_range(0.3..0.7));
            let base_supply_rate = is_supply.then(|| self.rng.gen_range(0.01..0.1));
            let base_borrow_rate = is_borrow.then(|| self.rng.gen_range(0.03..0.15));

            let chains: &[&str] = if protocol == "dYdX" { DYDX_CHAINS } else { SYNTHETIC_CHAINS };

            for (i, date) in grid.iter().enumerate() {
                let day_factor = Self::trend(i, n) * self.rng.gen_range(0.93..1.07);

                for chain in chains {
                    if self.rng.gen_bool(POOL_OMISSION_PROBABILITY) {
                        continue;
                    }

                    let mut row = PoolRow {
                        date: *date,
                        protocol: protocol.to_string(),
                        chain: chain.to_string(),
                        pool_name: pool_name.to_string(),
                        version: version.to_string(),
                        tvl: base_tvl * day_factor * self.rng.gen_range(0.8..1.2),
                        fees: base_fees * day_factor * self.rng.gen_range(0.7..1.3),
                        volume: base_volume * day_factor * self.rng.gen_range(0.5..1.5),
                        utilization_rate: None,
                        supply_rate: None,
                        borrow_rate: None,
                    };

                    if is_lending {
                        row.utilization_rate = base_utilization.map(|u| {
                            (u * day_factor * self.rng.gen_range(0.9..1.1)).clamp(0.1, 0.95)
                        });
                        row.supply_rate =
                            base_supply_rate.map(|r| r * day_factor * self.rng.gen_range(0.9..1.1));
                        row.borrow_rate =
                            base_borrow_rate.map(|r| r * day_factor * self.rng.gen_range(0.9..1.1));
                    }

                    rows.push(row);
                }
            }
        }
        rows
    }

    pub fn generate_transactions(&mut self, count: usize) -> Vec<TransactionRow> {
        let mut txs = Vec::with_capacity(count);
        let now_secs = self.now.timestamp();

        for _ in 0..count {
            let protocol = *SYNTHETIC_PROTOCOLS.choose(&mut self.rng).unwrap_or(&"Uniswap");

            let action = if SWAP_ONLY_PROTOCOLS.contains(&protocol) {
                Action::Swap
            } else if LENDING_PROTOCOLS.contains(&protocol) {
                *Action::LENDING.choose(&mut self.rng).unwrap_or(&Action::Supply)
            } else {
                *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::Swap)
            };

            let age_secs = self.rng.gen_range(0..7 * 86_400);
            let timestamp = DateTime::from_timestamp(now_secs - age_secs, 0)
                .unwrap_or(self.now - Duration::seconds(age_secs));

            let amount_usd = match action {
                Action::Swap => self.rng.gen_range(100.0..50_000.0),
                Action::Supply | Action::Borrow => self.rng.gen_range(1_000.0..100_000.0),
                Action::Repay | Action::Withdraw => self.rng.gen_range(500.0..20_000.0),
            };

            let chain = *SYNTHETIC_CHAINS.choose(&mut self.rng).unwrap_or(&"Ethereum");

            txs.push(TransactionRow {
                timestamp,
                protocol: protocol.to_string(),
                chain: chain.to_string(),
                wallet_address: self.hex_string(40),
                action,
                amount_usd,
                gas_fee_usd: self.rng.gen_range(5.0..100.0),
                transaction_hash: self.hex_string(64),
            });
        }
        txs
    }

    /// `0x` followed by `digits` lowercase hex characters.
    fn hex_string(&mut self, digits: usize) -> String {
        let mut s = String::with_capacity(digits + 2);
        s.push_str("0x");
        for _ in 0..digits {
            s.push(HEX[self.rng.gen_range(0..HEX.len())] as char);
        }
        s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn anchor() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-30T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn generator(seed: u64) -> SyntheticGenerator {
        SyntheticGenerator::anchored(Some(seed), anchor())
    }

    #[test]
    fn same_seed_same_tables() {
        assert_eq!(generator(7).generate_protocol_series(), generator(7).generate_protocol_series());
        assert_eq!(generator(7).generate_pool_series(), generator(7).generate_pool_series());
        assert_eq!(generator(7).generate_transactions(20), generator(7).generate_transactions(20));
        assert_ne!(generator(7).generate_protocol_series(), generator(8).generate_protocol_series());
    }

    #[test]
    fn protocol_series_covers_full_grid_once() {
        let rows = generator(1).generate_protocol_series();
        let days = (SYNTHETIC_HISTORY_DAYS + 1) as usize;
        assert_eq!(rows.len(), days * SYNTHETIC_PROTOCOLS.len() * SYNTHETIC_CHAINS.len());

        let mut seen = HashSet::new();
        for r in &rows {
            assert!(seen.insert((r.date, r.protocol.clone(), r.chain.clone())));
        }
        let first = rows.iter().map(|r| r.date).min().unwrap();
        let last = rows.iter().map(|r| r.date).max().unwrap();
        assert_eq!(last, anchor().date_naive());
        assert_eq!(last - first, Duration::days(SYNTHETIC_HISTORY_DAYS));
    }

    #[test]
    fn protocol_series_expenses_match() {
        for r in generator(2).generate_protocol_series() {
            let (f, rev, e) = (r.fees.unwrap(), r.revenue.unwrap(), r.expenses.unwrap());
            assert_eq!(e, f - rev);
            assert!(r.tvl.unwrap() > 0.0 && r.volume.unwrap() > 0.0);
        }
    }

    #[test]
    fn pool_series_respects_chain_rules_and_sparsity() {
        let rows = generator(3).generate_pool_series();

        for r in rows.iter().filter(|r| r.protocol == "dYdX") {
            assert!(DYDX_CHAINS.contains(&r.chain.as_str()));
        }

        // ~60% of the possible (pool, chain, day) slots survive
        let slots: usize = POOLS
            .iter()
            .map(|(p, _, _)| if *p == "dYdX" { DYDX_CHAINS.len() } else { SYNTHETIC_CHAINS.len() })
            .sum::<usize>()
            * (SYNTHETIC_HISTORY_DAYS + 1) as usize;
        let kept = rows.len() as f64 / slots as f64;
        assert!((0.5..0.7).contains(&kept), "kept ratio {kept}");
    }

    #[test]
    fn lending_fields_only_where_they_belong() {
        for r in generator(4).generate_pool_series() {
            let lending = LENDING_PROTOCOLS.contains(&r.protocol.as_str());
            let supply = r.pool_name.contains("Supply");
            let borrow = r.pool_name.contains("Borrow");

            assert_eq!(r.utilization_rate.is_some(), lending && (supply || borrow));
            assert_eq!(r.supply_rate.is_some(), lending && supply);
            assert_eq!(r.borrow_rate.is_some(), lending && borrow);
            if let Some(u) = r.utilization_rate {
                assert!((0.1..=0.95).contains(&u));
            }
        }
    }

    #[test]
    fn transactions_follow_protocol_rules() {
        let txs = generator(5).generate_transactions(300);
        assert_eq!(txs.len(), 300);

        let mut by_protocol: HashMap<&str, usize> = HashMap::new();
        for tx in &txs {
            *by_protocol.entry(tx.protocol.as_str()).or_default() += 1;
            match tx.protocol.as_str() {
                "Uniswap" | "Curve" => assert_eq!(tx.action, Action::Swap),
                "Aave" | "Compound" => assert_ne!(tx.action, Action::Swap),
                _ => {}
            }
            assert_eq!(tx.wallet_address.len(), 42);
            assert_eq!(tx.transaction_hash.len(), 66);
            assert!(tx.wallet_address.starts_with("0x"));
            assert!(tx.transaction_hash[2..].chars().all(|c| c.is_ascii_hexdigit()));
            assert!(tx.timestamp <= anchor());
            assert!(anchor() - tx.timestamp < Duration::days(7));
            assert!((5.0..100.0).contains(&tx.gas_fee_usd));
        }
        assert_eq!(by_protocol.len(), SYNTHETIC_PROTOCOLS.len());
    }
}
