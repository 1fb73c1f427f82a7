use crate::error::{AppError, Result};
use crate::types::DataSource;

pub const LLAMA_API_URL: &str = "https://api.llama.fi";

/// Protocols tracked on the live path: (display name, DefiLlama slug).
pub const PROTOCOL_SLUGS: &[(&str, &str)] = &[
    ("Aave", "aave"),
    ("Drift", "drift"),
    ("Fluid", "fluid"),
    ("Aerodrome", "aerodrome"),
    ("Ethena", "ethena"),
];

/// Chains requested from DefiLlama. Names must match the `chainTvls` keys;
/// the fee/volume breakdowns use the lowercased form.
pub const LIVE_CHAINS: &[&str] = &["Ethereum", "Polygon", "Arbitrum", "OP Mainnet", "Base", "Solana"];

pub const SYNTHETIC_PROTOCOLS: &[&str] = &["Uniswap", "Aave", "Compound", "Curve", "dYdX"];

pub const SYNTHETIC_CHAINS: &[&str] = &["Ethereum", "Polygon", "Arbitrum", "Optimism", "Base"];

/// Synthetic history length in days. The grid is inclusive, so it holds one more row.
pub const SYNTHETIC_HISTORY_DAYS: i64 = 180;

/// Upper bound on HISTORY_DAYS (ten years of daily rows).
pub const MAX_HISTORY_DAYS: i64 = 3650;

/// Rows shown in the recent transactions listing when no limit is given.
pub const RECENT_TRANSACTIONS_LIMIT: usize = 10;

/// Channel capacity for refresh requests.
pub const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Where protocol-level rows come from (DATA_SOURCE=synthetic|live)
    pub data_source: DataSource,
    pub llama_api_url: String,
    /// Calendar grid length for the live path (HISTORY_DAYS)
    pub history_days: i64,
    /// Fixed seed for reproducible synthetic data (SYNTHETIC_SEED)
    pub synthetic_seed: Option<u64>,
    pub transaction_count: usize,
    /// Max upstream requests in flight at once (FETCH_CONCURRENCY)
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    /// Background refresh period; 0 means refresh only on request (REFRESH_INTERVAL_SECS)
    pub refresh_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_source = std::env::var("DATA_SOURCE")
            .unwrap_or_else(|_| "synthetic".to_string())
            .parse::<DataSource>()
            .map_err(AppError::Config)?;

        let history_days =
            parse_history_days(&std::env::var("HISTORY_DAYS").unwrap_or_else(|_| "180".to_string()))?;

        let synthetic_seed = match std::env::var("SYNTHETIC_SEED") {
            Ok(s) if !s.trim().is_empty() => Some(
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| AppError::Config("SYNTHETIC_SEED must be an unsigned integer".to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            data_source,
            llama_api_url: std::env::var("LLAMA_API_URL")
                .unwrap_or_else(|_| LLAMA_API_URL.to_string()),
            history_days,
            synthetic_seed,
            transaction_count: std::env::var("TRANSACTION_COUNT")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<usize>()
                .unwrap_or(100),
            fetch_concurrency: std::env::var("FETCH_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse::<usize>()
                .unwrap_or(4)
                .max(1),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .unwrap_or(30),
            refresh_interval_secs: std::env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<u64>()
                .unwrap_or(0),
        })
    }
}

fn parse_history_days(raw: &str) -> Result<i64> {
    let days = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::Config("HISTORY_DAYS must be a whole number of days".to_string()))?;
    if !(0..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(AppError::Config(format!(
            "HISTORY_DAYS must be between 0 and {MAX_HISTORY_DAYS}, got {days}"
        )));
    }
    Ok(days)
}
