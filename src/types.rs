use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One (date, protocol, chain) cell of the protocol-level table.
/// `None` means the upstream series had no value for that day (before forward-fill
/// reached it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub protocol: String,
    pub chain: String,
    pub tvl: Option<f64>,
    pub fees: Option<f64>,
    pub revenue: Option<f64>,
    pub expenses: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRow {
    pub date: NaiveDate,
    pub protocol: String,
    pub chain: String,
    pub pool_name: String,
    pub version: String,
    pub tvl: f64,
    pub fees: f64,
    pub volume: f64,
    /// Lending pools only.
    pub utilization_rate: Option<f64>,
    pub supply_rate: Option<f64>,
    pub borrow_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub timestamp: DateTime<Utc>,
    pub protocol: String,
    pub chain: String,
    pub wallet_address: String,
    pub action: Action,
    pub amount_usd: f64,
    pub gas_fee_usd: f64,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Swap,
    Supply,
    Borrow,
    Repay,
    Withdraw,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Swap,
        Action::Supply,
        Action::Borrow,
        Action::Repay,
        Action::Withdraw,
    ];

    pub const LENDING: [Action; 4] = [Action::Supply, Action::Borrow, Action::Repay, Action::Withdraw];
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Swap => "Swap",
            Action::Supply => "Supply",
            Action::Borrow => "Borrow",
            Action::Repay => "Repay",
            Action::Withdraw => "Withdraw",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Tvl,
    Fees,
    Revenue,
    Expenses,
    Volume,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Tvl,
        Metric::Fees,
        Metric::Revenue,
        Metric::Expenses,
        Metric::Volume,
    ];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::Tvl => "tvl",
            Metric::Fees => "fees",
            Metric::Revenue => "revenue",
            Metric::Expenses => "expenses",
            Metric::Volume => "volume",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tvl" => Ok(Metric::Tvl),
            "fees" => Ok(Metric::Fees),
            "revenue" => Ok(Metric::Revenue),
            "expenses" => Ok(Metric::Expenses),
            "volume" => Ok(Metric::Volume),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// Granularity picked in the data-type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Protocol,
    Pool,
    Transaction,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Protocol => write!(f, "protocol"),
            DataType::Pool => write!(f, "pool"),
            DataType::Transaction => write!(f, "transaction"),
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "protocol" => Ok(DataType::Protocol),
            "pool" => Ok(DataType::Pool),
            "transaction" => Ok(DataType::Transaction),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Synthetic,
    Live,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Synthetic => write!(f, "synthetic"),
            DataSource::Live => write!(f, "live"),
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" => Ok(DataSource::Synthetic),
            "live" => Ok(DataSource::Live),
            other => Err(format!("DATA_SOURCE must be 'synthetic' or 'live', got '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Row access shared by the aggregations
// ---------------------------------------------------------------------------

/// Anything that lives on the (date, protocol, chain) grid and carries metrics.
pub trait MetricRecord {
    fn date(&self) -> NaiveDate;
    fn protocol(&self) -> &str;
    fn chain(&self) -> &str;
    fn metric(&self, metric: Metric) -> Option<f64>;

    /// Pool version, for rows that have one.
    fn version(&self) -> Option<&str> {
        None
    }
}

impl MetricRecord for MetricRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn chain(&self) -> &str {
        &self.chain
    }

    fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Tvl => self.tvl,
            Metric::Fees => self.fees,
            Metric::Revenue => self.revenue,
            Metric::Expenses => self.expenses,
            Metric::Volume => self.volume,
        }
    }
}

impl MetricRecord for PoolRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn chain(&self) -> &str {
        &self.chain
    }

    fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Tvl => Some(self.tvl),
            Metric::Fees => Some(self.fees),
            Metric::Volume => Some(self.volume),
            Metric::Revenue | Metric::Expenses => None,
        }
    }

    fn version(&self) -> Option<&str> {
        Some(&self.version)
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Everything one refresh produces. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: DataSource,
    pub generated_at: DateTime<Utc>,
    pub protocols: Vec<MetricRow>,
    pub pools: Vec<PoolRow>,
    pub transactions: Vec<TransactionRow>,
    /// Upstream series that came back empty because of a failed or malformed fetch.
    pub failed_series: usize,
}

impl Dataset {
    pub fn empty(source: DataSource) -> Self {
        Self {
            source,
            generated_at: Utc::now(),
            protocols: Vec::new(),
            pools: Vec::new(),
            transactions: Vec::new(),
            failed_series: 0,
        }
    }
}
