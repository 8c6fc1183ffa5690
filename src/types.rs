//! Shared types for the advisor agent.
//!
//! These types form the data model used across all modules. Everything
//! here is a per-cycle snapshot: built fresh from ledger and data-source
//! reads, never cached between cycles.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// One owned position, as reported by the portfolio contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHolding {
    /// Asset symbol, e.g. "NEAR", "ETH".
    pub name: String,
    /// Held amount in the contract's balance unit. Accepted as a JSON
    /// number or a decimal string.
    #[serde(deserialize_with = "u128_from_number_or_string")]
    pub amount: u128,
}

/// A holding whose amount could not be read as a balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreadableHolding {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for AssetHolding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.name)
    }
}

/// Risk tolerance on a 1 (conservative) to 10 (aggressive) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RiskTolerance(u8);

impl RiskTolerance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Clamp into [1, 10], mirroring what the contract does on write.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for RiskTolerance {
    fn default() -> Self {
        Self(5)
    }
}

impl<'de> Deserialize<'de> for RiskTolerance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(Self::clamped(raw))
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// An account's holdings plus its risk profile.
///
/// Asset names are unique: construction keeps the first holding for a
/// given name and drops later duplicates. Holdings whose amount is not a
/// valid balance are set aside in `unreadable` instead of failing the
/// whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    assets: Vec<AssetHolding>,
    unreadable: Vec<UnreadableHolding>,
    pub risk_tolerance: RiskTolerance,
}

impl Portfolio {
    pub fn new(assets: Vec<AssetHolding>, risk_tolerance: RiskTolerance) -> Self {
        let mut unique: Vec<AssetHolding> = Vec::with_capacity(assets.len());
        for holding in assets {
            if unique.iter().any(|h| h.name == holding.name) {
                tracing::warn!(asset = %holding.name, "Duplicate holding dropped");
                continue;
            }
            unique.push(holding);
        }
        Self {
            assets: unique,
            unreadable: Vec::new(),
            risk_tolerance,
        }
    }

    /// An empty portfolio, used when the contract has no record for the account.
    pub fn empty(risk_tolerance: RiskTolerance) -> Self {
        Self::new(Vec::new(), risk_tolerance)
    }

    pub fn assets(&self) -> &[AssetHolding] {
        &self.assets
    }

    pub fn unreadable(&self) -> &[UnreadableHolding] {
        &self.unreadable
    }

    /// True when the contract reported no holdings at all, readable or not.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.unreadable.is_empty()
    }

    pub fn holding(&self, name: &str) -> Option<&AssetHolding> {
        self.assets.iter().find(|h| h.name == name)
    }
}

impl<'de> Deserialize<'de> for Portfolio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawHolding {
            name: String,
            amount: Box<RawValue>,
        }

        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            assets: Vec<RawHolding>,
            #[serde(default)]
            risk_tolerance: RiskTolerance,
        }

        let raw = Raw::deserialize(deserializer)?;
        let mut assets = Vec::with_capacity(raw.assets.len());
        let mut unreadable = Vec::new();
        for holding in raw.assets {
            match parse_balance(holding.amount.get()) {
                Ok(amount) => assets.push(AssetHolding { name: holding.name, amount }),
                Err(reason) => {
                    tracing::warn!(asset = %holding.name, %reason, "Unreadable holding set aside");
                    unreadable.push(UnreadableHolding { name: holding.name, reason });
                }
            }
        }

        let mut portfolio = Portfolio::new(assets, raw.risk_tolerance);
        portfolio.unreadable = unreadable;
        Ok(portfolio)
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holdings: Vec<String> = self.assets.iter().map(|h| h.to_string()).collect();
        write!(
            f,
            "[{}] risk={}",
            if holdings.is_empty() {
                "no assets".to_string()
            } else {
                holdings.join(", ")
            },
            self.risk_tolerance
        )
    }
}

// ---------------------------------------------------------------------------
// Prices & forecasts
// ---------------------------------------------------------------------------

/// Ordered historical price samples for one asset; index = time step.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    asset: String,
    samples: Vec<f64>,
}

impl PriceSeries {
    /// Build a series. At least one sample is required.
    pub fn new(asset: impl Into<String>, samples: Vec<f64>) -> Result<Self, AgentError> {
        let asset = asset.into();
        if samples.is_empty() {
            return Err(AgentError::DataUnavailable(format!(
                "empty price series for {asset}"
            )));
        }
        Ok(Self { asset, samples })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample.
    pub fn last(&self) -> f64 {
        self.samples[self.samples.len() - 1]
    }
}

/// Predicted next price alongside the latest observed one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub predicted: f64,
    pub current: f64,
}

impl Forecast {
    pub fn is_rising(&self) -> bool {
        self.predicted > self.current
    }

    pub fn is_falling(&self) -> bool {
        self.predicted < self.current
    }
}

impl fmt::Display for Forecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "current={:.4} predicted={:.4}", self.current, self.predicted)
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            other => Err(AgentError::InvalidRecommendation(format!(
                "unknown action: {other}"
            ))),
        }
    }
}

/// A single per-asset action. `amount` is always positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub asset: String,
    pub action: TradeAction,
    pub amount: u128,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.action, self.amount, self.asset)
    }
}

/// Asset → recommendation. Ordered so that encoding is byte-stable.
pub type RecommendationSet = BTreeMap<String, Recommendation>;

/// Result of the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The portfolio had no holdings; nothing was analyzed.
    NoAssets,
    /// Holdings were analyzed. The set may be empty (nothing actionable).
    Analyzed(RecommendationSet),
}

impl AnalysisOutcome {
    pub fn recommendations(&self) -> Option<&RecommendationSet> {
        match self {
            AnalysisOutcome::NoAssets => None,
            AnalysisOutcome::Analyzed(set) => Some(set),
        }
    }
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisOutcome::NoAssets => write!(f, "No assets to analyze"),
            AnalysisOutcome::Analyzed(set) if set.is_empty() => {
                write!(f, "Analyzed, nothing actionable")
            }
            AnalysisOutcome::Analyzed(set) => {
                let parts: Vec<String> = set.values().map(|r| r.to_string()).collect();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

/// Snapshot of a staking pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub pair: String,
    /// Annual percentage yield, in percent.
    pub apy: f64,
    /// Total value locked, in USD.
    pub tvl: f64,
}

impl LiquidityPool {
    pub fn new(pair: &str, apy: f64, tvl: f64) -> Self {
        Self {
            pair: pair.to_string(),
            apy,
            tvl,
        }
    }
}

impl fmt::Display for LiquidityPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} apy={:.2}% tvl=${:.0}", self.pair, self.apy, self.tvl)
    }
}

/// Result of liquidity scoring.
#[derive(Debug, Clone, PartialEq)]
pub enum StakeRecommendation {
    Stake { pair: String, apy: f64 },
    NoSafeOption,
}

impl fmt::Display for StakeRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeRecommendation::Stake { pair, apy } => write!(f, "Stake {pair} (apy {apy:.2}%)"),
            StakeRecommendation::NoSafeOption => write!(f, "No safe staking options"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// A trade request as recorded in the contract's trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub asset: String,
    #[serde(deserialize_with = "u128_from_number_or_string")]
    pub amount: u128,
    pub action: String,
    /// Block timestamp in nanoseconds.
    #[serde(default)]
    pub timestamp: u64,
}

/// Gas limit plus attached deposit for one state-changing ledger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBudget {
    pub gas: u64,
    /// Attached deposit in the ledger's smallest unit.
    pub deposit: u128,
}

impl FeeBudget {
    pub fn gas_only(gas: u64) -> Self {
        Self { gas, deposit: 0 }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Parse a contract balance from its raw JSON text: an integer literal
/// (`Balance`) or a quoted decimal string (`U128`).
pub fn parse_balance(raw: &str) -> Result<u128, String> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    digits
        .parse::<u128>()
        .map_err(|e| format!("invalid balance {raw}: {e}"))
}

/// Balances are read from the raw JSON text so values past u64 keep
/// every digit.
fn u128_from_number_or_string<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    parse_balance(raw.get()).map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures talking to the ledger collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger call {method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    #[error("Fee budget rejected: {0}")]
    FeeRejected(String),

    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Failed to decode ledger response: {0}")]
    Decode(String),
}

/// Domain-specific error types for the advisor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient data for {asset}: need at least 2 samples, have {samples}")]
    InsufficientData { asset: String, samples: usize },

    #[error("Invalid recommendation: {0}")]
    InvalidRecommendation(String),

    #[error("Invalid amount for {asset}: {detail}")]
    InvalidAmount { asset: String, detail: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
