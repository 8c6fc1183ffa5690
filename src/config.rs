//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every tunable that drives a rule (buy budget, sell fraction, fee
//! budgets, unit scaling, pool thresholds) lives here with its default.
//! The signing key is referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::types::{AgentError, FeeBudget};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    pub data_sources: DataSourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Accounts analyzed when none are given on the command line.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Risk tolerance assumed when the contract holds no portfolio.
    #[serde(default = "default_risk_tolerance")]
    pub default_risk_tolerance: u8,
    /// Append-only JSON-lines journal of cycle reports.
    #[serde(default)]
    pub journal_path: Option<String>,
    /// Log writes instead of submitting them.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_risk_tolerance() -> u8 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// NEAR JSON-RPC endpoint used for view calls.
    pub node_url: String,
    /// Signing relay that submits function calls on behalf of the signer.
    pub relay_url: String,
    pub contract_id: String,
    /// Name of the env var holding the relay signing key.
    pub signing_key_env: String,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// Recommendation rule parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Quote-currency budget spent per buy recommendation.
    pub fixed_budget: Decimal,
    /// Fraction of a holding sold per sell recommendation.
    pub sell_fraction: Decimal,
    /// Buys require risk tolerance strictly above this.
    pub min_risk_for_buy: u8,
    /// Sells require risk tolerance strictly below this.
    pub max_risk_for_sell: u8,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fixed_budget: dec!(1000),
            sell_fraction: dec!(0.1),
            min_risk_for_buy: 3,
            max_risk_for_sell: 7,
        }
    }
}

/// Trade submission parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Power of ten converting a whole-unit amount to the ledger's smallest unit.
    pub unit_scale_exponent: u32,
    /// Gas attached to `request_trade` (30 TGas).
    pub trade_gas: u64,
    /// Deposit attached to `request_trade`, in whole NEAR.
    pub trade_deposit_near: Decimal,
    /// Gas attached to `set_ai_recommendation`.
    pub recommendation_gas: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            unit_scale_exponent: 24,
            trade_gas: 30_000_000_000_000,
            trade_deposit_near: dec!(0.1),
            recommendation_gas: 30_000_000_000_000,
        }
    }
}

impl ExecutionConfig {
    /// Smallest-unit multiplier, or `None` if 10^exponent overflows u128.
    pub fn unit_factor(&self) -> Option<u128> {
        10u128.checked_pow(self.unit_scale_exponent)
    }

    /// Fee budget for one `request_trade` call.
    pub fn trade_budget(&self) -> Result<FeeBudget, AgentError> {
        let factor = self
            .unit_factor()
            .ok_or_else(|| AgentError::Config("unit_scale_exponent too large".into()))?;
        let deposit = Decimal::from_u128(factor)
            .and_then(|f| self.trade_deposit_near.checked_mul(f))
            .and_then(|d| d.trunc().to_u128())
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "trade deposit {} NEAR does not fit the ledger unit",
                    self.trade_deposit_near
                ))
            })?;
        Ok(FeeBudget {
            gas: self.trade_gas,
            deposit,
        })
    }

    /// Fee budget for persisting a recommendation (no deposit).
    pub fn recommendation_budget(&self) -> FeeBudget {
        FeeBudget::gas_only(self.recommendation_gas)
    }
}

/// Liquidity pool scoring parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Pools at or below this TVL score zero.
    pub min_tvl: f64,
    pub tvl_normalizer: f64,
    /// Conservative accounts never see a pool yielding less than this.
    pub min_safe_apy: f64,
    /// Risk tolerance at or below which the apy floor applies.
    pub conservative_ceiling: u8,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            min_tvl: 100_000.0,
            tvl_normalizer: 1_000_000.0,
            min_safe_apy: 10.0,
            conservative_ceiling: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSourcesConfig {
    pub coingecko: CoinGeckoConfig,
    /// Endpoint returning a JSON array of `{pair, apy, tvl}`.
    pub pools_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoinGeckoConfig {
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    /// Asset symbol → CoinGecko coin id.
    pub coin_ids: HashMap<String, String>,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_history_days() -> u32 {
    7
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.strategy.fixed_budget <= Decimal::ZERO {
            return Err(AgentError::Config("strategy.fixed_budget must be positive".into()));
        }
        if self.strategy.sell_fraction <= Decimal::ZERO || self.strategy.sell_fraction > Decimal::ONE {
            return Err(AgentError::Config("strategy.sell_fraction must be in (0, 1]".into()));
        }
        if self.liquidity.tvl_normalizer <= 0.0 {
            return Err(AgentError::Config("liquidity.tvl_normalizer must be positive".into()));
        }
        self.execution.trade_budget()?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve the relay signing key named by `ledger.signing_key_env`.
    pub fn signing_key(&self) -> Result<SecretString> {
        Self::resolve_env(&self.ledger.signing_key_env).map(SecretString::new)
    }
}
