//! Static price and pool tables.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::watch;

use portfolio_advisor::data::{PoolSource, PriceSource};
use portfolio_advisor::types::{AgentError, LiquidityPool, PriceSeries};

/// Price history keyed by asset symbol.
pub struct StaticPrices {
    series: HashMap<String, Vec<f64>>,
}

impl StaticPrices {
    /// NEAR trending up, ETH trending down, USDC flat.
    pub fn fixture() -> Self {
        Self {
            series: HashMap::from([
                ("NEAR".to_string(), vec![10.0, 10.2, 10.1, 10.5, 10.3]),
                ("ETH".to_string(), vec![2000.0, 1990.0, 1980.0]),
                ("USDC".to_string(), vec![1.0, 1.0, 1.0]),
            ]),
        }
    }
}

#[async_trait]
impl PriceSource for StaticPrices {
    async fn series(&self, asset: &str) -> Result<PriceSeries, AgentError> {
        let samples = self
            .series
            .get(asset)
            .ok_or_else(|| AgentError::DataUnavailable(format!("no price feed for {asset}")))?;
        PriceSeries::new(asset, samples.clone())
    }
}

pub struct StaticPools {
    pools: Vec<LiquidityPool>,
}

impl StaticPools {
    pub fn fixture() -> Self {
        Self {
            pools: vec![
                LiquidityPool::new("NEAR-USDT", 12.5, 1_000_000.0),
                LiquidityPool::new("ETH-USDT", 8.0, 500_000.0),
                LiquidityPool::new("NEAR-ETH", 15.0, 200_000.0),
            ],
        }
    }

    pub fn with(pools: Vec<LiquidityPool>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl PoolSource for StaticPools {
    async fn pools(&self) -> Result<Vec<LiquidityPool>, AgentError> {
        Ok(self.pools.clone())
    }
}

/// Serves `inner` and requests shutdown the first time pools are read.
pub struct ShutdownOnPools {
    inner: StaticPools,
    trigger: watch::Sender<bool>,
}

impl ShutdownOnPools {
    pub fn new(inner: StaticPools, trigger: watch::Sender<bool>) -> Self {
        Self { inner, trigger }
    }
}

#[async_trait]
impl PoolSource for ShutdownOnPools {
    async fn pools(&self) -> Result<Vec<LiquidityPool>, AgentError> {
        self.trigger.send_replace(true);
        self.inner.pools().await
    }
}

/// NEAR 100, ETH 40, USDC 250 at the given risk tolerance.
pub fn portfolio(risk: u8) -> Value {
    json!({
        "assets": [
            {"name": "NEAR", "amount": 100},
            {"name": "ETH", "amount": "40"},
            {"name": "USDC", "amount": 250}
        ],
        "risk_tolerance": risk
    })
}
