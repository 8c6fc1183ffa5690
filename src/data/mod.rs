//! Market data sources.
//!
//! Defines the `PriceSource` and `PoolSource` traits the engine reads
//! through, with HTTP implementations:
//! - `CoinGeckoPriceSource`: historical prices per asset symbol
//! - `HttpPoolSource`: liquidity pool snapshots

pub mod coingecko;
pub mod pools;

use async_trait::async_trait;

use crate::types::{AgentError, LiquidityPool, PriceSeries};

/// Historical price data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Ordered price samples for `asset`, oldest first.
    /// Unknown assets fail with `AgentError::DataUnavailable`.
    async fn series(&self, asset: &str) -> Result<PriceSeries, AgentError>;
}

/// Liquidity pool snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PoolSource: Send + Sync {
    async fn pools(&self) -> Result<Vec<LiquidityPool>, AgentError>;
}
