//! Liquidity pool snapshots over HTTP.
//!
//! Expects the configured endpoint to return a JSON array of
//! `{"pair": "NEAR-USDT", "apy": 12.5, "tvl": 1000000}` rows.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::PoolSource;
use crate::types::{AgentError, LiquidityPool};

pub struct HttpPoolSource {
    http: Client,
    url: String,
}

impl HttpPoolSource {
    pub fn new(url: &str) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("portfolio-advisor/0.1.0")
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Drop rows that break the pool invariants (tvl > 0, apy >= 0).
    fn sanitize(pools: Vec<LiquidityPool>) -> Vec<LiquidityPool> {
        pools
            .into_iter()
            .filter(|p| {
                let ok = p.tvl.is_finite() && p.tvl > 0.0 && p.apy.is_finite() && p.apy >= 0.0;
                if !ok {
                    warn!(pair = %p.pair, apy = p.apy, tvl = p.tvl, "Dropping invalid pool row");
                }
                ok
            })
            .collect()
    }
}

#[async_trait]
impl PoolSource for HttpPoolSource {
    async fn pools(&self) -> Result<Vec<LiquidityPool>, AgentError> {
        debug!(url = %self.url, "Fetching liquidity pools");

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("pools request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AgentError::DataUnavailable(format!(
                "pool source returned {status}"
            )));
        }

        let pools: Vec<LiquidityPool> = resp
            .json()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("bad pools response: {e}")))?;

        Ok(Self::sanitize(pools))
    }
}
