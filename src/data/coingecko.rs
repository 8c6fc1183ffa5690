//! CoinGecko price history.
//!
//! API docs: https://docs.coingecko.com/reference/coins-id-market-chart
//! Endpoint: GET /coins/{id}/market_chart?vs_currency=usd&days={n}
//! Rate limit: ~30 requests/minute on the public tier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::PriceSource;
use crate::config::CoinGeckoConfig;
use crate::types::{AgentError, PriceSeries};

/// `market_chart` response. Each price point is `[timestamp_ms, price]`.
#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

pub struct CoinGeckoPriceSource {
    http: Client,
    base_url: String,
    coin_ids: HashMap<String, String>,
    days: u32,
}

impl CoinGeckoPriceSource {
    pub fn new(config: &CoinGeckoConfig) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("portfolio-advisor/0.1.0")
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            coin_ids: config.coin_ids.clone(),
            days: config.history_days,
        })
    }

    fn coin_id(&self, asset: &str) -> Option<&str> {
        self.coin_ids.get(asset).map(String::as_str)
    }

    fn to_series(asset: &str, chart: MarketChart) -> Result<PriceSeries, AgentError> {
        let mut points = chart.prices;
        points.retain(|(_, price)| price.is_finite());
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        PriceSeries::new(asset, points.into_iter().map(|(_, price)| price).collect())
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    async fn series(&self, asset: &str) -> Result<PriceSeries, AgentError> {
        let coin_id = self
            .coin_id(asset)
            .ok_or_else(|| AgentError::DataUnavailable(format!("no price feed for {asset}")))?;

        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}",
            self.base_url,
            urlencoding::encode(coin_id),
            self.days,
        );
        debug!(asset, url = %url, "Fetching price history");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("{asset}: request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AgentError::DataUnavailable(format!(
                "{asset}: CoinGecko returned {status}"
            )));
        }

        let chart: MarketChart = resp
            .json()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("{asset}: bad response: {e}")))?;

        Self::to_series(asset, chart)
    }
}
