//! Risk-gated trade recommendations.
//!
//! Turns per-asset forecasts into buy/sell actions. Buys spend a fixed
//! budget and need a risk tolerance above the buy floor; sells trim a
//! fixed fraction of the holding and need a risk tolerance below the sell
//! ceiling. Everything else produces no entry.

use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::StrategyConfig;
use crate::types::{
    AgentError, AnalysisOutcome, AssetHolding, Forecast, Portfolio, Recommendation,
    RecommendationSet, RiskTolerance, TradeAction,
};

/// Whether a buy may be recommended or executed at this risk tolerance.
pub fn buy_allowed(config: &StrategyConfig, risk: RiskTolerance) -> bool {
    risk.value() > config.min_risk_for_buy
}

/// Whether a sell may be recommended or executed at this risk tolerance.
pub fn sell_allowed(config: &StrategyConfig, risk: RiskTolerance) -> bool {
    risk.value() < config.max_risk_for_sell
}

/// Result of running the rules over a portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub outcome: AnalysisOutcome,
    /// Assets with an actionable signal whose trade size could not be computed.
    pub r#unsized: BTreeMap<String, AgentError>,
}

pub struct RecommendationEngine {
    config: StrategyConfig,
}

impl RecommendationEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Produce the recommendation set for a portfolio.
    ///
    /// Holdings without a forecast are skipped. An empty portfolio yields
    /// `AnalysisOutcome::NoAssets` rather than an empty set.
    pub fn recommend(
        &self,
        portfolio: &Portfolio,
        forecasts: &BTreeMap<String, Forecast>,
    ) -> AnalysisOutcome {
        self.assess(portfolio, forecasts).outcome
    }

    /// Like `recommend`, but also reports the signals that could not be sized.
    pub fn assess(
        &self,
        portfolio: &Portfolio,
        forecasts: &BTreeMap<String, Forecast>,
    ) -> Assessment {
        let mut r#unsized = BTreeMap::new();
        if portfolio.is_empty() {
            return Assessment {
                outcome: AnalysisOutcome::NoAssets,
                r#unsized,
            };
        }

        let mut set = RecommendationSet::new();
        for holding in portfolio.assets() {
            let Some(forecast) = forecasts.get(&holding.name) else {
                debug!(asset = %holding.name, "No forecast, skipping");
                continue;
            };
            match self.evaluate(holding, forecast, portfolio.risk_tolerance) {
                Ok(Some(rec)) => {
                    set.insert(rec.asset.clone(), rec);
                }
                Ok(None) => {}
                Err(e) => {
                    r#unsized.insert(holding.name.clone(), e);
                }
            }
        }

        Assessment {
            outcome: AnalysisOutcome::Analyzed(set),
            r#unsized,
        }
    }

    /// Apply the rules to one holding.
    ///
    /// `Ok(None)` means no actionable signal (or an amount that floors to
    /// zero); `Err` means there was a signal but its size is out of range.
    pub fn evaluate(
        &self,
        holding: &AssetHolding,
        forecast: &Forecast,
        risk: RiskTolerance,
    ) -> Result<Option<Recommendation>, AgentError> {
        let (action, amount) = if forecast.is_rising() && buy_allowed(&self.config, risk) {
            match self.buy_amount(&holding.name, forecast.current)? {
                Some(amount) => (TradeAction::Buy, amount),
                None => return Ok(None),
            }
        } else if forecast.is_falling() && sell_allowed(&self.config, risk) {
            (TradeAction::Sell, self.sell_amount(holding)?)
        } else {
            debug!(
                asset = %holding.name,
                risk = risk.value(),
                %forecast,
                "No actionable signal"
            );
            return Ok(None);
        };

        if amount == 0 {
            debug!(asset = %holding.name, %action, "Amount rounds to zero, skipping");
            return Ok(None);
        }

        debug!(asset = %holding.name, %action, amount = %amount, %forecast, "Recommendation");
        Ok(Some(Recommendation {
            asset: holding.name.clone(),
            action,
            amount,
        }))
    }

    /// floor(fixed_budget / current_price). `None` when the price is unusable.
    fn buy_amount(&self, asset: &str, current_price: f64) -> Result<Option<u128>, AgentError> {
        let price = match Decimal::from_f64(current_price) {
            Some(p) if p > Decimal::ZERO => p,
            _ => {
                warn!(asset, current_price, "Non-positive current price, skipping buy");
                return Ok(None);
            }
        };
        let out_of_range = || {
            warn!(asset, current_price, "Buy amount out of range");
            AgentError::InvalidAmount {
                asset: asset.to_string(),
                detail: format!("buy size at price {current_price} out of range"),
            }
        };
        let units = self
            .config
            .fixed_budget
            .checked_div(price)
            .ok_or_else(out_of_range)?
            .floor();
        units.to_u128().map(Some).ok_or_else(out_of_range)
    }

    /// floor(holding.amount * sell_fraction), in exact integer arithmetic.
    fn sell_amount(&self, holding: &AssetHolding) -> Result<u128, AgentError> {
        let fraction = self.config.sell_fraction.normalize();
        let sized = u128::try_from(fraction.mantissa()).ok().and_then(|mantissa| {
            let base = 10u128.checked_pow(fraction.scale())?;
            let whole = (holding.amount / base).checked_mul(mantissa)?;
            let part = (holding.amount % base).checked_mul(mantissa)? / base;
            whole.checked_add(part)
        });
        sized.ok_or_else(|| {
            warn!(asset = %holding.name, amount = %holding.amount, %fraction, "Sell amount out of range");
            AgentError::InvalidAmount {
                asset: holding.name.clone(),
                detail: format!("{} x {fraction} out of range", holding.amount),
            }
        })
    }
}
