//! Strategy engine: price forecasting, trade rules and pool scoring.

pub mod forecast;
pub mod liquidity;
pub mod recommend;

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::types::{AgentError, AnalysisOutcome, Forecast, Portfolio, PriceSeries, Recommendation};
use forecast::PriceForecaster;
use recommend::RecommendationEngine;

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// What happened to each held asset during an analysis pass, including
/// the ones that were passed on and why.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionRecord {
    /// A recommendation was produced.
    Recommended(Recommendation),
    /// Forecast computed but the rules produced no action.
    NoSignal { asset: String, forecast: Forecast },
    /// Asset passed over: no usable series, too few samples, or an amount
    /// that is not a valid balance.
    Skipped { asset: String, reason: AgentError },
    /// The rules fired but the trade size is out of range.
    Unsized { asset: String, forecast: Forecast, reason: AgentError },
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Pipelines price forecasting → rule evaluation for one portfolio.
pub struct PortfolioAnalyzer {
    engine: RecommendationEngine,
}

impl PortfolioAnalyzer {
    pub fn new(engine: RecommendationEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    /// Forecast every held asset that has a series and run the rules.
    ///
    /// `series` maps asset name to the fetch result for that asset; assets
    /// that failed to fetch or are too short to forecast are skipped.
    pub fn analyze(
        &self,
        portfolio: &Portfolio,
        series: BTreeMap<String, Result<PriceSeries, AgentError>>,
    ) -> (AnalysisOutcome, Vec<DecisionRecord>) {
        let mut decisions: Vec<DecisionRecord> = portfolio
            .unreadable()
            .iter()
            .map(|h| DecisionRecord::Skipped {
                asset: h.name.clone(),
                reason: AgentError::InvalidAmount {
                    asset: h.name.clone(),
                    detail: h.reason.clone(),
                },
            })
            .collect();
        let mut forecasts: BTreeMap<String, Forecast> = BTreeMap::new();

        for (asset, fetched) in series {
            match fetched.and_then(|s| PriceForecaster::forecast(&s)) {
                Ok(forecast) => {
                    forecasts.insert(asset, forecast);
                }
                Err(reason) => {
                    warn!(asset = %asset, reason = %reason, "Asset skipped");
                    decisions.push(DecisionRecord::Skipped { asset, reason });
                }
            }
        }

        let mut assessment = self.engine.assess(portfolio, &forecasts);
        let outcome = assessment.outcome;

        if let Some(set) = outcome.recommendations() {
            for (asset, forecast) in &forecasts {
                let record = if let Some(rec) = set.get(asset) {
                    DecisionRecord::Recommended(rec.clone())
                } else if let Some(reason) = assessment.r#unsized.remove(asset) {
                    DecisionRecord::Unsized {
                        asset: asset.clone(),
                        forecast: *forecast,
                        reason,
                    }
                } else {
                    DecisionRecord::NoSignal {
                        asset: asset.clone(),
                        forecast: *forecast,
                    }
                };
                decisions.push(record);
            }
        }

        info!(
            assets = portfolio.assets().len(),
            forecast = forecasts.len(),
            outcome = %outcome,
            "Analysis complete"
        );

        (outcome, decisions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
