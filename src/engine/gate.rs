//! Trade gate.
//!
//! Reads back the persisted recommendation, re-checks every entry against
//! the account's *current* risk tolerance, and submits the survivors as
//! bounded-cost `request_trade` calls. The recommendation may have been
//! written under a different risk profile, so eligibility is always
//! recomputed here and never trusted from the producer.

use tracing::{debug, info, warn};

use crate::config::{ExecutionConfig, StrategyConfig};
use crate::ledger::codec;
use crate::ledger::LedgerClient;
use crate::strategy::recommend::{buy_allowed, sell_allowed};
use crate::types::{AgentError, Recommendation, RecommendationSet, RiskTolerance, TradeAction};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedTrade {
    pub asset: String,
    pub action: TradeAction,
    /// Amount in the ledger's smallest unit.
    pub scaled_amount: u128,
    pub receipt_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTrade {
    pub asset: String,
    pub action: TradeAction,
    pub reason: String,
}

/// Result of submitting a gated recommendation set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedTrade>,
    pub failed: Vec<FailedTrade>,
    /// Entries dropped by the risk re-check.
    pub gated_out: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// No stored trade recommendation, or nothing survived gating.
    NothingToExecute,
    Executed(ExecutionReport),
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOutcome::NothingToExecute => write!(f, "No recommendation to execute"),
            ExecutionOutcome::Executed(report) => {
                let done: Vec<String> = report
                    .executed
                    .iter()
                    .map(|t| format!("{} {} {}", t.action, t.scaled_amount, t.asset))
                    .collect();
                write!(f, "Trades executed: [{}]", done.join(", "))?;
                if !report.failed.is_empty() {
                    write!(f, " ({} failed)", report.failed.len())?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct TradeGate {
    strategy: StrategyConfig,
    execution: ExecutionConfig,
}

impl TradeGate {
    pub fn new(strategy: StrategyConfig, execution: ExecutionConfig) -> Self {
        Self {
            strategy,
            execution,
        }
    }

    fn is_eligible(&self, rec: &Recommendation, risk: RiskTolerance) -> bool {
        match rec.action {
            TradeAction::Buy => buy_allowed(&self.strategy, risk),
            TradeAction::Sell => sell_allowed(&self.strategy, risk),
        }
    }

    /// Keep the entries the current risk tolerance allows, in asset order.
    pub fn eligible(&self, set: RecommendationSet, risk: RiskTolerance) -> Vec<Recommendation> {
        set.into_values()
            .filter(|rec| {
                let ok = self.is_eligible(rec, risk);
                if !ok {
                    debug!(asset = %rec.asset, action = %rec.action, risk = risk.value(), "Gated out");
                }
                ok
            })
            .collect()
    }

    /// Whole-unit amount → smallest ledger unit.
    pub fn scale(&self, amount: u128) -> Option<u128> {
        self.execution
            .unit_factor()
            .and_then(|factor| amount.checked_mul(factor))
    }

    /// Re-validate and execute a persisted recommendation.
    ///
    /// `persisted` is the raw text read back from the ledger. A malformed
    /// text fails with `InvalidRecommendation`; individual submission
    /// failures are recorded in the report and do not stop later entries.
    pub async fn execute(
        &self,
        ledger: &LedgerClient,
        account_id: &str,
        persisted: Option<&str>,
        risk: RiskTolerance,
    ) -> Result<ExecutionOutcome, AgentError> {
        let Some(text) = persisted else {
            info!(account = account_id, "No stored recommendation");
            return Ok(ExecutionOutcome::NothingToExecute);
        };

        let Some(set) = codec::decode(text)?.into_trades() else {
            info!(account = account_id, "Stored recommendation carries no trades");
            return Ok(ExecutionOutcome::NothingToExecute);
        };

        let total = set.len();
        let eligible = self.eligible(set, risk);
        if eligible.is_empty() {
            info!(account = account_id, total, risk = risk.value(), "Nothing eligible after gating");
            return Ok(ExecutionOutcome::NothingToExecute);
        }

        let budget = self.execution.trade_budget()?;
        let mut report = ExecutionReport {
            gated_out: total - eligible.len(),
            ..ExecutionReport::default()
        };

        info!(
            account = account_id,
            eligible = eligible.len(),
            gated_out = report.gated_out,
            "Executing trades"
        );

        for rec in eligible {
            let Some(scaled) = self.scale(rec.amount) else {
                warn!(asset = %rec.asset, amount = %rec.amount, "Scaled amount overflows");
                report.failed.push(FailedTrade {
                    asset: rec.asset,
                    action: rec.action,
                    reason: "scaled amount overflows u128".to_string(),
                });
                continue;
            };

            match ledger
                .request_trade(account_id, &rec.asset, scaled, rec.action, budget)
                .await
            {
                Ok(ack) => {
                    info!(
                        asset = %rec.asset,
                        action = %rec.action,
                        amount = %scaled,
                        receipt = %ack.receipt_id,
                        "Executed trade"
                    );
                    report.executed.push(ExecutedTrade {
                        asset: rec.asset,
                        action: rec.action,
                        scaled_amount: scaled,
                        receipt_id: ack.receipt_id,
                    });
                }
                Err(e) => {
                    warn!(asset = %rec.asset, action = %rec.action, error = %e, "Trade submission failed");
                    report.failed.push(FailedTrade {
                        asset: rec.asset,
                        action: rec.action,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            executed = report.executed.len(),
            failed = report.failed.len(),
            "Trade execution complete"
        );

        Ok(ExecutionOutcome::Executed(report))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
