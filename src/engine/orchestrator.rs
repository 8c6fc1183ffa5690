//! Account cycle orchestration.
//!
//! One cycle runs five stages in a fixed order:
//!
//! 1. analyze: read portfolio, fetch price series, forecast, recommend
//! 2. persist the analysis outcome
//! 3. gate and execute whatever recommendation is stored
//! 4. score liquidity pools
//! 5. persist the stake recommendation
//!
//! A stage only depends on its direct input (2 on 1, 5 on 4). Stages 3 and
//! 4 always run. Every stage reads the portfolio fresh from the ledger.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use super::gate::{ExecutionOutcome, TradeGate};
use super::report::{CycleReport, StageStatus};
use crate::config::{AppConfig, ExecutionConfig, LiquidityConfig, StrategyConfig};
use crate::data::{PoolSource, PriceSource};
use crate::ledger::{codec, LedgerClient, WriteAck};
use crate::strategy::liquidity::LiquidityScorer;
use crate::strategy::recommend::RecommendationEngine;
use crate::strategy::{DecisionRecord, PortfolioAnalyzer};
use crate::types::{AgentError, AnalysisOutcome, PriceSeries, RiskTolerance, StakeRecommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub strategy: StrategyConfig,
    pub execution: ExecutionConfig,
    pub liquidity: LiquidityConfig,
    /// Risk used when the ledger holds no portfolio for the account.
    pub default_risk: RiskTolerance,
    /// Upper bound on each price or pool source call.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            execution: ExecutionConfig::default(),
            liquidity: LiquidityConfig::default(),
            default_risk: RiskTolerance::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            strategy: cfg.strategy.clone(),
            execution: cfg.execution.clone(),
            liquidity: cfg.liquidity.clone(),
            default_risk: RiskTolerance::clamped(i64::from(cfg.agent.default_risk_tolerance)),
            call_timeout: Duration::from_secs(cfg.ledger.call_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ledger: LedgerClient,
    prices: Arc<dyn PriceSource>,
    pools: Arc<dyn PoolSource>,
    analyzer: PortfolioAnalyzer,
    gate: TradeGate,
    scorer: LiquidityScorer,
    execution: ExecutionConfig,
    default_risk: RiskTolerance,
    call_timeout: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(
        ledger: LedgerClient,
        prices: Arc<dyn PriceSource>,
        pools: Arc<dyn PoolSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            prices,
            pools,
            analyzer: PortfolioAnalyzer::new(RecommendationEngine::new(config.strategy.clone())),
            gate: TradeGate::new(config.strategy, config.execution.clone()),
            scorer: LiquidityScorer::new(config.liquidity),
            execution: config.execution,
            default_risk: config.default_risk,
            call_timeout: config.call_timeout,
            shutdown: None,
        }
    }

    /// Stop between stages once `true` is sent on this channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn bounded_data<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::DataUnavailable(format!(
                    "{what} timed out after {}s",
                    self.call_timeout.as_secs()
                )))
            })
    }

    /// Run every stage for one account. Never fails as a whole; each
    /// stage's outcome lands in the report.
    pub async fn run_cycle(&self, account_id: &str) -> CycleReport {
        let mut report = CycleReport::new(account_id);
        info!(account = account_id, contract = self.ledger.contract_id(), "Starting cycle");

        // 1-2. Analyze and persist
        if self.cancelled() {
            return self.finish(report);
        }
        match self.analyze(account_id).await {
            Ok((outcome, decisions)) => {
                report.decisions = decisions;
                report.analysis = StageStatus::Completed(outcome);
            }
            Err(e) => {
                warn!(account = account_id, error = %e, "Analysis failed");
                report.analysis = StageStatus::Failed(e);
            }
        }

        if self.cancelled() {
            return self.finish(report);
        }
        report.persist_recommendation = match report.analysis.completed() {
            Some(outcome) => self.persist_analysis(account_id, outcome).await.into(),
            None => StageStatus::Skipped("analysis did not complete".to_string()),
        };

        // 3. Gate and execute
        if self.cancelled() {
            return self.finish(report);
        }
        report.execution = self.execute(account_id).await.into();
        if let Some(e) = report.execution.error() {
            warn!(account = account_id, error = %e, "Execution stage failed");
        }

        // 4-5. Liquidity
        if self.cancelled() {
            return self.finish(report);
        }
        report.liquidity = self.optimize_liquidity(account_id).await.into();
        if let Some(e) = report.liquidity.error() {
            warn!(account = account_id, error = %e, "Liquidity stage failed");
        }

        if self.cancelled() {
            return self.finish(report);
        }
        report.persist_stake = match report.liquidity.completed() {
            Some(stake) => self.persist_stake(account_id, stake).await.into(),
            None => StageStatus::Skipped("liquidity stage did not complete".to_string()),
        };

        self.finish(report)
    }

    /// Run cycles for several accounts concurrently.
    pub async fn run_accounts(&self, accounts: &[String]) -> Vec<CycleReport> {
        join_all(accounts.iter().map(|account| self.run_cycle(account))).await
    }

    fn finish(&self, report: CycleReport) -> CycleReport {
        if self.cancelled() {
            info!(account = %report.account_id, "Cycle cancelled");
        }
        report.log();
        report
    }

    // -- Stages --------------------------------------------------------------

    async fn analyze(
        &self,
        account_id: &str,
    ) -> Result<(AnalysisOutcome, Vec<DecisionRecord>), AgentError> {
        let portfolio = self.ledger.portfolio(account_id, self.default_risk).await?;
        info!(
            account = account_id,
            assets = portfolio.assets().len(),
            risk = %portfolio.risk_tolerance,
            "Portfolio loaded"
        );

        let fetches = portfolio.assets().iter().map(|holding| async move {
            let asset = holding.name.clone();
            let series: Result<PriceSeries, AgentError> = self
                .bounded_data(&format!("{asset} price series"), self.prices.series(&asset))
                .await;
            (asset, series)
        });
        let series: BTreeMap<_, _> = join_all(fetches).await.into_iter().collect();

        Ok(self.analyzer.analyze(&portfolio, series))
    }

    async fn persist_analysis(
        &self,
        account_id: &str,
        outcome: &AnalysisOutcome,
    ) -> Result<WriteAck, AgentError> {
        let text = codec::encode_analysis(outcome)?;
        let ack = self
            .ledger
            .set_recommendation(account_id, &text, self.execution.recommendation_budget())
            .await?;
        info!(account = account_id, receipt = %ack.receipt_id, "Recommendation stored");
        Ok(ack)
    }

    async fn execute(&self, account_id: &str) -> Result<ExecutionOutcome, AgentError> {
        let portfolio = self.ledger.portfolio(account_id, self.default_risk).await?;
        let stored = self.ledger.recommendation(account_id).await?;
        self.gate
            .execute(&self.ledger, account_id, stored.as_deref(), portfolio.risk_tolerance)
            .await
    }

    async fn optimize_liquidity(&self, account_id: &str) -> Result<StakeRecommendation, AgentError> {
        let portfolio = self.ledger.portfolio(account_id, self.default_risk).await?;
        let pools = self.bounded_data("pool snapshot", self.pools.pools()).await?;
        Ok(self.scorer.recommend(&pools, portfolio.risk_tolerance))
    }

    async fn persist_stake(
        &self,
        account_id: &str,
        stake: &StakeRecommendation,
    ) -> Result<WriteAck, AgentError> {
        let text = codec::encode_stake(stake)?;
        let ack = self
            .ledger
            .set_recommendation(account_id, &text, self.execution.recommendation_budget())
            .await?;
        info!(account = account_id, receipt = %ack.receipt_id, "Stake recommendation stored");
        Ok(ack)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
