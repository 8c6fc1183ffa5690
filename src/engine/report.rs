//! Cycle reporting.
//!
//! Every stage of an account cycle ends in a `StageStatus`. The report
//! keeps all of them side by side so a failure in one stage is visible
//! without hiding what the others did.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, warn};

use super::gate::ExecutionOutcome;
use crate::ledger::WriteAck;
use crate::strategy::DecisionRecord;
use crate::types::{AgentError, AnalysisOutcome, StakeRecommendation};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus<T> {
    Completed(T),
    Failed(AgentError),
    /// Not attempted because its input stage failed.
    Skipped(String),
    /// Not attempted because shutdown was requested.
    Cancelled,
}

impl<T> StageStatus<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            StageStatus::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AgentError> {
        match self {
            StageStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<Result<T, AgentError>> for StageStatus<T> {
    fn from(result: Result<T, AgentError>) -> Self {
        match result {
            Ok(v) => StageStatus::Completed(v),
            Err(e) => StageStatus::Failed(e),
        }
    }
}

impl<T: fmt::Display> fmt::Display for StageStatus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed(v) => write!(f, "{v}"),
            StageStatus::Failed(e) => write!(f, "ERROR: {e}"),
            StageStatus::Skipped(why) => write!(f, "skipped ({why})"),
            StageStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything one account cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub account_id: String,
    pub started_at: DateTime<Utc>,
    pub analysis: StageStatus<AnalysisOutcome>,
    pub decisions: Vec<DecisionRecord>,
    pub persist_recommendation: StageStatus<WriteAck>,
    pub execution: StageStatus<ExecutionOutcome>,
    pub liquidity: StageStatus<StakeRecommendation>,
    pub persist_stake: StageStatus<WriteAck>,
}

impl CycleReport {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            started_at: Utc::now(),
            analysis: StageStatus::Cancelled,
            decisions: Vec::new(),
            persist_recommendation: StageStatus::Cancelled,
            execution: StageStatus::Cancelled,
            liquidity: StageStatus::Cancelled,
            persist_stake: StageStatus::Cancelled,
        }
    }

    /// Errors from every failed stage, in pipeline order.
    pub fn errors(&self) -> Vec<&AgentError> {
        [
            self.analysis.error(),
            self.persist_recommendation.error(),
            self.execution.error(),
            self.liquidity.error(),
            self.persist_stake.error(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Trade submissions that were attempted and rejected.
    pub fn failed_trades(&self) -> usize {
        match self.execution.completed() {
            Some(ExecutionOutcome::Executed(report)) => report.failed.len(),
            _ => 0,
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.errors().is_empty() || self.failed_trades() > 0
    }

    /// Log a one-line summary of the cycle.
    pub fn log(&self) {
        if self.has_failures() {
            warn!(
                account = %self.account_id,
                analysis = %self.analysis,
                execution = %self.execution,
                liquidity = %self.liquidity,
                errors = self.errors().len(),
                failed_trades = self.failed_trades(),
                "Cycle finished with failures"
            );
        } else {
            info!(
                account = %self.account_id,
                analysis = %self.analysis,
                execution = %self.execution,
                liquidity = %self.liquidity,
                "Cycle complete"
            );
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Account:   {}", self.account_id)?;
        writeln!(f, "Analyzer:  {}", self.analysis)?;
        if self.persist_recommendation.completed().is_none() {
            writeln!(f, "  stored:  {}", self.persist_recommendation)?;
        }
        writeln!(f, "Execution: {}", self.execution)?;
        write!(f, "Optimizer: {}", self.liquidity)?;
        if self.persist_stake.completed().is_none() {
            write!(f, "\n  stored:  {}", self.persist_stake)?;
        }
        Ok(())
    }
}
