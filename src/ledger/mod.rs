//! Ledger integration.
//!
//! Defines the `Ledger` trait (raw view/call access to the portfolio
//! contract) and `LedgerClient`, the typed, timeout-bounded handle the
//! engine talks to. Arguments and results cross the trait as JSON text so
//! u128 balances travel as exact integer literals. Implementations:
//! - `NearRpcLedger`: NEAR JSON-RPC views plus a signing relay for calls
//! - `DryRunLedger`: real reads, logged-only writes

pub mod codec;
pub mod dry_run;
pub mod near;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::types::{
    AgentError, FeeBudget, LedgerError, Portfolio, RiskTolerance, TradeAction, TradeRequest,
};

/// Contract method names.
pub mod methods {
    pub const GET_PORTFOLIO: &str = "get_portfolio";
    pub const GET_TRADE_HISTORY: &str = "get_trade_history";
    pub const GET_AI_RECOMMENDATION: &str = "get_ai_recommendation";
    pub const SET_AI_RECOMMENDATION: &str = "set_ai_recommendation";
    pub const REQUEST_TRADE: &str = "request_trade";
}

/// Acknowledgement of an accepted state-changing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Transaction hash (or a synthetic id for dry runs).
    pub receipt_id: String,
}

impl std::fmt::Display for WriteAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stored ({})", self.receipt_id)
    }
}

/// Raw access to the portfolio contract.
///
/// `read` is a view call; `write` is a function call signed as `signer`,
/// which scopes it to that account's keyspace in the contract. `args` is
/// the JSON-encoded argument object; `read` returns the method's JSON
/// result text, `"null"` when the method returned nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn read(&self, method: &str, args: String) -> Result<String, LedgerError>;

    async fn write(
        &self,
        signer: &str,
        method: &str,
        args: String,
        budget: FeeBudget,
    ) -> Result<WriteAck, LedgerError>;

    /// Contract account the handle talks to.
    fn contract_id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Contract arguments
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AccountArgs<'a> {
    account_id: &'a str,
}

#[derive(Serialize)]
struct SetRecommendationArgs<'a> {
    recommendation: &'a str,
}

/// `request_trade(asset, amount: Balance, action)`. serde_json writes the
/// u128 as a bare integer literal, which is what `Balance` expects.
#[derive(Serialize)]
struct RequestTradeArgs<'a> {
    asset: &'a str,
    amount: u128,
    action: &'a str,
}

fn encode_args<T: Serialize>(method: &str, args: &T) -> Result<String, LedgerError> {
    serde_json::to_string(args).map_err(|e| LedgerError::Decode(format!("{method} args: {e}")))
}

fn decode_result<T: DeserializeOwned>(method: &str, text: &str) -> Result<T, LedgerError> {
    serde_json::from_str(text).map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Typed, timeout-bounded access to the portfolio contract.
#[derive(Clone)]
pub struct LedgerClient {
    ledger: Arc<dyn Ledger>,
    timeout: Duration,
}

impl LedgerClient {
    pub fn new(ledger: Arc<dyn Ledger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    pub fn contract_id(&self) -> &str {
        self.ledger.contract_id()
    }

    async fn bounded<T>(
        &self,
        method: &str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                method: method.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn read<T: DeserializeOwned>(&self, method: &str, account_id: &str) -> Result<T, LedgerError> {
        debug!(contract = self.contract_id(), method, account = account_id, "Ledger read");
        let args = encode_args(method, &AccountArgs { account_id })?;
        let text = self.bounded(method, self.ledger.read(method, args)).await?;
        decode_result(method, &text)
    }

    async fn write<T: Serialize>(
        &self,
        signer: &str,
        method: &str,
        args: &T,
        budget: FeeBudget,
    ) -> Result<WriteAck, LedgerError> {
        debug!(contract = self.contract_id(), signer, method, gas = budget.gas, "Ledger write");
        let args = encode_args(method, args)?;
        self.bounded(method, self.ledger.write(signer, method, args, budget))
            .await
    }

    /// Current portfolio. A missing record reads as an empty portfolio.
    pub async fn portfolio(
        &self,
        account_id: &str,
        default_risk: RiskTolerance,
    ) -> Result<Portfolio, AgentError> {
        let portfolio: Option<Portfolio> = self.read(methods::GET_PORTFOLIO, account_id).await?;
        Ok(portfolio.unwrap_or_else(|| Portfolio::empty(default_risk)))
    }

    /// Trade requests recorded for an account.
    pub async fn trade_history(&self, account_id: &str) -> Result<Vec<TradeRequest>, AgentError> {
        let history: Option<Vec<TradeRequest>> =
            self.read(methods::GET_TRADE_HISTORY, account_id).await?;
        Ok(history.unwrap_or_default())
    }

    /// Stored recommendation text, verbatim.
    pub async fn recommendation(&self, account_id: &str) -> Result<Option<String>, AgentError> {
        let text: Option<String> = self.read(methods::GET_AI_RECOMMENDATION, account_id).await?;
        Ok(text.filter(|s| !s.is_empty()))
    }

    /// Store recommendation text for an account.
    pub async fn set_recommendation(
        &self,
        account_id: &str,
        text: &str,
        budget: FeeBudget,
    ) -> Result<WriteAck, AgentError> {
        Ok(self
            .write(
                account_id,
                methods::SET_AI_RECOMMENDATION,
                &SetRecommendationArgs { recommendation: text },
                budget,
            )
            .await?)
    }

    /// Submit a trade request. `amount` is in the ledger's smallest unit.
    pub async fn request_trade(
        &self,
        account_id: &str,
        asset: &str,
        amount: u128,
        action: TradeAction,
        budget: FeeBudget,
    ) -> Result<WriteAck, AgentError> {
        Ok(self
            .write(
                account_id,
                methods::REQUEST_TRADE,
                &RequestTradeArgs {
                    asset,
                    amount,
                    action: action.as_str(),
                },
                budget,
            )
            .await?)
    }
}
