//! In-memory ledger for integration testing.
//!
//! Stands in for the portfolio contract: holds portfolios, the stored
//! recommendation per account, and a trade history that grows with every
//! accepted `request_trade`. Writes are recorded so tests can inspect
//! exactly what was submitted and by whom. Call arguments are decoded with
//! the contract's own parameter types, so a `Balance` sent as a string is
//! rejected the way the contract would reject it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use portfolio_advisor::ledger::{methods, Ledger, WriteAck};
use portfolio_advisor::types::{FeeBudget, LedgerError};

#[derive(Deserialize)]
struct AccountArgs {
    account_id: String,
}

#[derive(Deserialize)]
struct SetRecommendationArgs {
    recommendation: String,
}

#[derive(Deserialize)]
struct RequestTradeArgs {
    asset: String,
    amount: u128,
    action: String,
}

#[derive(Serialize)]
struct HistoryEntry {
    asset: String,
    amount: u128,
    action: String,
    timestamp: u64,
}

fn decode_args<T: serde::de::DeserializeOwned>(method: &str, args: &str) -> Result<T, LedgerError> {
    serde_json::from_str(args)
        .map_err(|e| LedgerError::Rpc(format!("{method}: failed to deserialize arguments: {e}")))
}

/// A state-changing call as the ledger received it.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub signer: String,
    pub method: String,
    /// Arguments exactly as sent.
    pub raw_args: String,
    /// Arguments parsed for inspection. Integers past u64 read as floats
    /// here; use `trade_amount` for exact amounts.
    pub args: Value,
    pub budget: FeeBudget,
}

impl RecordedWrite {
    /// The exact `amount` of a `request_trade` call.
    pub fn trade_amount(&self) -> Option<u128> {
        decode_args::<RequestTradeArgs>(&self.method, &self.raw_args)
            .ok()
            .map(|a| a.amount)
    }
}

#[derive(Default)]
struct State {
    portfolios: HashMap<String, String>,
    recommendations: HashMap<String, String>,
    history: HashMap<String, Vec<HistoryEntry>>,
    writes: Vec<RecordedWrite>,
    /// Writes to these methods are rejected.
    failing_methods: Vec<String>,
    clock: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_portfolio(&self, account: &str, portfolio: Value) {
        self.set_portfolio_json(account, &portfolio.to_string());
    }

    /// Store a portfolio as raw JSON, for balances a `Value` cannot hold.
    pub fn set_portfolio_json(&self, account: &str, portfolio: &str) {
        self.state
            .lock()
            .unwrap()
            .portfolios
            .insert(account.to_string(), portfolio.to_string());
    }

    /// Store recommendation text directly, as an earlier cycle would have.
    pub fn seed_recommendation(&self, account: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .recommendations
            .insert(account.to_string(), text.to_string());
    }

    pub fn stored_recommendation(&self, account: &str) -> Option<String> {
        self.state.lock().unwrap().recommendations.get(account).cloned()
    }

    /// Reject every subsequent write to `method`.
    pub fn fail_writes_to(&self, method: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_methods
            .push(method.to_string());
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn writes_to(&self, method: &str) -> Vec<RecordedWrite> {
        self.writes().into_iter().filter(|w| w.method == method).collect()
    }

    pub fn history_len(&self, account: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .history
            .get(account)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn read(&self, method: &str, args: String) -> Result<String, LedgerError> {
        let AccountArgs { account_id } = decode_args(method, &args)?;
        let state = self.state.lock().unwrap();
        let text = match method {
            methods::GET_PORTFOLIO => state
                .portfolios
                .get(&account_id)
                .cloned()
                .unwrap_or_else(|| "null".to_string()),
            methods::GET_AI_RECOMMENDATION => {
                serde_json::to_string(&state.recommendations.get(&account_id)).unwrap()
            }
            methods::GET_TRADE_HISTORY => {
                let empty = Vec::new();
                serde_json::to_string(state.history.get(&account_id).unwrap_or(&empty)).unwrap()
            }
            other => return Err(LedgerError::Rpc(format!("unknown view method {other}"))),
        };
        Ok(text)
    }

    async fn write(
        &self,
        signer: &str,
        method: &str,
        args: String,
        budget: FeeBudget,
    ) -> Result<WriteAck, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(RecordedWrite {
            signer: signer.to_string(),
            method: method.to_string(),
            args: serde_json::from_str(&args).unwrap_or(Value::Null),
            raw_args: args.clone(),
            budget,
        });

        if state.failing_methods.iter().any(|m| m == method) {
            return Err(LedgerError::Rpc(format!("{method}: rejected by contract")));
        }

        match method {
            methods::SET_AI_RECOMMENDATION => {
                let SetRecommendationArgs { recommendation } = decode_args(method, &args)?;
                state.recommendations.insert(signer.to_string(), recommendation);
            }
            methods::REQUEST_TRADE => {
                let RequestTradeArgs { asset, amount, action } = decode_args(method, &args)?;
                if budget.deposit == 0 {
                    return Err(LedgerError::FeeRejected("request_trade requires a deposit".into()));
                }
                let timestamp = (state.clock + 1) * 1_000_000_000;
                state
                    .history
                    .entry(signer.to_string())
                    .or_default()
                    .push(HistoryEntry { asset, amount, action, timestamp });
            }
            other => return Err(LedgerError::Rpc(format!("unknown call method {other}"))),
        }

        state.clock += 1;
        Ok(WriteAck {
            receipt_id: format!("tx-{}", state.clock),
        })
    }

    fn contract_id(&self) -> &str {
        "portfolio.testnet"
    }
}

#[tokio::test]
async fn test_in_memory_ledger_rejects_string_balance() {
    let ledger = InMemoryLedger::new();
    let err = ledger
        .write(
            "alice.testnet",
            methods::REQUEST_TRADE,
            r#"{"asset":"NEAR","amount":"97000000000000000000000000","action":"buy"}"#.to_string(),
            FeeBudget { gas: 1, deposit: 1 },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Rpc(m) if m.contains("u128")));
    assert_eq!(ledger.history_len("alice.testnet"), 0);
}
