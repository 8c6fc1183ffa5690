//! NEAR ledger adapter.
//!
//! View calls go straight to a NEAR JSON-RPC node (`query` with
//! `request_type = call_function`). Function calls are handed to a signing
//! relay, which holds the account keys and submits the transaction; the
//! relay is authenticated with a bearer token taken from configuration.
//!
//! RPC docs: https://docs.near.org/api/rpc/contracts#call-a-contract-function

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Ledger, WriteAck};
use crate::config::LedgerConfig;
use crate::types::{FeeBudget, LedgerError};

// ---------------------------------------------------------------------------
// RPC / relay wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<CallFunctionResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallFunctionResult {
    /// UTF-8 JSON bytes returned by the contract method.
    #[serde(default)]
    result: Vec<u8>,
    #[serde(default)]
    logs: Vec<String>,
    /// Set instead of `result` when the view call panicked.
    #[serde(default)]
    error: Option<String>,
}

/// A function call for the relay to sign. `args_base64` carries the
/// method arguments as raw bytes, the same way a FunctionCall action does.
#[derive(Debug, Serialize)]
struct RelayCall<'a> {
    signer_id: &'a str,
    receiver_id: &'a str,
    method_name: &'a str,
    args_base64: String,
    gas: String,
    deposit: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct NearRpcLedger {
    http: Client,
    node_url: String,
    relay_url: String,
    contract_id: String,
    relay_token: SecretString,
    timeout_secs: u64,
}

impl NearRpcLedger {
    pub fn new(config: &LedgerConfig, relay_token: SecretString) -> Result<Self, LedgerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .user_agent("portfolio-advisor/0.1.0")
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            node_url: config.node_url.clone(),
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
            contract_id: config.contract_id.clone(),
            relay_token,
            timeout_secs: config.call_timeout_secs,
        })
    }

    fn transport_error(&self, method: &str, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout {
                method: method.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            LedgerError::Transport(format!("{method}: {e}"))
        }
    }

    /// Decode the bytes a view method returned. Empty output reads as null.
    fn decode_view(method: &str, result: CallFunctionResult) -> Result<String, LedgerError> {
        if let Some(err) = result.error {
            return Err(LedgerError::Rpc(format!("{method}: {err}")));
        }
        for log in &result.logs {
            debug!(method, log = %log, "Contract log");
        }
        if result.result.is_empty() {
            return Ok("null".to_string());
        }
        String::from_utf8(result.result)
            .map_err(|e| LedgerError::Decode(format!("{method}: result is not UTF-8: {e}")))
    }

    /// Classify a relay failure message.
    fn relay_error(message: String) -> LedgerError {
        let lower = message.to_lowercase();
        if lower.contains("prepaid gas")
            || lower.contains("not enough balance")
            || lower.contains("notenoughbalance")
            || lower.contains("deposit")
        {
            LedgerError::FeeRejected(message)
        } else {
            LedgerError::Rpc(message)
        }
    }
}

#[async_trait]
impl Ledger for NearRpcLedger {
    async fn read(&self, method: &str, args: String) -> Result<String, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "query",
            "params": {
                "request_type": "call_function",
                "finality": "final",
                "account_id": self.contract_id,
                "method_name": method,
                "args_base64": BASE64.encode(args),
            }
        });

        let resp = self
            .http
            .post(&self.node_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}: {text}")));
        }

        let rpc: RpcResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method} response: {e}")))?;

        if let Some(err) = rpc.error {
            return Err(LedgerError::Rpc(format!("{method}: {err}")));
        }
        let result = rpc
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{method}: response has no result")))?;

        Self::decode_view(method, result)
    }

    async fn write(
        &self,
        signer: &str,
        method: &str,
        args: String,
        budget: FeeBudget,
    ) -> Result<WriteAck, LedgerError> {
        let call = RelayCall {
            signer_id: signer,
            receiver_id: &self.contract_id,
            method_name: method,
            args_base64: BASE64.encode(args),
            gas: budget.gas.to_string(),
            deposit: budget.deposit.to_string(),
        };

        let resp = self
            .http
            .post(format!("{}/call", self.relay_url))
            .bearer_auth(self.relay_token.expose_secret())
            .json(&call)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = resp.status();
        if status == StatusCode::PAYMENT_REQUIRED {
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::FeeRejected(format!("{method}: {text}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}: {text}")));
        }

        let relay: RelayResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method} relay response: {e}")))?;

        if let Some(err) = relay.error {
            warn!(signer, method, error = %err, "Relay rejected call");
            return Err(Self::relay_error(err));
        }

        let receipt_id = relay
            .transaction_hash
            .ok_or_else(|| LedgerError::Decode(format!("{method}: relay returned no transaction hash")))?;

        info!(signer, method, tx = %receipt_id, "Ledger call submitted");
        Ok(WriteAck { receipt_id })
    }

    fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
