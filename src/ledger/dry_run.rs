//! Dry-run ledger wrapper.
//!
//! Reads go to the wrapped ledger so analysis runs against real state;
//! writes are logged and acknowledged with a synthetic receipt instead of
//! being submitted.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{Ledger, WriteAck};
use crate::types::{FeeBudget, LedgerError};

pub struct DryRunLedger {
    inner: Arc<dyn Ledger>,
}

impl DryRunLedger {
    pub fn new(inner: Arc<dyn Ledger>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Ledger for DryRunLedger {
    async fn read(&self, method: &str, args: String) -> Result<String, LedgerError> {
        self.inner.read(method, args).await
    }

    async fn write(
        &self,
        signer: &str,
        method: &str,
        args: String,
        budget: FeeBudget,
    ) -> Result<WriteAck, LedgerError> {
        info!(
            signer,
            method,
            args = %args,
            gas = budget.gas,
            deposit = %budget.deposit,
            "[DRY RUN] Would submit ledger call"
        );
        Ok(WriteAck {
            receipt_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
        })
    }

    fn contract_id(&self) -> &str {
        self.inner.contract_id()
    }
}
