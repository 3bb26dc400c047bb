use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::ledger::UtxoLedger;
use crate::utxo::{BlockHeight, Currency, SpendableOutput, Transaction, TransactionId, UnlockHash};

/// Ledger-A view that logs transactions instead of broadcasting them.
pub struct DryRunUtxoLedger {
    inner: Arc<dyn UtxoLedger>,
}

impl DryRunUtxoLedger {
    pub fn new(inner: Arc<dyn UtxoLedger>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl UtxoLedger for DryRunUtxoLedger {
    async fn spendable_outputs(&self) -> Result<Vec<SpendableOutput>> {
        self.inner.spendable_outputs().await
    }

    async fn next_address(&self) -> Result<UnlockHash> {
        self.inner.next_address().await
    }

    async fn height(&self) -> Result<BlockHeight> {
        self.inner.height().await
    }

    async fn sign(&self, tx: Transaction) -> Result<Transaction> {
        self.inner.sign(tx).await
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<TransactionId> {
        let id = tx.id();
        info!(
            tx_id = %id,
            transaction = %serde_json::to_string(tx)?,
            "Dry run: not broadcasting"
        );
        Ok(id)
    }

    async fn confirmations(&self, destination: &UnlockHash, value: Currency) -> Result<u64> {
        self.inner.confirmations(destination, value).await
    }
}
