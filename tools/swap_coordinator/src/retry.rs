//! Retry policy for ledger queries.
//!
//! Only idempotent reads go through `retry_with_timeout`. Broadcasts,
//! deposits and claims are passed through exactly once; resubmitting them is
//! the ledger's concern, never the protocol's.

use std::sync::Arc;
use std::time::Duration;

use adaptor_sig::{AdaptorPoint, AdaptorSecret};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::read_env_u64;
use crate::ledger::{AntiSpamId, EscrowAddress, EscrowLedger, UtxoLedger};
use crate::utxo::{BlockHeight, Currency, SpendableOutput, Transaction, TransactionId, UnlockHash};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6_000),
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let timeout_ms = read_env_u64("SWAP_LEDGER_TIMEOUT_MS", default.timeout.as_millis() as u64);
        let max_retries = read_env_u64("SWAP_LEDGER_MAX_RETRIES", default.max_retries as u64);
        let base_delay_ms = read_env_u64("SWAP_LEDGER_BASE_DELAY_MS", default.base_delay.as_millis() as u64);
        let max_delay_ms = read_env_u64("SWAP_LEDGER_MAX_DELAY_MS", default.max_delay.as_millis() as u64);
        let jitter_ms = read_env_u64("SWAP_LEDGER_JITTER_MS", default.jitter_ms);
        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries: max_retries as usize,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            jitter_ms,
        }
    }
}

pub async fn retry_with_timeout<T, F, Fut>(
    label: &'static str,
    config: &RetryConfig,
    mut action: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = config.max_retries.saturating_add(1);
    for attempt in 0..attempts {
        let outcome = timeout(config.timeout, action()).await;
        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if attempt + 1 >= attempts {
                    return Err(err);
                }
                warn!(attempt = attempt + 1, error = %err, "Ledger error on {label}; retrying");
            }
            Err(_) => {
                if attempt + 1 >= attempts {
                    return Err(anyhow::anyhow!("ledger timeout for {label}"));
                }
                warn!(attempt = attempt + 1, "Ledger timeout on {label}; retrying");
            }
        }

        let backoff = config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt as u32));
        let capped = std::cmp::min(backoff, config.max_delay);
        let jitter = if config.jitter_ms == 0 {
            Duration::from_millis(0)
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=config.jitter_ms))
        };
        sleep(capped + jitter).await;
    }

    Err(anyhow::anyhow!("ledger retry exhausted for {label}"))
}

/// Ledger-A view that retries its read-only queries.
pub struct RetryingUtxoLedger {
    inner: Arc<dyn UtxoLedger>,
    config: RetryConfig,
}

impl RetryingUtxoLedger {
    pub fn new(inner: Arc<dyn UtxoLedger>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl UtxoLedger for RetryingUtxoLedger {
    async fn spendable_outputs(&self) -> Result<Vec<SpendableOutput>> {
        retry_with_timeout("spendable_outputs", &self.config, || self.inner.spendable_outputs()).await
    }

    async fn next_address(&self) -> Result<UnlockHash> {
        self.inner.next_address().await
    }

    async fn height(&self) -> Result<BlockHeight> {
        retry_with_timeout("height", &self.config, || self.inner.height()).await
    }

    async fn sign(&self, tx: Transaction) -> Result<Transaction> {
        self.inner.sign(tx).await
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<TransactionId> {
        self.inner.broadcast(tx).await
    }

    async fn confirmations(&self, destination: &UnlockHash, value: Currency) -> Result<u64> {
        retry_with_timeout("confirmations", &self.config, || {
            self.inner.confirmations(destination, value)
        })
        .await
    }
}

/// Ledger-B view that retries its read-only queries.
pub struct RetryingEscrowLedger {
    inner: Arc<dyn EscrowLedger>,
    config: RetryConfig,
}

impl RetryingEscrowLedger {
    pub fn new(inner: Arc<dyn EscrowLedger>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl EscrowLedger for RetryingEscrowLedger {
    async fn burn_anti_spam_fee(&self, id: AntiSpamId, fee: Currency) -> Result<()> {
        self.inner.burn_anti_spam_fee(id, fee).await
    }

    async fn anti_spam_confirmations(&self, id: AntiSpamId, fee: Currency) -> Result<u64> {
        retry_with_timeout("anti_spam_confirmations", &self.config, || {
            self.inner.anti_spam_confirmations(id, fee)
        })
        .await
    }

    async fn deposit(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<()> {
        self.inner.deposit(recipient, adaptor, amount, id).await
    }

    async fn deposit_confirmations(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<u64> {
        retry_with_timeout("deposit_confirmations", &self.config, || {
            self.inner.deposit_confirmations(recipient, adaptor, amount, id)
        })
        .await
    }

    async fn claim_deposit(&self, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()> {
        self.inner.claim_deposit(secret, id).await
    }

    async fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Result<Option<AdaptorSecret>> {
        retry_with_timeout("revealed_secret", &self.config, || {
            self.inner.revealed_secret(adaptor)
        })
        .await
    }

    async fn reclaim_deposit(&self, id: AntiSpamId) -> Result<()> {
        self.inner.reclaim_deposit(id).await
    }

    fn address(&self) -> EscrowAddress {
        self.inner.address()
    }

    async fn suggested_fee(&self) -> Result<Currency> {
        retry_with_timeout("suggested_fee", &self.config, || self.inner.suggested_fee()).await
    }
}
