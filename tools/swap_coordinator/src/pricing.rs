//! Price quotes issued by the responder.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::debug;

use crate::config::PricingConfig;
use crate::error::Result;
use crate::ledger::{EscrowLedger, UtxoLedger};
use crate::offer::Offer;
use crate::utxo::Currency;

pub const CRITICAL_PHASE_MESSAGE: &str =
    "The server is currently in a critical phase of another swap. Please try again in a minute.";
pub const INSUFFICIENT_FUNDS_MESSAGE: &str = "Insufficient funds to make an offer.";

#[async_trait]
pub trait PricingPolicy: Send + Sync {
    /// Quotes `amount` base units, with `miner_fee` paid by each Ledger-A
    /// transaction of the swap. A paused policy returns an unavailable offer.
    async fn offer(&self, amount: Currency, miner_fee: Currency, paused: bool) -> Result<Offer>;
}

pub struct FixedRatePricing {
    config: PricingConfig,
    utxo: Arc<dyn UtxoLedger>,
    escrow: Arc<dyn EscrowLedger>,
}

impl FixedRatePricing {
    pub fn new(
        config: PricingConfig,
        utxo: Arc<dyn UtxoLedger>,
        escrow: Arc<dyn EscrowLedger>,
    ) -> Self {
        Self {
            config,
            utxo,
            escrow,
        }
    }

    /// `ceil((amount + 2 * miner_fee) * rate) + premium + gas * fee`
    pub fn counter_amount(
        &self,
        amount: Currency,
        miner_fee: Currency,
        suggested_fee: Currency,
    ) -> Option<(Currency, Currency)> {
        let gross = amount.checked_add(miner_fee.checked_mul(2)?)?;
        let scaled = gross.checked_mul(self.config.rate_numerator)?;
        let converted = scaled.div_ceil(self.config.rate_denominator);
        let escrow_fee = suggested_fee.checked_mul(Currency::from(self.config.gas_estimate))?;
        let counter = converted
            .checked_add(self.config.premium)?
            .checked_add(escrow_fee)?;
        Some((counter, escrow_fee))
    }
}

#[async_trait]
impl PricingPolicy for FixedRatePricing {
    async fn offer(&self, amount: Currency, miner_fee: Currency, paused: bool) -> Result<Offer> {
        if paused {
            return Ok(Offer::unavailable(CRITICAL_PHASE_MESSAGE));
        }
        if amount < self.config.min_amount {
            return Ok(Offer::unavailable(format!(
                "The minimum amount is {}.",
                self.config.min_amount
            )));
        }

        let balance: Currency = self
            .utxo
            .spendable_outputs()
            .await?
            .iter()
            .map(|output| output.value)
            .sum();
        if amount >= balance {
            debug!(amount, balance, "Declining offer above spendable balance");
            return Ok(Offer::unavailable(INSUFFICIENT_FUNDS_MESSAGE));
        }

        let suggested_fee = self.escrow.suggested_fee().await?;
        let (counter_amount, escrow_fee) = self
            .counter_amount(amount, miner_fee, suggested_fee)
            .ok_or_else(|| anyhow!("price overflow for amount {amount}"))?;

        Ok(Offer {
            message: format!(
                "Selling {amount} for {counter_amount}, including {escrow_fee} to claim the escrow deposit."
            ),
            available: true,
            counter_amount,
            anti_spam_fee: self.config.anti_spam_fee,
        })
    }
}
