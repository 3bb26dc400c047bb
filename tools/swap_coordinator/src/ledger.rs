//! Capabilities consumed from the two chains.
//!
//! Implementations own their transport and retry policy; the protocol core
//! only sees success or a definitive failure.

use std::fmt;

use adaptor_sig::{AdaptorPoint, AdaptorSecret};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utxo::{BlockHeight, Currency, SpendableOutput, Transaction, TransactionId, UnlockHash};

/// Identifier of an anti-spam payment on Ledger-B. Also keys the escrow
/// deposit made for the same swap.
pub type AntiSpamId = u64;

#[async_trait]
pub trait UtxoLedger: Send + Sync {
    async fn spendable_outputs(&self) -> Result<Vec<SpendableOutput>>;
    async fn next_address(&self) -> Result<UnlockHash>;
    async fn height(&self) -> Result<BlockHeight>;
    /// Adds signatures for every input the wallet controls.
    async fn sign(&self, tx: Transaction) -> Result<Transaction>;
    async fn broadcast(&self, tx: &Transaction) -> Result<TransactionId>;
    /// Confirmations of the most recent output paying `value` to `destination`.
    async fn confirmations(&self, destination: &UnlockHash, value: Currency) -> Result<u64>;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EscrowAddress(pub [u8; 20]);

impl fmt::Display for EscrowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EscrowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EscrowAddress({self})")
    }
}

impl TryFrom<String> for EscrowAddress {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(value.trim_start_matches("0x"), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<EscrowAddress> for String {
    fn from(value: EscrowAddress) -> Self {
        value.to_string()
    }
}

#[async_trait]
pub trait EscrowLedger: Send + Sync {
    async fn burn_anti_spam_fee(&self, id: AntiSpamId, fee: Currency) -> Result<()>;
    async fn anti_spam_confirmations(&self, id: AntiSpamId, fee: Currency) -> Result<u64>;
    async fn deposit(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<()>;
    async fn deposit_confirmations(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<u64>;
    /// Claims the deposit, publishing `secret` on chain.
    async fn claim_deposit(&self, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()>;
    async fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Result<Option<AdaptorSecret>>;
    async fn reclaim_deposit(&self, id: AntiSpamId) -> Result<()>;
    fn address(&self) -> EscrowAddress;
    async fn suggested_fee(&self) -> Result<Currency>;
}
