use adaptor_sig::{AdaptorPoint, AdaptorSignature, NonceCommitment, PublicKey};
use serde::{Deserialize, Serialize};

use crate::ledger::EscrowAddress;
use crate::utxo::{BlockHeight, Currency, OutputId, UnlockHash};

/// A price quote. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub message: String,
    pub available: bool,
    pub counter_amount: Currency,
    pub anti_spam_fee: Currency,
}

impl Offer {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            available: false,
            counter_amount: 0,
            anti_spam_fee: 0,
        }
    }

    /// Everything the initiator pays on Ledger-B.
    pub fn total_cost(&self) -> Currency {
        self.counter_amount.saturating_add(self.anti_spam_fee)
    }

    /// `|a - b| * 100 <= a * percent`, comparing total cost.
    pub fn is_similar(&self, other: &Offer, percent: u32) -> bool {
        if self.available != other.available {
            return false;
        }
        let a = self.total_cost();
        let b = other.total_cost();
        a.abs_diff(b).saturating_mul(100) <= a.saturating_mul(Currency::from(percent))
    }
}

/// Responder's half of the refund-path material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDetails {
    pub responder_pubkey: PublicKey,
    pub funding_output: OutputId,
    pub refund_destination: UnlockHash,
    pub timelock: BlockHeight,
    pub responder_nonce: NonceCommitment,
    /// Fee both joint spends pay.
    pub miner_fee: Currency,
}

/// Responder's half of the claim-path material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorDetails {
    pub responder_claim_nonce: NonceCommitment,
    pub adaptor_point: AdaptorPoint,
    pub adaptor_signature: AdaptorSignature,
    pub deposit_recipient: EscrowAddress,
}
