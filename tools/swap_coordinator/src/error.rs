use adaptor_sig::CryptoError;
use thiserror::Error;

use crate::ledger::AntiSpamId;
use crate::state::SwapState;
use crate::utxo::{BlockHeight, Currency};

/// Coarse classification of [`SwapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller ordering bug or an expired negotiation. Never retried.
    Sequencing,
    /// The caller may retry after waiting for confirmations or with a new id.
    AntiAbuse,
    /// Fatal to the current session.
    Verification,
    /// Normal unavailability: no funds, no counterparties.
    Unavailable,
    /// Definitive failure reported by a ledger view or the transport.
    Ledger,
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("operation requires state {expected}, session is {actual}")]
    WrongState {
        expected: SwapState,
        actual: SwapState,
    },
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("offer expired")]
    OfferExpired,
    #[error("anti-spam payment {0} not detected")]
    AntiSpamNotDetected(u64),
    #[error("anti-spam id {0} was already used")]
    AntiSpamReused(u64),
    #[error("combined refund signature does not verify")]
    InvalidRefundSig,
    #[error("responder adaptor signature does not verify")]
    InvalidAdaptorSig,
    #[error("completed claim signature does not verify")]
    InvalidClaimSig,
    #[error("refund timelock {timelock} is below the minimum {minimum}")]
    TimelockTooShort {
        timelock: BlockHeight,
        minimum: BlockHeight,
    },
    #[error("responder miner fee {fee} is below the minimum {minimum}")]
    MinerFeeTooLow { fee: Currency, minimum: Currency },
    #[error("escrow deposit not confirmed")]
    InvalidDeposit,
    #[error("insufficient funds: need more than {required}, have {available}")]
    InsufficientFunds {
        required: Currency,
        available: Currency,
    },
    #[error("no servers available")]
    NoServers,
    #[error("no server made an acceptable offer")]
    NoOffers,
    #[error("swap cancelled")]
    Cancelled,
    /// A failure after the initiator's escrow deposit went out. Carries the
    /// id to pass to `InitiatorFlow::reclaim_deposit`.
    #[error("swap failed after escrow deposit {anti_spam_id}: {source}")]
    AfterDeposit {
        anti_spam_id: AntiSpamId,
        source: Box<SwapError>,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("ledger: {0:#}")]
    Ledger(#[from] anyhow::Error),
    #[error("journal: {0:#}")]
    Journal(anyhow::Error),
    #[error("transport codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl SwapError {
    pub fn wrong_state(expected: SwapState, actual: SwapState) -> Self {
        Self::WrongState { expected, actual }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongState { .. }
            | Self::UnknownSession(_)
            | Self::OfferExpired
            | Self::Cancelled => ErrorKind::Sequencing,
            Self::AntiSpamNotDetected(_) | Self::AntiSpamReused(_) => ErrorKind::AntiAbuse,
            Self::InvalidRefundSig
            | Self::InvalidAdaptorSig
            | Self::InvalidClaimSig
            | Self::TimelockTooShort { .. }
            | Self::MinerFeeTooLow { .. }
            | Self::InvalidDeposit
            | Self::Crypto(_) => ErrorKind::Verification,
            Self::InsufficientFunds { .. } | Self::NoServers | Self::NoOffers => {
                ErrorKind::Unavailable
            }
            Self::Ledger(_) | Self::Journal(_) | Self::Codec(_) => ErrorKind::Ledger,
            Self::AfterDeposit { source, .. } => source.kind(),
        }
    }

    /// The escrow deposit left behind by a failed swap, if any.
    pub fn reclaimable_deposit(&self) -> Option<AntiSpamId> {
        match self {
            Self::AfterDeposit { anti_spam_id, .. } => Some(*anti_spam_id),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::AntiAbuse
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_anti_abuse_errors_are_retryable() {
        assert!(SwapError::AntiSpamNotDetected(1).is_retryable());
        assert!(SwapError::AntiSpamReused(1).is_retryable());
        assert!(!SwapError::InvalidRefundSig.is_retryable());
        assert!(!SwapError::OfferExpired.is_retryable());
        assert_eq!(
            SwapError::TimelockTooShort { timelock: 1, minimum: 2 }.kind(),
            ErrorKind::Verification
        );
        assert_eq!(SwapError::NoOffers.kind(), ErrorKind::Unavailable);
        assert_eq!(
            SwapError::MinerFeeTooLow { fee: 0, minimum: 1 }.kind(),
            ErrorKind::Verification
        );
    }

    #[test]
    fn after_deposit_errors_keep_the_reclaim_id() {
        let err = SwapError::AfterDeposit {
            anti_spam_id: 9,
            source: Box::new(SwapError::InvalidClaimSig),
        };
        assert_eq!(err.kind(), ErrorKind::Verification);
        assert_eq!(err.reclaimable_deposit(), Some(9));
        assert_eq!(SwapError::Cancelled.reclaimable_deposit(), None);
        assert_eq!(
            err.to_string(),
            "swap failed after escrow deposit 9: completed claim signature does not verify"
        );
    }

    #[test]
    fn ledger_errors_keep_their_context() {
        let err: SwapError = anyhow::anyhow!("connection refused")
            .context("broadcast")
            .into();
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(err.to_string(), "ledger: broadcast: connection refused");
    }
}
