//! Responder session states and identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Initialized,
    OfferedNonBinding,
    OfferedBinding,
    OfferAccepted,
    Funded,
    AdaptorProvided,
    Completed,
    Refunded,
    Aborted,
}

impl SwapState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::OfferedNonBinding => "offered_non_binding",
            Self::OfferedBinding => "offered_binding",
            Self::OfferAccepted => "offer_accepted",
            Self::Funded => "funded",
            Self::AdaptorProvided => "adaptor_provided",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Aborted)
    }

    /// Funds sit in the joint output and only the refund path protects them.
    pub fn is_funded(self) -> bool {
        matches!(self, Self::Funded | Self::AdaptorProvided)
    }

    pub fn is_pre_funding(self) -> bool {
        matches!(
            self,
            Self::Initialized | Self::OfferedNonBinding | Self::OfferedBinding | Self::OfferAccepted
        )
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapId(Uuid);

impl SwapId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwapId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SwapId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_states() {
        assert!(SwapState::Funded.is_funded());
        assert!(SwapState::AdaptorProvided.is_funded());
        assert!(SwapState::OfferAccepted.is_pre_funding());
        assert!(!SwapState::Funded.is_pre_funding());
        for state in [SwapState::Completed, SwapState::Refunded, SwapState::Aborted] {
            assert!(state.is_terminal());
            assert!(!state.is_funded());
            assert!(!state.is_pre_funding());
        }
    }

    #[test]
    fn swap_id_round_trips_through_text() {
        let id = SwapId::new();
        let parsed: SwapId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(serde_json::to_string(&SwapState::OfferedBinding).unwrap(), "\"offered_binding\"");
    }
}
