//! Protocol core for two-party cross-chain swaps.
//!
//! The responder sells Ledger-A coins held in a 2-of-2 joint output; the
//! initiator pays into a Ledger-B escrow addressed to an adaptor point. The
//! responder's escrow claim reveals the adaptor secret, which is exactly what
//! the initiator needs to complete the Ledger-A claim signature.

pub mod anti_spam;
pub mod clock;
pub mod config;
pub mod critical_phase;
pub mod db;
pub mod dry_run;
pub mod error;
pub mod initiator;
pub mod ledger;
pub mod metrics;
pub mod offer;
pub mod pricing;
pub mod responder;
pub mod retry;
pub mod service;
pub mod state;
pub mod transport;
pub mod utxo;
pub mod watcher;

pub use error::{ErrorKind, Result, SwapError};
pub use initiator::{InitiatorFlow, SwapOutcome};
pub use ledger::{AntiSpamId, EscrowAddress, EscrowLedger, UtxoLedger};
pub use offer::{AdaptorDetails, Offer, RefundDetails};
pub use responder::{ResponderContext, ResponderSwap};
pub use service::ResponderService;
pub use state::{SwapId, SwapState};
