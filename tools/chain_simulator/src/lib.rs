//! In-memory chains for running swaps end to end without nodes.

pub mod escrow;
pub mod simulation;
pub mod utxo_chain;

pub use escrow::{EscrowNetwork, EscrowWallet};
pub use simulation::{Simulation, SimulationConfig, WithholdingEscrow};
pub use utxo_chain::{UtxoNetwork, UtxoWallet};
