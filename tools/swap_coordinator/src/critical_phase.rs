//! Process-wide admission control for binding offers.
//!
//! Between anti-spam verification and funding, one session holds the
//! critical phase and no other binding offer is issued. The hold lapses on
//! its own deadline if the owner never releases it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::state::SwapId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hold {
    owner: SwapId,
    until: i64,
}

#[derive(Debug, Default)]
pub struct CriticalPhase {
    hold: Mutex<Option<Hold>>,
}

impl CriticalPhase {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Hold>> {
        self.hold.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.slot().map_or(false, |hold| now <= hold.until)
    }

    pub fn owner(&self, now: i64) -> Option<SwapId> {
        self.slot().filter(|hold| now <= hold.until).map(|hold| hold.owner)
    }

    /// Enters the phase for `owner` unless another session holds it.
    pub fn try_enter(&self, owner: SwapId, until: i64, now: i64) -> bool {
        let mut slot = self.slot();
        match *slot {
            Some(hold) if hold.owner != owner && now <= hold.until => false,
            _ => {
                info!(swap_id = %owner, until, "Entering critical phase");
                *slot = Some(Hold { owner, until });
                true
            }
        }
    }

    /// Releases the phase if `owner` holds it.
    pub fn release(&self, owner: SwapId) -> bool {
        let mut slot = self.slot();
        if slot.map_or(false, |hold| hold.owner == owner) {
            debug!(swap_id = %owner, "Leaving critical phase");
            *slot = None;
            true
        } else {
            false
        }
    }
}
