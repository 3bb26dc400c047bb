//! Session journal.
//!
//! The responder writes a snapshot after every transition. The fully signed
//! refund transaction is written before the funding transaction is
//! broadcast, and `ResponderService::recover` reloads it after a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ledger::AntiSpamId;
use crate::state::{SwapId, SwapState};
use crate::utxo::{Currency, Transaction, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub swap_id: SwapId,
    pub state: SwapState,
    pub deadline: i64,
    pub requested_amount: Currency,
    pub counter_amount: Currency,
    pub anti_spam_fee: Currency,
    pub anti_spam_id: Option<AntiSpamId>,
    pub funding_tx_id: Option<TransactionId>,
    pub refund_tx: Option<Transaction>,
}

pub trait SwapJournal: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;
    fn load(&self, swap_id: &SwapId) -> Result<Option<SessionSnapshot>>;
    fn list(&self) -> Result<Vec<SessionSnapshot>>;
}

pub struct JsonFileJournal {
    base_dir: PathBuf,
}

impl JsonFileJournal {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create directory: {:?}", base_dir))?;
        Ok(Self { base_dir })
    }

    fn swap_file_path(&self, swap_id: &SwapId) -> PathBuf {
        self.base_dir.join(format!("{swap_id}.json"))
    }

    fn read(path: &Path) -> Result<SessionSnapshot> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse state file: {:?}", path))
    }
}

impl SwapJournal for JsonFileJournal {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let path = self.swap_file_path(&snapshot.swap_id);
        let json = serde_json::to_string_pretty(snapshot)
            .with_context(|| format!("Failed to serialize state for swap {}", snapshot.swap_id))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)
            .with_context(|| format!("Failed to write state file: {:?}", staging))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to replace state file: {:?}", path))?;
        Ok(())
    }

    fn load(&self, swap_id: &SwapId) -> Result<Option<SessionSnapshot>> {
        let path = self.swap_file_path(swap_id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn list(&self) -> Result<Vec<SessionSnapshot>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.base_dir)
            .with_context(|| format!("Failed to list {:?}", self.base_dir))?
        {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                snapshots.push(Self::read(&path)?);
            }
        }
        snapshots.sort_by_key(|snapshot| snapshot.deadline);
        Ok(snapshots)
    }
}

#[derive(Default)]
pub struct MemoryJournal {
    snapshots: Mutex<HashMap<SwapId, SessionSnapshot>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapJournal for MemoryJournal {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.swap_id, snapshot.clone());
        Ok(())
    }

    fn load(&self, swap_id: &SwapId) -> Result<Option<SessionSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(swap_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<SessionSnapshot>> {
        let mut snapshots: Vec<_> = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.deadline);
        Ok(snapshots)
    }
}
