//! Time-bounded set of anti-spam payment ids that already backed a binding
//! offer.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock::Clock;
use crate::ledger::AntiSpamId;

#[derive(Debug)]
pub struct AntiSpamLedger {
    seen: DashMap<AntiSpamId, i64>,
    ttl_secs: i64,
}

impl AntiSpamLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl_secs: ttl.as_secs() as i64,
        }
    }

    fn expired(&self, recorded_at: i64, now: i64) -> bool {
        now >= recorded_at.saturating_add(self.ttl_secs)
    }

    /// Records `id`. Re-adding a live id keeps its original timestamp.
    pub fn add(&self, id: AntiSpamId, now: i64) {
        self.try_claim(id, now);
    }

    pub fn contains(&self, id: AntiSpamId, now: i64) -> bool {
        self.seen
            .get(&id)
            .map_or(false, |recorded_at| !self.expired(*recorded_at, now))
    }

    /// Records `id` unless a live record exists. Returns whether this call
    /// recorded it.
    pub fn try_claim(&self, id: AntiSpamId, now: i64) -> bool {
        match self.seen.entry(id) {
            Entry::Occupied(mut entry) => {
                if self.expired(*entry.get(), now) {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drops expired records and returns how many were removed.
    pub fn sweep(&self, now: i64) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, recorded_at| !self.expired(*recorded_at, now));
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep(clock.now());
                        debug!(removed, remaining = self.len(), "Swept anti-spam ledger");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(6 * 60 * 60);

    #[test]
    fn claim_is_exclusive_until_expiry() {
        let ledger = AntiSpamLedger::new(TTL);
        assert!(ledger.try_claim(42, 1_000));
        assert!(!ledger.try_claim(42, 1_001));
        assert!(ledger.contains(42, 1_000 + 6 * 3600 - 1));
        assert!(!ledger.contains(42, 1_000 + 6 * 3600));
        assert!(ledger.try_claim(42, 1_000 + 6 * 3600));
    }

    #[test]
    fn add_is_idempotent() {
        let ledger = AntiSpamLedger::new(TTL);
        ledger.add(7, 0);
        ledger.add(7, 100);
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains(7, 6 * 3600));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let ledger = AntiSpamLedger::new(TTL);
        ledger.add(1, 0);
        ledger.add(2, 3_600);
        assert_eq!(ledger.sweep(6 * 3600), 1);
        assert!(ledger.contains(2, 6 * 3600));
        assert!(!ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_shutdown() {
        let ledger = Arc::new(AntiSpamLedger::new(TTL));
        ledger.add(1, 0);
        let clock = Arc::new(ManualClock::new(7 * 3600));
        let (tx, rx) = watch::channel(false);
        let handle = ledger
            .clone()
            .spawn_sweeper(clock, Duration::from_secs(3600), rx);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert!(ledger.is_empty());
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
