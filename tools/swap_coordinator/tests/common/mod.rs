#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adaptor_sig::{AdaptorPoint, AdaptorSecret, Keypair};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use swap_coordinator::anti_spam::AntiSpamLedger;
use swap_coordinator::config::{PricingConfig, ResponderConfig};
use swap_coordinator::critical_phase::CriticalPhase;
use swap_coordinator::db::{MemoryJournal, SessionSnapshot, SwapJournal};
use swap_coordinator::ledger::{AntiSpamId, EscrowAddress, EscrowLedger, UtxoLedger};
use swap_coordinator::metrics::SwapMetrics;
use swap_coordinator::pricing::FixedRatePricing;
use swap_coordinator::responder::ResponderContext;
use swap_coordinator::state::{SwapId, SwapState};
use swap_coordinator::utxo::{
    BlockHeight, Currency, OutputId, SpendableOutput, Transaction, TransactionId, UnlockConditions,
    UnlockHash,
};

pub const MINER_FEE: Currency = 10;
pub const AMOUNT: Currency = 1_000;

pub struct FakeUtxo {
    pub height: AtomicU64,
    pub outputs: Vec<SpendableOutput>,
    pub broadcasts: Mutex<Vec<Transaction>>,
    pub fail_broadcast: AtomicBool,
    next_address: AtomicU64,
}

impl FakeUtxo {
    pub fn new(balance: Currency) -> Self {
        let key = Keypair::generate();
        Self {
            height: AtomicU64::new(100),
            outputs: vec![SpendableOutput {
                id: OutputId([9; 32]),
                value: balance,
                unlock_conditions: UnlockConditions::single(*key.public()),
            }],
            broadcasts: Mutex::new(Vec::new()),
            fail_broadcast: AtomicBool::new(false),
            next_address: AtomicU64::new(0),
        }
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl UtxoLedger for FakeUtxo {
    async fn spendable_outputs(&self) -> Result<Vec<SpendableOutput>> {
        Ok(self.outputs.clone())
    }

    async fn next_address(&self) -> Result<UnlockHash> {
        let n = self.next_address.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        Ok(UnlockHash(bytes))
    }

    async fn height(&self) -> Result<BlockHeight> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn sign(&self, tx: Transaction) -> Result<Transaction> {
        Ok(tx)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<TransactionId> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(anyhow!("node unreachable"));
        }
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(tx.id())
    }

    async fn confirmations(&self, _destination: &UnlockHash, _value: Currency) -> Result<u64> {
        Ok(100)
    }
}

pub struct FakeEscrow {
    pub anti_spam_confirmations: AtomicU64,
    pub deposit_confirmations: AtomicU64,
    pub deposits: Mutex<Vec<(EscrowAddress, AdaptorPoint, Currency, AntiSpamId)>>,
    pub claims: Mutex<Vec<(AdaptorSecret, AntiSpamId)>>,
    /// Reported as revealed in place of whatever the responder claimed with.
    pub forged_secret: Mutex<Option<AdaptorSecret>>,
}

impl FakeEscrow {
    pub fn new() -> Self {
        Self {
            anti_spam_confirmations: AtomicU64::new(100),
            deposit_confirmations: AtomicU64::new(100),
            deposits: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
            forged_secret: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EscrowLedger for FakeEscrow {
    async fn burn_anti_spam_fee(&self, _id: AntiSpamId, _fee: Currency) -> Result<()> {
        Ok(())
    }

    async fn anti_spam_confirmations(&self, _id: AntiSpamId, _fee: Currency) -> Result<u64> {
        Ok(self.anti_spam_confirmations.load(Ordering::SeqCst))
    }

    async fn deposit(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<()> {
        self.deposits
            .lock()
            .unwrap()
            .push((recipient, *adaptor, amount, id));
        Ok(())
    }

    async fn deposit_confirmations(
        &self,
        _recipient: EscrowAddress,
        _adaptor: &AdaptorPoint,
        _amount: Currency,
        _id: AntiSpamId,
    ) -> Result<u64> {
        Ok(self.deposit_confirmations.load(Ordering::SeqCst))
    }

    async fn claim_deposit(&self, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()> {
        self.claims.lock().unwrap().push((secret.clone(), id));
        Ok(())
    }

    async fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Result<Option<AdaptorSecret>> {
        if let Some(forged) = self.forged_secret.lock().unwrap().clone() {
            return Ok(Some(forged));
        }
        Ok(self
            .claims
            .lock()
            .unwrap()
            .iter()
            .map(|(secret, _)| secret.clone())
            .find(|secret| secret.matches(adaptor)))
    }

    async fn reclaim_deposit(&self, _id: AntiSpamId) -> Result<()> {
        Ok(())
    }

    fn address(&self) -> EscrowAddress {
        EscrowAddress([0xab; 20])
    }

    async fn suggested_fee(&self) -> Result<Currency> {
        Ok(2)
    }
}

/// A journal on a full disk.
pub struct FailingJournal;

impl SwapJournal for FailingJournal {
    fn save(&self, _snapshot: &SessionSnapshot) -> Result<()> {
        bail!("disk full")
    }

    fn load(&self, _swap_id: &SwapId) -> Result<Option<SessionSnapshot>> {
        Ok(None)
    }

    fn list(&self) -> Result<Vec<SessionSnapshot>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct TestMetrics {
    pub transitions: Mutex<Vec<(SwapState, SwapState)>>,
    pub latencies: Mutex<Vec<String>>,
}

impl SwapMetrics for TestMetrics {
    fn record_transition(&self, _swap_id: SwapId, from: SwapState, to: SwapState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn record_latency(&self, stage: &'static str, _elapsed: Duration) {
        self.latencies.lock().unwrap().push(stage.to_string());
    }
}

pub struct Harness {
    pub utxo: Arc<FakeUtxo>,
    pub escrow: Arc<FakeEscrow>,
    pub metrics: Arc<TestMetrics>,
    pub journal: Arc<MemoryJournal>,
    pub ctx: ResponderContext,
}

pub fn responder_config() -> ResponderConfig {
    ResponderConfig {
        miner_fee: MINER_FEE,
        ..ResponderConfig::default()
    }
}

pub fn pricing_config() -> PricingConfig {
    PricingConfig {
        rate_numerator: 1,
        rate_denominator: 10,
        premium: 5,
        min_amount: 100,
        gas_estimate: 500_000,
        anti_spam_fee: 3,
    }
}

pub fn harness() -> Harness {
    harness_with(responder_config(), 1_000_000)
}

pub fn harness_with(config: ResponderConfig, balance: Currency) -> Harness {
    let utxo = Arc::new(FakeUtxo::new(balance));
    let escrow = Arc::new(FakeEscrow::new());
    let metrics = Arc::new(TestMetrics::default());
    let journal = Arc::new(MemoryJournal::new());
    let pricing = Arc::new(FixedRatePricing::new(
        pricing_config(),
        utxo.clone(),
        escrow.clone(),
    ));
    let ctx = ResponderContext {
        utxo: utxo.clone(),
        escrow: escrow.clone(),
        pricing,
        anti_spam: Arc::new(AntiSpamLedger::new(config.anti_spam_ttl)),
        critical_phase: Arc::new(CriticalPhase::new()),
        config,
        metrics: metrics.clone(),
        journal: Some(journal.clone() as Arc<dyn SwapJournal>),
    };
    Harness {
        utxo,
        escrow,
        metrics,
        journal,
        ctx,
    }
}
