//! In-memory Ledger-A: a UTXO chain that checks signatures, spends, and
//! timelocks, plus a keyring wallet on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adaptor_sig::{verify, Keypair};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use swap_coordinator::ledger::UtxoLedger;
use swap_coordinator::utxo::{
    BlockHeight, Currency, Output, OutputId, SpendableOutput, Transaction, TransactionId,
    UnlockConditions, UnlockHash,
};

#[derive(Debug, Clone)]
struct CreatedOutput {
    output: Output,
    height: BlockHeight,
}

#[derive(Default)]
struct ChainState {
    height: BlockHeight,
    outputs: HashMap<OutputId, CreatedOutput>,
    spent: HashSet<OutputId>,
    mempool: Vec<Transaction>,
    included: HashMap<TransactionId, BlockHeight>,
    faucet_nonce: u64,
}

impl ChainState {
    fn pending_spends(&self) -> HashSet<OutputId> {
        self.mempool
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.parent_id))
            .collect()
    }

    fn validate(&self, tx: &Transaction) -> Result<()> {
        if tx.inputs.is_empty() {
            bail!("transaction has no inputs");
        }
        if tx.timelock > self.height + 1 {
            bail!("timelock {} not reached at height {}", tx.timelock, self.height);
        }

        let pending = self.pending_spends();
        let digest = tx.sig_hash();
        let mut input_total: Currency = 0;
        for input in &tx.inputs {
            let parent = self
                .outputs
                .get(&input.parent_id)
                .ok_or_else(|| anyhow!("unknown output {}", input.parent_id))?;
            if self.spent.contains(&input.parent_id) || pending.contains(&input.parent_id) {
                bail!("output {} already spent", input.parent_id);
            }
            if input.unlock_conditions.unlock_hash() != parent.output.unlock_hash {
                bail!("unlock conditions do not match output {}", input.parent_id);
            }
            let valid = tx
                .signatures
                .iter()
                .filter(|sig| sig.parent_id == input.parent_id)
                .filter(|sig| input.unlock_conditions.public_keys.contains(&sig.public_key))
                .filter(|sig| verify(&sig.public_key, &digest, &sig.signature))
                .count();
            if (valid as u64) < u64::from(input.unlock_conditions.signatures_required) {
                bail!("missing or invalid signature for output {}", input.parent_id);
            }
            input_total = input_total
                .checked_add(parent.output.value)
                .ok_or_else(|| anyhow!("input overflow"))?;
        }

        let spent_total = tx
            .output_total()
            .checked_add(tx.miner_fee)
            .ok_or_else(|| anyhow!("output overflow"))?;
        if input_total != spent_total {
            bail!("inputs {input_total} do not balance outputs plus fee {spent_total}");
        }
        Ok(())
    }

    fn include(&mut self, tx: Transaction, height: BlockHeight) {
        for input in &tx.inputs {
            self.spent.insert(input.parent_id);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            self.outputs.insert(
                tx.output_id(index),
                CreatedOutput {
                    output: output.clone(),
                    height,
                },
            );
        }
        self.included.insert(tx.id(), height);
    }
}

/// The shared chain. Broadcast transactions wait in the mempool until the
/// next block.
#[derive(Default)]
pub struct UtxoNetwork {
    state: Mutex<ChainState>,
}

impl UtxoNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn height(&self) -> BlockHeight {
        self.chain().height
    }

    /// Mints a confirmed output out of thin air.
    pub fn fund(&self, destination: UnlockHash, value: Currency) -> OutputId {
        let mut chain = self.chain();
        chain.faucet_nonce += 1;
        let tx = Transaction {
            outputs: vec![Output {
                value,
                unlock_hash: destination,
            }],
            timelock: chain.faucet_nonce,
            ..Transaction::default()
        };
        let height = chain.height;
        let id = tx.output_id(0);
        chain.include(tx, height);
        debug!(%destination, value, "Faucet output");
        id
    }

    pub fn submit(&self, tx: &Transaction) -> Result<TransactionId> {
        let mut chain = self.chain();
        chain.validate(tx)?;
        let id = tx.id();
        debug!(tx_id = %id, timelock = tx.timelock, "Transaction accepted into mempool");
        chain.mempool.push(tx.clone());
        Ok(id)
    }

    pub fn mine(&self, blocks: u64) -> BlockHeight {
        let mut chain = self.chain();
        for _ in 0..blocks {
            chain.height += 1;
            let height = chain.height;
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut chain.mempool)
                .into_iter()
                .partition(|tx| tx.timelock <= height);
            chain.mempool = waiting;
            for tx in ready {
                debug!(tx_id = %tx.id(), height, "Transaction included");
                chain.include(tx, height);
            }
        }
        chain.height
    }

    pub fn is_included(&self, tx_id: &TransactionId) -> bool {
        self.chain().included.contains_key(tx_id)
    }

    /// Unspent value held by `destination`.
    pub fn balance(&self, destination: &UnlockHash) -> Currency {
        let chain = self.chain();
        chain
            .outputs
            .iter()
            .filter(|(id, created)| {
                created.output.unlock_hash == *destination && !chain.spent.contains(id)
            })
            .map(|(_, created)| created.output.value)
            .sum()
    }

    /// Confirmations of the youngest output paying `value` to `destination`.
    pub fn confirmations(&self, destination: &UnlockHash, value: Currency) -> u64 {
        let chain = self.chain();
        chain
            .outputs
            .values()
            .filter(|created| {
                created.output.unlock_hash == *destination && created.output.value == value
            })
            .map(|created| chain.height.saturating_sub(created.height) + 1)
            .min()
            .unwrap_or(0)
    }

    fn unspent_for(&self, owned: &HashMap<UnlockHash, Keypair>) -> Vec<(OutputId, Output)> {
        let chain = self.chain();
        let pending = chain.pending_spends();
        let mut unspent: Vec<_> = chain
            .outputs
            .iter()
            .filter(|(id, created)| {
                owned.contains_key(&created.output.unlock_hash)
                    && !chain.spent.contains(id)
                    && !pending.contains(id)
            })
            .map(|(id, created)| (*id, created.output.clone()))
            .collect();
        unspent.sort_by_key(|(id, _)| *id);
        unspent
    }

    pub fn spawn_miner(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.mine(1);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(height = self.height(), "UTXO miner stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// A wallet holding one single-key address per `next_address` call.
pub struct UtxoWallet {
    network: Arc<UtxoNetwork>,
    keys: Mutex<HashMap<UnlockHash, Keypair>>,
}

impl UtxoWallet {
    pub fn new(network: Arc<UtxoNetwork>) -> Self {
        Self {
            network,
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<UnlockHash, Keypair>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn network(&self) -> &Arc<UtxoNetwork> {
        &self.network
    }

    pub fn new_address(&self) -> UnlockHash {
        let keypair = Keypair::generate();
        let address = UnlockConditions::single(*keypair.public()).unlock_hash();
        self.keys().insert(address, keypair);
        address
    }

    /// Funds a fresh address from the faucet.
    pub fn fund(&self, value: Currency) -> UnlockHash {
        let address = self.new_address();
        self.network.fund(address, value);
        address
    }

    pub fn balance(&self) -> Currency {
        let keys = self.keys();
        keys.keys().map(|address| self.network.balance(address)).sum()
    }
}

#[async_trait]
impl UtxoLedger for UtxoWallet {
    async fn spendable_outputs(&self) -> Result<Vec<SpendableOutput>> {
        let keys = self.keys();
        Ok(self
            .network
            .unspent_for(&keys)
            .into_iter()
            .filter_map(|(id, output)| {
                keys.get(&output.unlock_hash).map(|keypair| SpendableOutput {
                    id,
                    value: output.value,
                    unlock_conditions: UnlockConditions::single(*keypair.public()),
                })
            })
            .collect())
    }

    async fn next_address(&self) -> Result<UnlockHash> {
        Ok(self.new_address())
    }

    async fn height(&self) -> Result<BlockHeight> {
        Ok(self.network.height())
    }

    async fn sign(&self, mut tx: Transaction) -> Result<Transaction> {
        let digest = tx.sig_hash();
        let keys = self.keys();
        let inputs: Vec<_> = tx
            .inputs
            .iter()
            .map(|input| (input.parent_id, input.unlock_conditions.unlock_hash()))
            .collect();
        for (parent_id, address) in inputs {
            let keypair = keys
                .get(&address)
                .ok_or_else(|| anyhow!("wallet does not own input {parent_id}"))?;
            tx.attach_signature(parent_id, *keypair.public(), keypair.sign(&digest));
        }
        Ok(tx)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<TransactionId> {
        self.network.submit(tx)
    }

    async fn confirmations(&self, destination: &UnlockHash, value: Currency) -> Result<u64> {
        Ok(self.network.confirmations(destination, value))
    }
}
