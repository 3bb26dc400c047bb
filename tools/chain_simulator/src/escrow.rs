//! In-memory Ledger-B: account balances, anti-spam burns, and an escrow
//! contract whose deposits unlock with the adaptor secret.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adaptor_sig::{AdaptorPoint, AdaptorSecret};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use swap_coordinator::ledger::{AntiSpamId, EscrowAddress, EscrowLedger};
use swap_coordinator::utxo::{BlockHeight, Currency};

#[derive(Debug, Clone)]
enum DepositStatus {
    Open,
    Claimed(AdaptorSecret),
    Reclaimed,
}

#[derive(Debug, Clone)]
struct Deposit {
    depositor: EscrowAddress,
    recipient: EscrowAddress,
    adaptor: AdaptorPoint,
    amount: Currency,
    height: BlockHeight,
    status: DepositStatus,
}

#[derive(Debug, Clone, Copy)]
struct Burn {
    fee: Currency,
    height: BlockHeight,
}

#[derive(Default)]
struct EscrowState {
    height: BlockHeight,
    balances: HashMap<EscrowAddress, Currency>,
    burns: HashMap<AntiSpamId, Burn>,
    deposits: HashMap<AntiSpamId, Deposit>,
}

impl EscrowState {
    fn debit(&mut self, from: EscrowAddress, amount: Currency) -> Result<()> {
        let balance = self.balances.entry(from).or_default();
        if *balance < amount {
            bail!("{from} holds {balance}, needs {amount}");
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, to: EscrowAddress, amount: Currency) {
        let balance = self.balances.entry(to).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn confirmations(&self, included: BlockHeight) -> u64 {
        if self.height < included {
            0
        } else {
            self.height - included + 1
        }
    }
}

/// Ledger-B. Every write lands in the next block.
pub struct EscrowNetwork {
    state: Mutex<EscrowState>,
    suggested_fee: Currency,
    reclaim_delay: BlockHeight,
}

impl EscrowNetwork {
    pub fn new(suggested_fee: Currency, reclaim_delay: BlockHeight) -> Self {
        Self {
            state: Mutex::new(EscrowState::default()),
            suggested_fee,
            reclaim_delay,
        }
    }

    fn chain(&self) -> MutexGuard<'_, EscrowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn height(&self) -> BlockHeight {
        self.chain().height
    }

    pub fn mine(&self, blocks: u64) -> BlockHeight {
        let mut chain = self.chain();
        chain.height += blocks;
        chain.height
    }

    pub fn fund(&self, to: EscrowAddress, amount: Currency) {
        self.chain().credit(to, amount);
    }

    pub fn balance(&self, of: &EscrowAddress) -> Currency {
        self.chain().balances.get(of).copied().unwrap_or(0)
    }

    pub fn burn(&self, from: EscrowAddress, id: AntiSpamId, fee: Currency) -> Result<()> {
        let mut chain = self.chain();
        if chain.burns.contains_key(&id) {
            bail!("anti-spam id {id} already burned");
        }
        chain.debit(from, fee)?;
        let height = chain.height + 1;
        chain.burns.insert(id, Burn { fee, height });
        debug!(id, fee, height, "Anti-spam fee burned");
        Ok(())
    }

    pub fn burn_confirmations(&self, id: AntiSpamId, fee: Currency) -> u64 {
        let chain = self.chain();
        chain
            .burns
            .get(&id)
            .filter(|burn| burn.fee >= fee)
            .map_or(0, |burn| chain.confirmations(burn.height))
    }

    pub fn deposit(
        &self,
        depositor: EscrowAddress,
        recipient: EscrowAddress,
        adaptor: AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<()> {
        let mut chain = self.chain();
        if chain.deposits.contains_key(&id) {
            bail!("deposit {id} already exists");
        }
        chain.debit(depositor, amount)?;
        let height = chain.height + 1;
        chain.deposits.insert(
            id,
            Deposit {
                depositor,
                recipient,
                adaptor,
                amount,
                height,
                status: DepositStatus::Open,
            },
        );
        debug!(id, %recipient, amount, height, "Escrow deposit");
        Ok(())
    }

    pub fn deposit_confirmations(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> u64 {
        let chain = self.chain();
        chain
            .deposits
            .get(&id)
            .filter(|deposit| {
                matches!(deposit.status, DepositStatus::Open)
                    && deposit.recipient == recipient
                    && deposit.adaptor == *adaptor
                    && deposit.amount == amount
            })
            .map_or(0, |deposit| chain.confirmations(deposit.height))
    }

    /// Pays the deposit to its recipient and publishes `secret`.
    pub fn claim(&self, caller: EscrowAddress, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()> {
        let mut chain = self.chain();
        let deposit = chain
            .deposits
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no deposit {id}"))?;
        if !matches!(deposit.status, DepositStatus::Open) {
            bail!("deposit {id} already settled");
        }
        if deposit.recipient != caller {
            bail!("{caller} is not the recipient of deposit {id}");
        }
        if !secret.matches(&deposit.adaptor) {
            bail!("secret does not open deposit {id}");
        }
        deposit.status = DepositStatus::Claimed(secret.clone());
        let (recipient, amount) = (deposit.recipient, deposit.amount);
        chain.credit(recipient, amount);
        info!(id, %recipient, amount, "Escrow deposit claimed");
        Ok(())
    }

    pub fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Option<AdaptorSecret> {
        self.chain()
            .deposits
            .values()
            .find_map(|deposit| match &deposit.status {
                DepositStatus::Claimed(secret) if deposit.adaptor == *adaptor => {
                    Some(secret.clone())
                }
                _ => None,
            })
    }

    /// Returns an unclaimed deposit to its depositor once the delay passed.
    pub fn reclaim(&self, caller: EscrowAddress, id: AntiSpamId) -> Result<()> {
        let mut chain = self.chain();
        let height = chain.height;
        let delay = self.reclaim_delay;
        let deposit = chain
            .deposits
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no deposit {id}"))?;
        if !matches!(deposit.status, DepositStatus::Open) {
            bail!("deposit {id} already settled");
        }
        if deposit.depositor != caller {
            bail!("{caller} did not make deposit {id}");
        }
        if height < deposit.height + delay {
            bail!(
                "deposit {id} is locked until height {}",
                deposit.height + delay
            );
        }
        deposit.status = DepositStatus::Reclaimed;
        let (depositor, amount) = (deposit.depositor, deposit.amount);
        chain.credit(depositor, amount);
        info!(id, %depositor, amount, "Escrow deposit reclaimed");
        Ok(())
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
                            info!(height = self.height(), "Escrow miner stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

pub struct EscrowWallet {
    network: Arc<EscrowNetwork>,
    address: EscrowAddress,
}

impl EscrowWallet {
    pub fn new(network: Arc<EscrowNetwork>) -> Self {
        let mut address = [0u8; 20];
        OsRng.fill_bytes(&mut address);
        Self {
            network,
            address: EscrowAddress(address),
        }
    }

    pub fn network(&self) -> &Arc<EscrowNetwork> {
        &self.network
    }

    pub fn balance(&self) -> Currency {
        self.network.balance(&self.address)
    }
}

#[async_trait]
impl EscrowLedger for EscrowWallet {
    async fn burn_anti_spam_fee(&self, id: AntiSpamId, fee: Currency) -> Result<()> {
        self.network.burn(self.address, id, fee)
    }

    async fn anti_spam_confirmations(&self, id: AntiSpamId, fee: Currency) -> Result<u64> {
        Ok(self.network.burn_confirmations(id, fee))
    }

    async fn deposit(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<()> {
        self.network
            .deposit(self.address, recipient, *adaptor, amount, id)
    }

    async fn deposit_confirmations(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<u64> {
        Ok(self
            .network
            .deposit_confirmations(recipient, adaptor, amount, id))
    }

    async fn claim_deposit(&self, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()> {
        self.network.claim(self.address, secret, id)
    }

    async fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Result<Option<AdaptorSecret>> {
        Ok(self.network.revealed_secret(adaptor))
    }

    async fn reclaim_deposit(&self, id: AntiSpamId) -> Result<()> {
        self.network.reclaim(self.address, id)
    }

    fn address(&self) -> EscrowAddress {
        self.address
    }

    async fn suggested_fee(&self) -> Result<Currency> {
        Ok(self.network.suggested_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptor_sig::generate_adaptor;

    fn pair() -> (Arc<EscrowNetwork>, EscrowWallet, EscrowWallet) {
        let network = Arc::new(EscrowNetwork::new(1, 5));
        let depositor = EscrowWallet::new(network.clone());
        let recipient = EscrowWallet::new(network.clone());
        network.fund(depositor.address(), 1_000);
        (network, depositor, recipient)
    }

    #[tokio::test]
    async fn claim_requires_matching_secret_and_reveals_it() {
        let (network, depositor, recipient) = pair();
        let (secret, point) = generate_adaptor();
        let (wrong, _) = generate_adaptor();

        depositor
            .deposit(recipient.address(), &point, 400, 7)
            .await
            .expect("deposit");
        assert_eq!(
            recipient
                .deposit_confirmations(recipient.address(), &point, 400, 7)
                .await
                .expect("confirmations"),
            0
        );
        network.mine(3);
        assert_eq!(
            recipient
                .deposit_confirmations(recipient.address(), &point, 400, 7)
                .await
                .expect("confirmations"),
            3
        );

        assert!(recipient.claim_deposit(&wrong, 7).await.is_err());
        assert!(depositor.claim_deposit(&secret, 7).await.is_err());
        assert!(depositor.revealed_secret(&point).await.expect("query").is_none());

        recipient.claim_deposit(&secret, 7).await.expect("claim");
        assert_eq!(recipient.balance(), 400);
        assert_eq!(depositor.balance(), 600);
        let revealed = depositor
            .revealed_secret(&point)
            .await
            .expect("query")
            .expect("secret published");
        assert!(revealed.matches(&point));
        assert!(depositor.reclaim_deposit(7).await.is_err());
    }

    #[tokio::test]
    async fn reclaim_waits_for_delay() {
        let (network, depositor, recipient) = pair();
        let (_, point) = generate_adaptor();
        depositor
            .deposit(recipient.address(), &point, 300, 9)
            .await
            .expect("deposit");

        network.mine(5);
        assert!(depositor.reclaim_deposit(9).await.is_err());
        network.mine(1);
        assert!(recipient.reclaim_deposit(9).await.is_err());
        depositor.reclaim_deposit(9).await.expect("reclaim");
        assert_eq!(depositor.balance(), 1_000);
    }

    #[tokio::test]
    async fn burns_are_single_use() {
        let (network, depositor, _) = pair();
        depositor.burn_anti_spam_fee(42, 10).await.expect("burn");
        assert!(depositor.burn_anti_spam_fee(42, 10).await.is_err());
        network.mine(2);
        assert_eq!(depositor.anti_spam_confirmations(42, 10).await.expect("confs"), 2);
        assert_eq!(depositor.anti_spam_confirmations(42, 11).await.expect("confs"), 0);
        assert_eq!(depositor.balance(), 990);
    }
}
