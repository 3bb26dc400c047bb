//! One responder, one initiator, and the two chains between them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adaptor_sig::{AdaptorPoint, AdaptorSecret};
use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use swap_coordinator::anti_spam::AntiSpamLedger;
use swap_coordinator::clock::Clock;
use swap_coordinator::config::{InitiatorConfig, PricingConfig, ResponderConfig, BASE_UNIT};
use swap_coordinator::critical_phase::CriticalPhase;
use swap_coordinator::db::{JsonFileJournal, SwapJournal};
use swap_coordinator::dry_run::DryRunUtxoLedger;
use swap_coordinator::initiator::OfferApproval;
use swap_coordinator::ledger::{AntiSpamId, EscrowAddress, EscrowLedger, UtxoLedger};
use swap_coordinator::metrics::TracingMetrics;
use swap_coordinator::pricing::FixedRatePricing;
use swap_coordinator::retry::{RetryConfig, RetryingEscrowLedger, RetryingUtxoLedger};
use swap_coordinator::transport::{JsonCodecTransport, SwapTransport};
use swap_coordinator::utxo::{BlockHeight, Currency};
use swap_coordinator::{InitiatorFlow, ResponderContext, ResponderService};

use crate::escrow::{EscrowNetwork, EscrowWallet};
use crate::utxo_chain::{UtxoNetwork, UtxoWallet};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub responder: ResponderConfig,
    pub initiator: InitiatorConfig,
    pub pricing: PricingConfig,
    pub retry: RetryConfig,
    pub responder_balance: Currency,
    pub initiator_escrow_balance: Currency,
    pub escrow_fee: Currency,
    pub reclaim_delay: BlockHeight,
    /// Log the responder's Ledger-A transactions instead of broadcasting.
    pub dry_run: bool,
    pub state_dir: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            responder: ResponderConfig::default(),
            initiator: InitiatorConfig::default(),
            pricing: PricingConfig::default(),
            retry: RetryConfig::default(),
            responder_balance: 10_000 * BASE_UNIT,
            initiator_escrow_balance: 1_000_000_000_000_000_000_000,
            escrow_fee: 1_000_000_000,
            reclaim_delay: 100,
            dry_run: false,
            state_dir: None,
        }
    }
}

pub struct Simulation {
    pub utxo: Arc<UtxoNetwork>,
    pub escrow: Arc<EscrowNetwork>,
    pub responder_utxo: Arc<UtxoWallet>,
    pub responder_escrow: Arc<EscrowWallet>,
    pub initiator_utxo: Arc<UtxoWallet>,
    pub initiator_escrow: Arc<EscrowWallet>,
    pub service: Arc<ResponderService>,
    initiator_config: InitiatorConfig,
    retry: RetryConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.responder.validate()?;
        config.initiator.validate()?;
        config.pricing.validate()?;

        let utxo = Arc::new(UtxoNetwork::new());
        let escrow = Arc::new(EscrowNetwork::new(config.escrow_fee, config.reclaim_delay));

        let responder_utxo = Arc::new(UtxoWallet::new(utxo.clone()));
        responder_utxo.fund(config.responder_balance);
        let responder_escrow = Arc::new(EscrowWallet::new(escrow.clone()));
        let initiator_utxo = Arc::new(UtxoWallet::new(utxo.clone()));
        let initiator_escrow = Arc::new(EscrowWallet::new(escrow.clone()));
        escrow.fund(initiator_escrow.address(), config.initiator_escrow_balance);

        let mut responder_ledger: Arc<dyn UtxoLedger> = Arc::new(RetryingUtxoLedger::new(
            responder_utxo.clone(),
            config.retry.clone(),
        ));
        if config.dry_run {
            responder_ledger = Arc::new(DryRunUtxoLedger::new(responder_ledger));
        }
        let responder_escrow_ledger: Arc<dyn EscrowLedger> = Arc::new(
            RetryingEscrowLedger::new(responder_escrow.clone(), config.retry.clone()),
        );
        let journal = match &config.state_dir {
            Some(dir) => Some(Arc::new(JsonFileJournal::new(dir)?) as Arc<dyn SwapJournal>),
            None => None,
        };

        let ctx = ResponderContext {
            utxo: responder_ledger.clone(),
            escrow: responder_escrow_ledger.clone(),
            pricing: Arc::new(FixedRatePricing::new(
                config.pricing.clone(),
                responder_ledger,
                responder_escrow_ledger,
            )),
            anti_spam: Arc::new(AntiSpamLedger::new(config.responder.anti_spam_ttl)),
            critical_phase: Arc::new(CriticalPhase::new()),
            config: config.responder.clone(),
            metrics: Arc::new(TracingMetrics),
            journal,
        };
        info!(
            responder_balance = responder_utxo.balance(),
            initiator_escrow_balance = initiator_escrow.balance(),
            dry_run = config.dry_run,
            "Simulation ready"
        );

        Ok(Self {
            utxo,
            escrow,
            responder_utxo,
            responder_escrow,
            initiator_utxo,
            initiator_escrow,
            service: Arc::new(ResponderService::new(ctx, clock)),
            initiator_config: config.initiator,
            retry: config.retry,
        })
    }

    /// The responder as the initiator sees it: every message goes through
    /// its JSON encoding.
    pub fn transport(&self) -> Arc<dyn SwapTransport> {
        Arc::new(JsonCodecTransport::new(self.service.clone()))
    }

    pub fn initiator(
        &self,
        approval: Arc<dyn OfferApproval>,
        shutdown: watch::Receiver<bool>,
    ) -> InitiatorFlow {
        self.initiator_with(self.initiator_escrow.clone(), approval, shutdown)
    }

    /// Like `initiator`, with a different view of the initiator's escrow
    /// account.
    pub fn initiator_with(
        &self,
        escrow: Arc<dyn EscrowLedger>,
        approval: Arc<dyn OfferApproval>,
        shutdown: watch::Receiver<bool>,
    ) -> InitiatorFlow {
        InitiatorFlow::new(
            Arc::new(RetryingUtxoLedger::new(
                self.initiator_utxo.clone(),
                self.retry.clone(),
            )),
            escrow,
            approval,
            self.initiator_config.clone(),
            shutdown,
        )
    }

    pub fn mine(&self, blocks: u64) {
        self.utxo.mine(blocks);
        self.escrow.mine(blocks);
    }

    pub fn spawn_miners(
        &self,
        block_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.utxo.clone().spawn_miner(block_interval, shutdown.clone()),
            self.escrow.clone().spawn_miner(block_interval, shutdown),
        ]
    }
}

/// An initiator escrow account that refuses to deposit, leaving the
/// responder with a funded joint output and no payment.
pub struct WithholdingEscrow {
    inner: Arc<EscrowWallet>,
}

impl WithholdingEscrow {
    pub fn new(inner: Arc<EscrowWallet>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EscrowLedger for WithholdingEscrow {
    async fn burn_anti_spam_fee(&self, id: AntiSpamId, fee: Currency) -> Result<()> {
        self.inner.burn_anti_spam_fee(id, fee).await
    }

    async fn anti_spam_confirmations(&self, id: AntiSpamId, fee: Currency) -> Result<u64> {
        self.inner.anti_spam_confirmations(id, fee).await
    }

    async fn deposit(
        &self,
        _recipient: EscrowAddress,
        _adaptor: &AdaptorPoint,
        _amount: Currency,
        id: AntiSpamId,
    ) -> Result<()> {
        bail!("withholding deposit {id}")
    }

    async fn deposit_confirmations(
        &self,
        recipient: EscrowAddress,
        adaptor: &AdaptorPoint,
        amount: Currency,
        id: AntiSpamId,
    ) -> Result<u64> {
        self.inner
            .deposit_confirmations(recipient, adaptor, amount, id)
            .await
    }

    async fn claim_deposit(&self, secret: &AdaptorSecret, id: AntiSpamId) -> Result<()> {
        self.inner.claim_deposit(secret, id).await
    }

    async fn revealed_secret(&self, adaptor: &AdaptorPoint) -> Result<Option<AdaptorSecret>> {
        self.inner.revealed_secret(adaptor).await
    }

    async fn reclaim_deposit(&self, id: AntiSpamId) -> Result<()> {
        self.inner.reclaim_deposit(id).await
    }

    fn address(&self) -> EscrowAddress {
        self.inner.address()
    }

    async fn suggested_fee(&self) -> Result<Currency> {
        self.inner.suggested_fee().await
    }
}
