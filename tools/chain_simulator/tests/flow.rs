use std::sync::Arc;
use std::time::Duration;

use adaptor_sig::generate_adaptor;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use chain_simulator::{Simulation, SimulationConfig, WithholdingEscrow};
use swap_coordinator::clock::{Clock, ManualClock};
use swap_coordinator::config::{PricingConfig, ResponderConfig, BASE_UNIT};
use swap_coordinator::initiator::AutoApprove;
use swap_coordinator::ledger::EscrowLedger;
use swap_coordinator::transport::{
    AcceptOfferRequest, AcceptOfferResponse, AdaptorDetailsRequest, AdaptorDetailsResponse,
    AnnounceDepositRequest, AnnounceDepositResponse, BindingOfferRequest, BindingOfferResponse,
    EnableFundingRequest, EnableFundingResponse, NonBindingOfferRequest, NonBindingOfferResponse,
    SwapTransport,
};
use swap_coordinator::{Result, SwapError, SwapOutcome, SwapState};

const NOW: i64 = 1_700_000_000;
const AMOUNT: u128 = 500 * BASE_UNIT;

struct Harness {
    sim: Simulation,
    clock: Arc<ManualClock>,
    shutdown: watch::Sender<bool>,
    miners: Vec<JoinHandle<()>>,
}

impl Harness {
    fn new(config: SimulationConfig) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let sim = Simulation::new(config, clock.clone()).expect("simulation");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let miners = sim.spawn_miners(Duration::from_secs(1), shutdown_rx);
        Self {
            sim,
            clock,
            shutdown,
            miners,
        }
    }

    async fn stop_miners(&mut self) {
        self.shutdown.send_replace(true);
        for miner in self.miners.drain(..) {
            miner.await.expect("miner task");
        }
    }

    fn lifetime(&self) -> i64 {
        ResponderConfig::default().session_lifetime_secs()
    }
}

fn miner_fee() -> u128 {
    ResponderConfig::default().miner_fee
}

fn anti_spam_fee() -> u128 {
    PricingConfig::default().anti_spam_fee
}

#[tokio::test(start_paused = true)]
async fn swap_completes_and_settles_both_chains() {
    let mut h = Harness::new(SimulationConfig::default());
    let config = SimulationConfig::default();
    let flow = h.sim.initiator(Arc::new(AutoApprove), h.shutdown.subscribe());

    let outcome = flow
        .perform_swap(AMOUNT, &[h.sim.transport()])
        .await
        .expect("swap");
    let completed = match outcome {
        SwapOutcome::Completed(completed) => completed,
        other => panic!("swap not completed: {other:?}"),
    };
    h.stop_miners().await;
    h.sim.utxo.mine(1);

    assert!(h.sim.utxo.is_included(&completed.funding_tx_id));
    assert!(h.sim.utxo.is_included(&completed.claim_tx_id));
    assert_eq!(
        h.sim.service.state_of(&completed.swap_id).await.expect("session"),
        SwapState::Completed
    );

    assert_eq!(h.sim.initiator_utxo.balance(), AMOUNT);
    assert_eq!(
        h.sim.responder_utxo.balance(),
        config.responder_balance - AMOUNT - 2 * miner_fee()
    );
    assert_eq!(h.sim.responder_escrow.balance(), completed.counter_amount);
    assert_eq!(
        h.sim.initiator_escrow.balance(),
        config.initiator_escrow_balance - anti_spam_fee() - completed.counter_amount
    );
    assert!(h.sim.initiator_escrow.reclaim_deposit(completed.anti_spam_id).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn responder_refunds_when_initiator_stalls() {
    let mut h = Harness::new(SimulationConfig::default());
    let config = SimulationConfig::default();
    let withholding = Arc::new(WithholdingEscrow::new(h.sim.initiator_escrow.clone()));
    let flow = h
        .sim
        .initiator_with(withholding, Arc::new(AutoApprove), h.shutdown.subscribe());

    let err = flow
        .perform_swap(AMOUNT, &[h.sim.transport()])
        .await
        .expect_err("initiator withholds the deposit");
    assert!(matches!(err, SwapError::Ledger(_)));
    h.stop_miners().await;

    let sessions = h.sim.service.report().await;
    assert_eq!(sessions.len(), 1);
    let swap_id = sessions[0].id;
    assert_eq!(sessions[0].state, SwapState::AdaptorProvided);

    let now = h.clock.advance(h.lifetime() + 1);
    let report = h.sim.service.check_all(now).await;
    assert!(report.refunded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        h.sim.service.state_of(&swap_id).await.expect("session"),
        SwapState::AdaptorProvided
    );

    h.sim.utxo.mine(ResponderConfig::default().timelock_offset);
    let report = h.sim.service.check_all(h.clock.now()).await;
    assert_eq!(report.refunded.len(), 1);
    let (refunded_id, refund_tx_id) = report.refunded[0];
    assert_eq!(refunded_id, swap_id);
    assert_eq!(
        h.sim.service.state_of(&swap_id).await.expect("session"),
        SwapState::Refunded
    );

    h.sim.utxo.mine(1);
    assert!(h.sim.utxo.is_included(&refund_tx_id));
    assert_eq!(
        h.sim.responder_utxo.balance(),
        config.responder_balance - 2 * miner_fee()
    );
    assert_eq!(h.sim.initiator_utxo.balance(), 0);
    assert_eq!(
        h.sim.initiator_escrow.balance(),
        config.initiator_escrow_balance - anti_spam_fee()
    );
}

/// Hands the initiator an adaptor point that does not match the signature.
struct SwappedAdaptorPoint {
    inner: Arc<dyn SwapTransport>,
}

#[async_trait]
impl SwapTransport for SwappedAdaptorPoint {
    async fn request_non_binding_offer(
        &self,
        request: NonBindingOfferRequest,
    ) -> Result<NonBindingOfferResponse> {
        self.inner.request_non_binding_offer(request).await
    }

    async fn request_binding_offer(&self, request: BindingOfferRequest) -> Result<BindingOfferResponse> {
        self.inner.request_binding_offer(request).await
    }

    async fn accept_offer(&self, request: AcceptOfferRequest) -> Result<AcceptOfferResponse> {
        self.inner.accept_offer(request).await
    }

    async fn enable_funding(&self, request: EnableFundingRequest) -> Result<EnableFundingResponse> {
        self.inner.enable_funding(request).await
    }

    async fn request_adaptor_details(
        &self,
        request: AdaptorDetailsRequest,
    ) -> Result<AdaptorDetailsResponse> {
        let mut response = self.inner.request_adaptor_details(request).await?;
        response.adaptor_details.adaptor_point = generate_adaptor().1;
        Ok(response)
    }

    async fn announce_deposit(&self, request: AnnounceDepositRequest) -> Result<AnnounceDepositResponse> {
        self.inner.announce_deposit(request).await
    }
}

#[tokio::test(start_paused = true)]
async fn mismatched_adaptor_signature_stops_before_deposit() {
    let mut h = Harness::new(SimulationConfig::default());
    let config = SimulationConfig::default();
    let server: Arc<dyn SwapTransport> = Arc::new(SwappedAdaptorPoint {
        inner: h.sim.transport(),
    });
    let flow = h.sim.initiator(Arc::new(AutoApprove), h.shutdown.subscribe());

    let err = flow
        .perform_swap(AMOUNT, &[server])
        .await
        .expect_err("adaptor signature must not verify");
    assert!(matches!(err, SwapError::InvalidAdaptorSig));
    h.stop_miners().await;

    assert_eq!(
        h.sim.initiator_escrow.balance(),
        config.initiator_escrow_balance - anti_spam_fee()
    );
    assert_eq!(h.sim.responder_escrow.balance(), 0);
}

#[tokio::test(start_paused = true)]
async fn burned_anti_spam_id_opens_only_one_binding_offer() {
    let mut h = Harness::new(SimulationConfig::default());
    h.stop_miners().await;
    let service = h.sim.service.clone();

    let mut sessions = Vec::new();
    for _ in 0..2 {
        let response = service
            .request_non_binding_offer(NonBindingOfferRequest { amount: AMOUNT })
            .await
            .expect("offer");
        assert!(response.offer.available);
        sessions.push(response.id);
    }

    h.sim
        .initiator_escrow
        .burn_anti_spam_fee(42, anti_spam_fee())
        .await
        .expect("burn");
    let early = service
        .request_binding_offer(BindingOfferRequest {
            id: sessions[0],
            anti_spam_id: 42,
        })
        .await;
    assert!(matches!(early, Err(SwapError::AntiSpamNotDetected(42))));

    h.sim.escrow.mine(ResponderConfig::default().anti_spam_confirmations);
    let binding = service
        .request_binding_offer(BindingOfferRequest {
            id: sessions[0],
            anti_spam_id: 42,
        })
        .await
        .expect("binding offer");
    assert!(binding.offer.available);

    let reused = service
        .request_binding_offer(BindingOfferRequest {
            id: sessions[1],
            anti_spam_id: 42,
        })
        .await;
    assert!(matches!(reused, Err(SwapError::AntiSpamReused(42))));
}

#[tokio::test(start_paused = true)]
async fn short_timelock_is_refused_and_session_aborts() {
    let mut config = SimulationConfig::default();
    config.responder.timelock_offset = config.initiator.min_timelock_offset - 1;
    let mut h = Harness::new(config.clone());
    let flow = h.sim.initiator(Arc::new(AutoApprove), h.shutdown.subscribe());

    let err = flow
        .perform_swap(AMOUNT, &[h.sim.transport()])
        .await
        .expect_err("timelock too short");
    assert!(matches!(err, SwapError::TimelockTooShort { .. }));
    h.stop_miners().await;
    assert_eq!(h.sim.responder_utxo.balance(), config.responder_balance);

    let sessions = h.sim.service.report().await;
    assert_eq!(sessions[0].state, SwapState::OfferAccepted);
    let now = h.clock.advance(h.lifetime() + 1);
    let report = h.sim.service.check_all(now).await;
    assert_eq!(report.aborted, vec![sessions[0].id]);
    assert!(report.refunded.is_empty());
}
