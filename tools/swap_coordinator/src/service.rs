//! Responder process: the arena of live sessions and the background tasks
//! that keep it tidy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SwapError};
use crate::responder::{ResponderContext, ResponderSwap};
use crate::state::{SwapId, SwapState};
use crate::transport::{
    AcceptOfferRequest, AcceptOfferResponse, AdaptorDetailsRequest, AdaptorDetailsResponse,
    AnnounceDepositRequest, AnnounceDepositResponse, BindingOfferRequest, BindingOfferResponse,
    EnableFundingRequest, EnableFundingResponse, NonBindingOfferRequest, NonBindingOfferResponse,
    SwapTransport,
};
use crate::utxo::TransactionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SwapId,
    pub state: SwapState,
    pub deadline: i64,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub refunded: Vec<(SwapId, TransactionId)>,
    pub aborted: Vec<SwapId>,
    pub collected: Vec<SwapId>,
    pub failed: Vec<(SwapId, SwapError)>,
}

pub struct ResponderService {
    ctx: ResponderContext,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<SwapId, Arc<Mutex<ResponderSwap>>>>,
}

impl ResponderService {
    pub fn new(ctx: ResponderContext, clock: Arc<dyn Clock>) -> Self {
        Self {
            ctx,
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ResponderContext {
        &self.ctx
    }

    async fn session(&self, id: &SwapId) -> Result<Arc<Mutex<ResponderSwap>>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SwapError::UnknownSession(id.to_string()))
    }

    pub async fn state_of(&self, id: &SwapId) -> Result<SwapState> {
        Ok(self.session(id).await?.lock().await.state())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn report(&self) -> Vec<SessionSummary> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let swap = session.lock().await;
            summaries.push(SessionSummary {
                id: swap.id(),
                state: swap.state(),
                deadline: swap.deadline(),
            });
        }
        summaries.sort_by_key(|summary| summary.deadline);
        summaries
    }

    /// Runs `check` on every session and forgets the collectable ones.
    pub async fn check_all(&self, now: i64) -> CheckReport {
        let sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (*id, session.clone()))
            .collect();

        let mut report = CheckReport::default();
        for (id, session) in sessions {
            let mut swap = session.lock().await;
            let before = swap.state();
            match swap.check(now).await {
                Ok(Some(refund_tx_id)) => report.refunded.push((id, refund_tx_id)),
                Ok(None) if before != swap.state() => report.aborted.push(id),
                Ok(None) => {}
                Err(err) => {
                    warn!(swap_id = %id, error = %err, "Deadline check failed");
                    report.failed.push((id, err));
                }
            }
            if swap.is_collectable(now) {
                report.collected.push(id);
            }
        }

        if !report.collected.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &report.collected {
                sessions.remove(id);
            }
            debug!(collected = report.collected.len(), remaining = sessions.len(), "Collected sessions");
        }
        report
    }

    /// Reloads unfinished sessions from the journal after a restart, then
    /// runs one deadline check so overdue refunds go out immediately.
    pub async fn recover(&self) -> Result<CheckReport> {
        let Some(journal) = &self.ctx.journal else {
            return Ok(CheckReport::default());
        };
        let now = self.clock.now();
        let snapshots = journal.list().map_err(SwapError::Journal)?;
        let mut restored = 0;
        {
            let mut sessions = self.sessions.write().await;
            for snapshot in snapshots {
                if snapshot.state.is_terminal() || sessions.contains_key(&snapshot.swap_id) {
                    continue;
                }
                if let Some(anti_spam_id) = snapshot.anti_spam_id {
                    self.ctx.anti_spam.add(anti_spam_id, now);
                }
                let swap = ResponderSwap::restore(self.ctx.clone(), snapshot);
                info!(
                    swap_id = %swap.id(),
                    state = %swap.state(),
                    deadline = swap.deadline(),
                    "Restored swap session"
                );
                sessions.insert(swap.id(), Arc::new(Mutex::new(swap)));
                restored += 1;
            }
        }

        let report = self.check_all(now).await;
        info!(restored, refunded = report.refunded.len(), "Recovered journaled sessions");
        Ok(report)
    }

    pub fn spawn_checker(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.check_all(self.clock.now()).await;
                        if !report.refunded.is_empty() || !report.aborted.is_empty() {
                            info!(
                                refunded = report.refunded.len(),
                                aborted = report.aborted.len(),
                                "Deadline check"
                            );
                        }
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

    /// Starts the periodic deadline checker and the anti-spam sweeper.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let sweeper = self.ctx.anti_spam.clone().spawn_sweeper(
            self.clock.clone(),
            self.ctx.config.anti_spam_sweep_interval,
            shutdown.clone(),
        );
        let interval = self.ctx.config.check_interval;
        vec![sweeper, self.spawn_checker(interval, shutdown)]
    }
}

#[async_trait]
impl SwapTransport for ResponderService {
    async fn request_non_binding_offer(
        &self,
        request: NonBindingOfferRequest,
    ) -> Result<NonBindingOfferResponse> {
        let now = self.clock.now();
        let mut swap = ResponderSwap::new(self.ctx.clone(), now);
        let offer = swap.request_non_binding_offer(request.amount, now).await?;
        let id = swap.id();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(swap)));
        Ok(NonBindingOfferResponse { id, offer })
    }

    async fn request_binding_offer(&self, request: BindingOfferRequest) -> Result<BindingOfferResponse> {
        let session = self.session(&request.id).await?;
        let mut swap = session.lock().await;
        let offer = swap
            .request_binding_offer(request.anti_spam_id, self.clock.now())
            .await?;
        Ok(BindingOfferResponse { offer })
    }

    async fn accept_offer(&self, request: AcceptOfferRequest) -> Result<AcceptOfferResponse> {
        let session = self.session(&request.id).await?;
        let mut swap = session.lock().await;
        let refund_details = swap
            .accept_offer(request.initiator_pubkey, self.clock.now())
            .await?;
        Ok(AcceptOfferResponse { refund_details })
    }

    async fn enable_funding(&self, request: EnableFundingRequest) -> Result<EnableFundingResponse> {
        let session = self.session(&request.id).await?;
        let mut swap = session.lock().await;
        let funding_tx_id = swap
            .enable_funding(request.initiator_nonce, request.initiator_partial_sig)
            .await?;
        Ok(EnableFundingResponse { funding_tx_id })
    }

    async fn request_adaptor_details(
        &self,
        request: AdaptorDetailsRequest,
    ) -> Result<AdaptorDetailsResponse> {
        let session = self.session(&request.id).await?;
        let mut swap = session.lock().await;
        let adaptor_details = swap
            .request_adaptor_details(request.claim_destination, request.initiator_claim_nonce)
            .await?;
        Ok(AdaptorDetailsResponse { adaptor_details })
    }

    async fn announce_deposit(&self, request: AnnounceDepositRequest) -> Result<AnnounceDepositResponse> {
        let session = self.session(&request.id).await?;
        let mut swap = session.lock().await;
        swap.announce_deposit(self.clock.now()).await?;
        Ok(AnnounceDepositResponse {})
    }
}
