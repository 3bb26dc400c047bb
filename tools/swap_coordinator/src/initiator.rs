//! Initiator side of a swap.
//!
//! `InitiatorFlow` drives one swap against a responder, checking every piece
//! of responder material before any value moves: the refund timelock before
//! co-signing, the adaptor signature before depositing, and the completed
//! claim signature before broadcasting.

use std::sync::Arc;

use adaptor_sig::{
    adaptor_sign, commit_nonce, complete_adaptor, derive_joint_key, partial_sign, verify,
    verify_adaptor, Keypair, Nonces, Party,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::InitiatorConfig;
use crate::error::{Result, SwapError};
use crate::ledger::{AntiSpamId, EscrowLedger, UtxoLedger};
use crate::offer::Offer;
use crate::state::SwapId;
use crate::transport::{
    AcceptOfferRequest, AdaptorDetailsRequest, AnnounceDepositRequest, BindingOfferRequest,
    EnableFundingRequest, NonBindingOfferRequest, SwapTransport,
};
use crate::utxo::{build_joint_spend, Currency, TransactionId, UnlockConditions};
use crate::watcher::ConfirmationPoller;

/// Decides whether the user accepts an offer.
#[async_trait]
pub trait OfferApproval: Send + Sync {
    async fn approve(&self, amount: Currency, offer: &Offer) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl OfferApproval for AutoApprove {
    async fn approve(&self, _amount: Currency, offer: &Offer) -> bool {
        offer.available
    }
}

/// Approves offers whose total cost stays within a budget.
#[derive(Debug, Clone, Copy)]
pub struct LimitApproval {
    pub max_total_cost: Currency,
}

#[async_trait]
impl OfferApproval for LimitApproval {
    async fn approve(&self, amount: Currency, offer: &Offer) -> bool {
        let approved = offer.available && offer.total_cost() <= self.max_total_cost;
        debug!(amount, cost = offer.total_cost(), approved, "Offer approval");
        approved
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedSwap {
    pub swap_id: SwapId,
    pub anti_spam_id: AntiSpamId,
    pub counter_amount: Currency,
    pub funding_tx_id: TransactionId,
    pub claim_tx_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SwapOutcome {
    Completed(CompletedSwap),
    Declined { reason: String },
}

/// The cheapest acceptable offer and the responder that made it.
pub struct SelectedOffer {
    pub server: Arc<dyn SwapTransport>,
    pub swap_id: SwapId,
    pub offer: Offer,
}

pub struct InitiatorFlow {
    utxo: Arc<dyn UtxoLedger>,
    escrow: Arc<dyn EscrowLedger>,
    approval: Arc<dyn OfferApproval>,
    config: InitiatorConfig,
    poller: ConfirmationPoller,
}

impl InitiatorFlow {
    pub fn new(
        utxo: Arc<dyn UtxoLedger>,
        escrow: Arc<dyn EscrowLedger>,
        approval: Arc<dyn OfferApproval>,
        config: InitiatorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let poller = ConfirmationPoller::new(config.poll_interval, shutdown);
        Self {
            utxo,
            escrow,
            approval,
            config,
            poller,
        }
    }

    /// Asks every responder for a non-binding offer and keeps the cheapest.
    pub async fn best_offer(
        &self,
        amount: Currency,
        servers: &[Arc<dyn SwapTransport>],
    ) -> Result<SelectedOffer> {
        if servers.is_empty() {
            return Err(SwapError::NoServers);
        }

        let mut best: Option<SelectedOffer> = None;
        for (index, server) in servers.iter().enumerate() {
            let response = match server
                .request_non_binding_offer(NonBindingOfferRequest { amount })
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(server = index, error = %err, "Skipping server");
                    continue;
                }
            };
            let offer = response.offer;
            if !offer.available {
                debug!(server = index, message = %offer.message, "Server declined");
                continue;
            }
            if offer.anti_spam_fee > self.config.max_anti_spam_fee {
                warn!(server = index, fee = offer.anti_spam_fee, "Anti-spam fee too high");
                continue;
            }
            if best
                .as_ref()
                .map_or(true, |current| offer.total_cost() < current.offer.total_cost())
            {
                best = Some(SelectedOffer {
                    server: server.clone(),
                    swap_id: response.id,
                    offer,
                });
            }
        }
        best.ok_or(SwapError::NoOffers)
    }

    pub async fn perform_swap(
        &self,
        amount: Currency,
        servers: &[Arc<dyn SwapTransport>],
    ) -> Result<SwapOutcome> {
        let selected = self.best_offer(amount, servers).await?;
        info!(
            swap_id = %selected.swap_id,
            counter_amount = selected.offer.counter_amount,
            anti_spam_fee = selected.offer.anti_spam_fee,
            "Selected offer"
        );
        if !self.approval.approve(amount, &selected.offer).await {
            return Ok(SwapOutcome::Declined {
                reason: "non-binding offer declined".to_string(),
            });
        }
        self.run(selected.server.as_ref(), selected.swap_id, amount, &selected.offer)
            .await
    }

    /// Runs the swap from the anti-spam payment onwards against a responder
    /// that already made the approved non-binding `offer`.
    pub async fn run(
        &self,
        server: &dyn SwapTransport,
        swap_id: SwapId,
        amount: Currency,
        offer: &Offer,
    ) -> Result<SwapOutcome> {
        let anti_spam_id = OsRng.next_u64();
        self.escrow
            .burn_anti_spam_fee(anti_spam_id, offer.anti_spam_fee)
            .await?;
        info!(%swap_id, anti_spam_id, fee = offer.anti_spam_fee, "Burned anti-spam fee");
        self.poller
            .wait_for("anti-spam", self.config.anti_spam_confirmations, || {
                self.escrow
                    .anti_spam_confirmations(anti_spam_id, offer.anti_spam_fee)
            })
            .await?;

        let binding = server
            .request_binding_offer(BindingOfferRequest {
                id: swap_id,
                anti_spam_id,
            })
            .await?
            .offer;
        if !binding.available {
            return Ok(SwapOutcome::Declined {
                reason: binding.message,
            });
        }
        if !offer.is_similar(&binding, self.config.similarity_percent)
            && !self.approval.approve(amount, &binding).await
        {
            return Ok(SwapOutcome::Declined {
                reason: "binding offer declined".to_string(),
            });
        }

        let keypair = Keypair::generate();
        let refund_details = server
            .accept_offer(AcceptOfferRequest {
                id: swap_id,
                initiator_pubkey: *keypair.public(),
            })
            .await?
            .refund_details;
        let height = self.utxo.height().await?;
        let minimum = height + self.config.min_timelock_offset;
        if refund_details.timelock < minimum {
            warn!(%swap_id, timelock = refund_details.timelock, minimum, "Refund timelock too short");
            return Err(SwapError::TimelockTooShort {
                timelock: refund_details.timelock,
                minimum,
            });
        }
        if refund_details.miner_fee < self.config.miner_fee {
            warn!(
                %swap_id,
                fee = refund_details.miner_fee,
                minimum = self.config.miner_fee,
                "Responder miner fee too low"
            );
            return Err(SwapError::MinerFeeTooLow {
                fee: refund_details.miner_fee,
                minimum: self.config.miner_fee,
            });
        }

        let joint = derive_joint_key(keypair.public(), &refund_details.responder_pubkey)?;
        let joint_conditions = UnlockConditions::single(*joint.aggregate());
        let miner_fee = refund_details.miner_fee;
        let refund_tx = build_joint_spend(
            refund_details.funding_output,
            &joint_conditions,
            refund_details.refund_destination,
            amount,
            miner_fee,
            refund_details.timelock,
        );
        let refund_digest = refund_tx.sig_hash();
        let refund_nonces = Nonces {
            initiator: commit_nonce(&keypair, &joint, &refund_digest),
            responder: refund_details.responder_nonce,
        };
        let refund_partial = partial_sign(
            &keypair,
            &joint,
            Party::Initiator,
            &refund_nonces,
            &refund_digest,
        )?;
        let funding_tx_id = server
            .enable_funding(EnableFundingRequest {
                id: swap_id,
                initiator_nonce: refund_nonces.initiator,
                initiator_partial_sig: refund_partial,
            })
            .await?
            .funding_tx_id;
        info!(%swap_id, %funding_tx_id, joint_pubkey = %joint.aggregate(), "Responder funded the joint output");

        let joint_address = joint_conditions.unlock_hash();
        let funding_value = amount.saturating_add(miner_fee);
        self.poller
            .wait_for("funding", self.config.funding_confirmations, || {
                self.utxo.confirmations(&joint_address, funding_value)
            })
            .await?;

        let claim_destination = self.utxo.next_address().await?;
        let mut claim_tx = build_joint_spend(
            refund_details.funding_output,
            &joint_conditions,
            claim_destination,
            amount,
            miner_fee,
            0,
        );
        let claim_digest = claim_tx.sig_hash();
        let initiator_claim_nonce = commit_nonce(&keypair, &joint, &claim_digest);
        let adaptor_details = server
            .request_adaptor_details(AdaptorDetailsRequest {
                id: swap_id,
                claim_destination,
                initiator_claim_nonce,
            })
            .await?
            .adaptor_details;
        let claim_nonces = Nonces {
            initiator: initiator_claim_nonce,
            responder: adaptor_details.responder_claim_nonce,
        };
        if !verify_adaptor(
            &joint,
            Party::Responder,
            &claim_nonces,
            &adaptor_details.adaptor_point,
            &claim_digest,
            &adaptor_details.adaptor_signature,
        ) {
            warn!(%swap_id, "Responder adaptor signature does not verify");
            return Err(SwapError::InvalidAdaptorSig);
        }

        let adaptor_point = adaptor_details.adaptor_point;
        let counter_amount = binding.counter_amount;
        self.escrow
            .deposit(
                adaptor_details.deposit_recipient,
                &adaptor_point,
                counter_amount,
                anti_spam_id,
            )
            .await?;
        info!(%swap_id, counter_amount, adaptor = %adaptor_point, anti_spam_id, "Deposited into escrow");

        let settled = async {
            self.poller
                .wait_for("deposit", self.config.deposit_confirmations, || {
                    self.escrow.deposit_confirmations(
                        adaptor_details.deposit_recipient,
                        &adaptor_point,
                        counter_amount,
                        anti_spam_id,
                    )
                })
                .await?;
            info!(%swap_id, anti_spam_id, "Deposit confirmed; reclaim it with this anti-spam id if the swap stalls");

            server
                .announce_deposit(AnnounceDepositRequest { id: swap_id })
                .await?;

            let secret = self
                .poller
                .wait_for_value("adaptor secret", || self.escrow.revealed_secret(&adaptor_point))
                .await?;
            debug!(%swap_id, matches = secret.matches(&adaptor_point), "Adaptor secret revealed");

            let own_share = adaptor_sign(
                &keypair,
                &joint,
                Party::Initiator,
                &claim_nonces,
                &adaptor_point,
                &claim_digest,
            )?;
            let claim_signature = complete_adaptor(
                &claim_nonces,
                [&own_share, &adaptor_details.adaptor_signature],
                &secret,
            );
            if !verify(joint.aggregate(), &claim_digest, &claim_signature) {
                warn!(%swap_id, "Completed claim signature does not verify");
                return Err(SwapError::InvalidClaimSig);
            }

            claim_tx.attach_signature(
                refund_details.funding_output,
                *joint.aggregate(),
                claim_signature,
            );
            let claim_tx_id = self.utxo.broadcast(&claim_tx).await?;
            Ok::<_, SwapError>(claim_tx_id)
        }
        .await;
        let claim_tx_id = settled.map_err(|source| {
            warn!(%swap_id, anti_spam_id, error = %source, "Swap failed after escrow deposit");
            SwapError::AfterDeposit {
                anti_spam_id,
                source: Box::new(source),
            }
        })?;
        info!(%swap_id, %claim_tx_id, "Claim transaction broadcast");

        Ok(SwapOutcome::Completed(CompletedSwap {
            swap_id,
            anti_spam_id,
            counter_amount,
            funding_tx_id,
            claim_tx_id,
        }))
    }

    /// Takes back an escrow deposit the responder never claimed.
    pub async fn reclaim_deposit(&self, anti_spam_id: AntiSpamId) -> Result<()> {
        self.escrow.reclaim_deposit(anti_spam_id).await?;
        info!(anti_spam_id, "Reclaimed escrow deposit");
        Ok(())
    }
}
