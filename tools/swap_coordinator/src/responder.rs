//! Responder side of a swap: one `ResponderSwap` per counterparty session.
//!
//! Each operation checks the session state, talks to the ledgers, and only
//! then commits the transition. A failed ledger call leaves the session as it
//! was; a failed signature check aborts it.

use std::sync::Arc;
use std::time::Instant;

use adaptor_sig::{
    adaptor_sign, combine, commit_nonce, derive_joint_key, generate_adaptor, partial_sign, verify,
    AdaptorPoint, AdaptorSecret, JointKey, Keypair, NonceCommitment, Nonces, PartialSignature,
    Party, PublicKey,
};
use tracing::{debug, info, warn};

use crate::anti_spam::AntiSpamLedger;
use crate::config::ResponderConfig;
use crate::critical_phase::CriticalPhase;
use crate::db::{SessionSnapshot, SwapJournal};
use crate::error::{Result, SwapError};
use crate::ledger::{AntiSpamId, EscrowLedger, UtxoLedger};
use crate::metrics::SwapMetrics;
use crate::offer::{AdaptorDetails, Offer, RefundDetails};
use crate::pricing::{PricingPolicy, CRITICAL_PHASE_MESSAGE};
use crate::state::{SwapId, SwapState};
use crate::utxo::{
    build_funding, build_joint_spend, BlockHeight, Currency, Transaction, TransactionId,
    UnlockConditions, UnlockHash,
};

/// Everything a responder session shares with its siblings.
#[derive(Clone)]
pub struct ResponderContext {
    pub utxo: Arc<dyn UtxoLedger>,
    pub escrow: Arc<dyn EscrowLedger>,
    pub pricing: Arc<dyn PricingPolicy>,
    pub anti_spam: Arc<AntiSpamLedger>,
    pub critical_phase: Arc<CriticalPhase>,
    pub config: ResponderConfig,
    pub metrics: Arc<dyn SwapMetrics>,
    pub journal: Option<Arc<dyn SwapJournal>>,
}

struct AcceptedMaterial {
    keypair: Keypair,
    initiator_pubkey: PublicKey,
    joint: JointKey,
    joint_conditions: UnlockConditions,
    funding_tx: Transaction,
    refund_tx: Transaction,
    timelock: BlockHeight,
}

struct AdaptorMaterial {
    secret: AdaptorSecret,
    point: AdaptorPoint,
    claim_tx: Transaction,
}

pub struct ResponderSwap {
    id: SwapId,
    state: SwapState,
    deadline: i64,
    requested_amount: Currency,
    counter_amount: Currency,
    anti_spam_fee: Currency,
    anti_spam_id: Option<AntiSpamId>,
    accepted: Option<AcceptedMaterial>,
    adaptor: Option<AdaptorMaterial>,
    funding_tx_id: Option<TransactionId>,
    /// Signed refund reloaded from the journal; the keys behind it are gone.
    restored_refund: Option<Transaction>,
    ctx: ResponderContext,
}

impl ResponderSwap {
    pub fn new(ctx: ResponderContext, now: i64) -> Self {
        let id = SwapId::new();
        let deadline = now + ctx.config.session_lifetime_secs();
        debug!(swap_id = %id, deadline, "Created swap session");
        Self {
            id,
            state: SwapState::Initialized,
            deadline,
            requested_amount: 0,
            counter_amount: 0,
            anti_spam_fee: 0,
            anti_spam_id: None,
            accepted: None,
            adaptor: None,
            funding_tx_id: None,
            restored_refund: None,
            ctx,
        }
    }

    /// Rebuilds a session from its journal entry after a restart.
    ///
    /// Only the deadline path survives: a restored session can be aborted or
    /// refunded by `check`, every other operation fails. A snapshot that
    /// already carries the signed refund may have had its funding broadcast,
    /// so it comes back as `Funded`.
    pub fn restore(ctx: ResponderContext, snapshot: SessionSnapshot) -> Self {
        let state = match (snapshot.state, &snapshot.refund_tx) {
            (SwapState::OfferAccepted, Some(_)) => SwapState::Funded,
            (state, _) => state,
        };
        Self {
            id: snapshot.swap_id,
            state,
            deadline: snapshot.deadline,
            requested_amount: snapshot.requested_amount,
            counter_amount: snapshot.counter_amount,
            anti_spam_fee: snapshot.anti_spam_fee,
            anti_spam_id: snapshot.anti_spam_id,
            accepted: None,
            adaptor: None,
            funding_tx_id: snapshot.funding_tx_id,
            restored_refund: snapshot.refund_tx,
            ctx,
        }
    }

    pub fn id(&self) -> SwapId {
        self.id
    }

    pub fn state(&self) -> SwapState {
        self.state
    }

    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    pub fn anti_spam_id(&self) -> Option<AntiSpamId> {
        self.anti_spam_id
    }

    pub fn joint_pubkey(&self) -> Option<&PublicKey> {
        self.accepted.as_ref().map(|accepted| accepted.joint.aggregate())
    }

    pub fn initiator_pubkey(&self) -> Option<&PublicKey> {
        self.accepted.as_ref().map(|accepted| &accepted.initiator_pubkey)
    }

    pub fn timelock(&self) -> Option<BlockHeight> {
        self.accepted.as_ref().map(|accepted| accepted.timelock)
    }

    pub fn funding_tx(&self) -> Option<&Transaction> {
        self.accepted.as_ref().map(|accepted| &accepted.funding_tx)
    }

    pub fn refund_tx(&self) -> Option<&Transaction> {
        self.accepted
            .as_ref()
            .map(|accepted| &accepted.refund_tx)
            .or(self.restored_refund.as_ref())
    }

    pub fn claim_tx(&self) -> Option<&Transaction> {
        self.adaptor.as_ref().map(|adaptor| &adaptor.claim_tx)
    }

    pub fn adaptor_point(&self) -> Option<&AdaptorPoint> {
        self.adaptor.as_ref().map(|adaptor| &adaptor.point)
    }

    /// Past the deadline by a full session lifetime; safe to forget.
    pub fn is_collectable(&self, now: i64) -> bool {
        now > self.deadline + self.ctx.config.session_lifetime_secs()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            swap_id: self.id,
            state: self.state,
            deadline: self.deadline,
            requested_amount: self.requested_amount,
            counter_amount: self.counter_amount,
            anti_spam_fee: self.anti_spam_fee,
            anti_spam_id: self.anti_spam_id,
            funding_tx_id: self.funding_tx_id,
            refund_tx: self
                .refund_tx()
                .filter(|refund_tx| !refund_tx.signatures.is_empty())
                .cloned(),
        }
    }

    fn require(&self, expected: SwapState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SwapError::wrong_state(expected, self.state))
        }
    }

    fn accepted(&self) -> Result<&AcceptedMaterial> {
        self.accepted
            .as_ref()
            .ok_or(SwapError::wrong_state(SwapState::OfferAccepted, self.state))
    }

    fn bound_anti_spam_id(&self) -> Result<AntiSpamId> {
        self.anti_spam_id
            .ok_or(SwapError::wrong_state(SwapState::OfferedBinding, self.state))
    }

    fn save_snapshot(&self) -> anyhow::Result<()> {
        match &self.ctx.journal {
            Some(journal) => journal.save(&self.snapshot()),
            None => Ok(()),
        }
    }

    fn transition(&mut self, to: SwapState) {
        let from = self.state;
        self.state = to;
        info!(swap_id = %self.id, %from, %to, deadline = self.deadline, "Swap transition");
        self.ctx.metrics.record_transition(self.id, from, to);
        if let Err(err) = self.save_snapshot() {
            warn!(swap_id = %self.id, error = %err, "Failed to journal swap session");
        }
    }

    fn abort(&mut self) {
        self.ctx.critical_phase.release(self.id);
        self.transition(SwapState::Aborted);
    }

    pub async fn request_non_binding_offer(&mut self, amount: Currency, now: i64) -> Result<Offer> {
        self.require(SwapState::Initialized)?;

        let paused = self.ctx.critical_phase.is_active(now);
        let offer = self
            .ctx
            .pricing
            .offer(amount, self.ctx.config.miner_fee, paused)
            .await?;

        self.requested_amount = amount;
        self.anti_spam_fee = offer.anti_spam_fee;
        self.transition(SwapState::OfferedNonBinding);
        Ok(offer)
    }

    pub async fn request_binding_offer(&mut self, anti_spam_id: AntiSpamId, now: i64) -> Result<Offer> {
        self.require(SwapState::OfferedNonBinding)?;

        if self.ctx.anti_spam.contains(anti_spam_id, now) {
            return Err(SwapError::AntiSpamReused(anti_spam_id));
        }

        let paused = self.ctx.critical_phase.is_active(now);
        let offer = self
            .ctx
            .pricing
            .offer(self.requested_amount, self.ctx.config.miner_fee, paused)
            .await?;
        if !offer.available {
            debug!(swap_id = %self.id, message = %offer.message, "Binding offer unavailable");
            return Ok(offer);
        }

        let confirmations = self
            .ctx
            .escrow
            .anti_spam_confirmations(anti_spam_id, self.anti_spam_fee)
            .await?;
        if confirmations < self.ctx.config.anti_spam_confirmations {
            debug!(swap_id = %self.id, anti_spam_id, confirmations, "Anti-spam payment not confirmed");
            return Err(SwapError::AntiSpamNotDetected(anti_spam_id));
        }

        let deadline = now + self.ctx.config.binding_offer_lifetime_secs();
        if !self.ctx.critical_phase.try_enter(self.id, deadline, now) {
            return Ok(Offer::unavailable(CRITICAL_PHASE_MESSAGE));
        }
        if !self.ctx.anti_spam.try_claim(anti_spam_id, now) {
            self.ctx.critical_phase.release(self.id);
            return Err(SwapError::AntiSpamReused(anti_spam_id));
        }

        self.counter_amount = offer.counter_amount;
        self.anti_spam_id = Some(anti_spam_id);
        self.deadline = deadline;
        self.transition(SwapState::OfferedBinding);
        Ok(offer)
    }

    pub async fn accept_offer(&mut self, initiator_pubkey: PublicKey, now: i64) -> Result<RefundDetails> {
        self.require(SwapState::OfferedBinding)?;
        if now > self.deadline {
            return Err(SwapError::OfferExpired);
        }

        let started = Instant::now();
        let keypair = Keypair::generate();
        let joint = derive_joint_key(&initiator_pubkey, keypair.public())?;
        let joint_conditions = UnlockConditions::single(*joint.aggregate());
        let miner_fee = self.ctx.config.miner_fee;

        let usable = self.ctx.utxo.spendable_outputs().await?;
        let change = self.ctx.utxo.next_address().await?;
        let refund_destination = self.ctx.utxo.next_address().await?;
        let funding_value = self
            .requested_amount
            .checked_add(miner_fee)
            .ok_or(SwapError::InsufficientFunds {
                required: Currency::MAX,
                available: 0,
            })?;
        let funding_tx = build_funding(
            &usable,
            change,
            joint_conditions.unlock_hash(),
            funding_value,
            miner_fee,
        )?;

        let height = self.ctx.utxo.height().await?;
        let timelock = height + self.ctx.config.timelock_offset;
        let funding_output = funding_tx.output_id(0);
        let refund_tx = build_joint_spend(
            funding_output,
            &joint_conditions,
            refund_destination,
            self.requested_amount,
            miner_fee,
            timelock,
        );
        let responder_nonce = commit_nonce(&keypair, &joint, &refund_tx.sig_hash());

        let details = RefundDetails {
            responder_pubkey: *keypair.public(),
            funding_output,
            refund_destination,
            timelock,
            responder_nonce,
            miner_fee,
        };
        debug!(
            swap_id = %self.id,
            joint_pubkey = %joint.aggregate(),
            height,
            timelock,
            "Prepared funding and refund transactions"
        );

        self.deadline = now + self.ctx.config.session_lifetime_secs();
        self.accepted = Some(AcceptedMaterial {
            keypair,
            initiator_pubkey,
            joint,
            joint_conditions,
            funding_tx,
            refund_tx,
            timelock,
        });
        self.ctx.metrics.record_latency("accept_offer", started.elapsed());
        self.transition(SwapState::OfferAccepted);
        Ok(details)
    }

    pub async fn enable_funding(
        &mut self,
        initiator_nonce: NonceCommitment,
        initiator_partial: PartialSignature,
    ) -> Result<TransactionId> {
        self.require(SwapState::OfferAccepted)?;

        let started = Instant::now();
        let accepted = self.accepted()?;
        let digest = accepted.refund_tx.sig_hash();
        let nonces = Nonces {
            initiator: initiator_nonce,
            responder: commit_nonce(&accepted.keypair, &accepted.joint, &digest),
        };
        let own = partial_sign(
            &accepted.keypair,
            &accepted.joint,
            Party::Responder,
            &nonces,
            &digest,
        )?;
        let signature = combine(&nonces, [&initiator_partial, &own]);
        if !verify(accepted.joint.aggregate(), &digest, &signature) {
            warn!(swap_id = %self.id, "Refund signature does not verify; aborting");
            self.abort();
            return Err(SwapError::InvalidRefundSig);
        }

        let funding_output = accepted.refund_tx.inputs[0].parent_id;
        let aggregate = *accepted.joint.aggregate();
        let unsigned_funding = accepted.funding_tx.clone();
        if let Some(accepted) = self.accepted.as_mut() {
            accepted
                .refund_tx
                .attach_signature(funding_output, aggregate, signature);
        }
        // The signed refund must be durable before any value moves.
        self.save_snapshot().map_err(SwapError::Journal)?;
        debug!(swap_id = %self.id, "Signed refund journaled");

        let signed = self.ctx.utxo.sign(unsigned_funding).await?;
        let funding_tx_id = self.ctx.utxo.broadcast(&signed).await?;
        if let Some(accepted) = self.accepted.as_mut() {
            accepted.funding_tx = signed;
        }
        self.funding_tx_id = Some(funding_tx_id);
        self.ctx.critical_phase.release(self.id);
        self.ctx.metrics.record_latency("enable_funding", started.elapsed());
        info!(swap_id = %self.id, %funding_tx_id, "Funding transaction broadcast");
        self.transition(SwapState::Funded);
        Ok(funding_tx_id)
    }

    pub async fn request_adaptor_details(
        &mut self,
        claim_destination: UnlockHash,
        initiator_claim_nonce: NonceCommitment,
    ) -> Result<AdaptorDetails> {
        self.require(SwapState::Funded)?;

        let accepted = self.accepted()?;
        let claim_tx = build_joint_spend(
            accepted.refund_tx.inputs[0].parent_id,
            &accepted.joint_conditions,
            claim_destination,
            self.requested_amount,
            self.ctx.config.miner_fee,
            0,
        );
        let digest = claim_tx.sig_hash();
        let (secret, point) = generate_adaptor();
        let nonces = Nonces {
            initiator: initiator_claim_nonce,
            responder: commit_nonce(&accepted.keypair, &accepted.joint, &digest),
        };
        let adaptor_signature = adaptor_sign(
            &accepted.keypair,
            &accepted.joint,
            Party::Responder,
            &nonces,
            &point,
            &digest,
        )?;

        let details = AdaptorDetails {
            responder_claim_nonce: nonces.responder,
            adaptor_point: point,
            adaptor_signature,
            deposit_recipient: self.ctx.escrow.address(),
        };
        self.adaptor = Some(AdaptorMaterial {
            secret,
            point,
            claim_tx,
        });
        self.transition(SwapState::AdaptorProvided);
        Ok(details)
    }

    pub async fn announce_deposit(&mut self, now: i64) -> Result<()> {
        self.require(SwapState::AdaptorProvided)?;
        if now > self.deadline {
            return Err(SwapError::OfferExpired);
        }

        let started = Instant::now();
        let anti_spam_id = self.bound_anti_spam_id()?;
        let adaptor = self
            .adaptor
            .as_ref()
            .ok_or(SwapError::wrong_state(SwapState::AdaptorProvided, self.state))?;
        let confirmations = self
            .ctx
            .escrow
            .deposit_confirmations(
                self.ctx.escrow.address(),
                &adaptor.point,
                self.counter_amount,
                anti_spam_id,
            )
            .await?;
        if confirmations < self.ctx.config.deposit_confirmations {
            debug!(swap_id = %self.id, confirmations, "Escrow deposit not confirmed");
            return Err(SwapError::InvalidDeposit);
        }

        self.ctx
            .escrow
            .claim_deposit(&adaptor.secret, anti_spam_id)
            .await?;
        self.ctx.metrics.record_latency("claim_deposit", started.elapsed());
        info!(swap_id = %self.id, anti_spam_id, "Claimed escrow deposit");
        self.transition(SwapState::Completed);
        Ok(())
    }

    /// Deadline handling. Returns the refund transaction id when one was
    /// broadcast.
    pub async fn check(&mut self, now: i64) -> Result<Option<TransactionId>> {
        if now <= self.deadline || self.state.is_terminal() {
            return Ok(None);
        }

        if self.state.is_pre_funding() {
            info!(swap_id = %self.id, state = %self.state, "Deadline passed before funding");
            self.abort();
            return Ok(None);
        }

        let started = Instant::now();
        let refund_tx = self
            .refund_tx()
            .ok_or(SwapError::wrong_state(SwapState::Funded, self.state))?;
        let refund_tx_id = self.ctx.utxo.broadcast(refund_tx).await?;
        self.ctx.metrics.record_latency("refund", started.elapsed());
        warn!(swap_id = %self.id, %refund_tx_id, "Deadline passed after funding; refund broadcast");
        self.transition(SwapState::Refunded);
        Ok(Some(refund_tx_id))
    }
}
