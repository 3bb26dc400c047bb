//! The six protocol messages and the channel that carries them.

use std::sync::Arc;

use adaptor_sig::{NonceCommitment, PartialSignature, PublicKey};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::AntiSpamId;
use crate::offer::{AdaptorDetails, Offer, RefundDetails};
use crate::state::SwapId;
use crate::utxo::{Currency, TransactionId, UnlockHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonBindingOfferRequest {
    pub amount: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonBindingOfferResponse {
    pub id: SwapId,
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOfferRequest {
    pub id: SwapId,
    pub anti_spam_id: AntiSpamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOfferResponse {
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOfferRequest {
    pub id: SwapId,
    pub initiator_pubkey: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOfferResponse {
    pub refund_details: RefundDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableFundingRequest {
    pub id: SwapId,
    pub initiator_nonce: NonceCommitment,
    pub initiator_partial_sig: PartialSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableFundingResponse {
    pub funding_tx_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorDetailsRequest {
    pub id: SwapId,
    pub claim_destination: UnlockHash,
    pub initiator_claim_nonce: NonceCommitment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorDetailsResponse {
    pub adaptor_details: AdaptorDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceDepositRequest {
    pub id: SwapId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceDepositResponse {}

/// Request/response channel to one responder. Every message naming an
/// unknown session fails with `UnknownSession`.
#[async_trait]
pub trait SwapTransport: Send + Sync {
    async fn request_non_binding_offer(
        &self,
        request: NonBindingOfferRequest,
    ) -> Result<NonBindingOfferResponse>;
    async fn request_binding_offer(&self, request: BindingOfferRequest) -> Result<BindingOfferResponse>;
    async fn accept_offer(&self, request: AcceptOfferRequest) -> Result<AcceptOfferResponse>;
    async fn enable_funding(&self, request: EnableFundingRequest) -> Result<EnableFundingResponse>;
    async fn request_adaptor_details(
        &self,
        request: AdaptorDetailsRequest,
    ) -> Result<AdaptorDetailsResponse>;
    async fn announce_deposit(&self, request: AnnounceDepositRequest) -> Result<AnnounceDepositResponse>;
}

/// Sends every request and response through its JSON wire form.
pub struct JsonCodecTransport<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ?Sized> JsonCodecTransport<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

fn through_wire<M: Serialize + DeserializeOwned>(message: &M) -> Result<M> {
    let encoded = serde_json::to_vec(message)?;
    Ok(serde_json::from_slice(&encoded)?)
}

#[async_trait]
impl<T: SwapTransport + ?Sized> SwapTransport for JsonCodecTransport<T> {
    async fn request_non_binding_offer(
        &self,
        request: NonBindingOfferRequest,
    ) -> Result<NonBindingOfferResponse> {
        let response = self
            .inner
            .request_non_binding_offer(through_wire(&request)?)
            .await?;
        through_wire(&response)
    }

    async fn request_binding_offer(&self, request: BindingOfferRequest) -> Result<BindingOfferResponse> {
        let response = self.inner.request_binding_offer(through_wire(&request)?).await?;
        through_wire(&response)
    }

    async fn accept_offer(&self, request: AcceptOfferRequest) -> Result<AcceptOfferResponse> {
        let response = self.inner.accept_offer(through_wire(&request)?).await?;
        through_wire(&response)
    }

    async fn enable_funding(&self, request: EnableFundingRequest) -> Result<EnableFundingResponse> {
        let response = self.inner.enable_funding(through_wire(&request)?).await?;
        through_wire(&response)
    }

    async fn request_adaptor_details(
        &self,
        request: AdaptorDetailsRequest,
    ) -> Result<AdaptorDetailsResponse> {
        let response = self
            .inner
            .request_adaptor_details(through_wire(&request)?)
            .await?;
        through_wire(&response)
    }

    async fn announce_deposit(&self, request: AnnounceDepositRequest) -> Result<AnnounceDepositResponse> {
        let response = self.inner.announce_deposit(through_wire(&request)?).await?;
        through_wire(&response)
    }
}
