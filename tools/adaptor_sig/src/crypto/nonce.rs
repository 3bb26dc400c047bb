use std::fmt;

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::joint::{JointKey, Party};
use super::keys::{Keypair, PublicKey};
use super::signature::hash_to_scalar;
use crate::types::{decode_hex, CryptoError};

/// Public commitment `R_i = r_i·B` to a signer's nonce for one message.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonceCommitment(EdwardsPoint);

impl NonceCommitment {
    pub fn point(&self) -> &EdwardsPoint {
        &self.0
    }

    pub fn to_compressed(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn from_compressed(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        PublicKey::from_compressed(bytes).map(|key| Self(*key.point()))
    }
}

impl fmt::Debug for NonceCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NonceCommitment({})", hex::encode(self.to_compressed()))
    }
}

impl TryFrom<String> for NonceCommitment {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_compressed(decode_hex(&value)?)
    }
}

impl From<NonceCommitment> for String {
    fn from(value: NonceCommitment) -> Self {
        hex::encode(value.to_compressed())
    }
}

/// Both parties' commitments for the same message, in party order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonces {
    pub initiator: NonceCommitment,
    pub responder: NonceCommitment,
}

impl Nonces {
    pub fn get(&self, party: Party) -> &NonceCommitment {
        match party {
            Party::Initiator => &self.initiator,
            Party::Responder => &self.responder,
        }
    }

    pub(crate) fn total(&self) -> EdwardsPoint {
        self.initiator.0 + self.responder.0
    }
}

/// Derives the signer's nonce commitment for `message` under `joint`.
///
/// The nonce is a hash of the secret prefix, the joint key and the message,
/// so it is recomputed rather than stored and never repeats across messages
/// or joint keys.
pub fn commit_nonce(keypair: &Keypair, joint: &JointKey, message: &[u8]) -> NonceCommitment {
    NonceCommitment(EdwardsPoint::mul_base(&secret_nonce(keypair, joint, message)))
}

pub(crate) fn secret_nonce(keypair: &Keypair, joint: &JointKey, message: &[u8]) -> Scalar {
    let expanded = keypair.secret().expand();
    hash_to_scalar(&[
        &expanded.prefix,
        &joint.aggregate().to_compressed(),
        message,
    ])
}
