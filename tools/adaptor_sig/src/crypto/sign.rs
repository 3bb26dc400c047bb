use std::fmt;

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::joint::{JointKey, Party};
use super::keys::Keypair;
use super::nonce::{commit_nonce, secret_nonce, Nonces};
use super::signature::{hash_to_scalar, scalar_from_hex, Signature};
use crate::types::CryptoError;

/// One party's share `s_i` of a joint signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartialSignature(pub(crate) Scalar);

impl fmt::Debug for PartialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialSignature({})", hex::encode(self.0.as_bytes()))
    }
}

impl TryFrom<String> for PartialSignature {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        scalar_from_hex(&value).map(Self)
    }
}

impl From<PartialSignature> for String {
    fn from(value: PartialSignature) -> Self {
        hex::encode(value.0.as_bytes())
    }
}

pub(crate) fn challenge(nonce_point: &EdwardsPoint, joint: &JointKey, message: &[u8]) -> Scalar {
    hash_to_scalar(&[
        &nonce_point.compress().to_bytes(),
        &joint.aggregate().to_compressed(),
        message,
    ])
}

/// Computes `r_i + k·c_i·a_i` for the nonce point `nonce_point`.
pub(crate) fn sign_share(
    keypair: &Keypair,
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    nonce_point: &EdwardsPoint,
    message: &[u8],
) -> Result<Scalar, CryptoError> {
    if joint.member(party) != keypair.public() {
        return Err(CryptoError::ForeignKey);
    }
    if commit_nonce(keypair, joint, message) != *nonces.get(party) {
        return Err(CryptoError::NonceMismatch);
    }

    let k = challenge(nonce_point, joint, message);
    let expanded = keypair.secret().expand();
    let r = secret_nonce(keypair, joint, message);
    Ok(r + k * joint.coefficient(party) * expanded.scalar)
}

/// Checks `s_i·B == R_i + k·A_i'` for the nonce point `nonce_point`.
pub(crate) fn verify_share(
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    nonce_point: &EdwardsPoint,
    message: &[u8],
    share: &Scalar,
) -> bool {
    let k = challenge(nonce_point, joint, message);
    let expected = nonces.get(party).point() + k * joint.prime_key(party).point();
    EdwardsPoint::mul_base(share) == expected
}

pub fn partial_sign(
    keypair: &Keypair,
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    message: &[u8],
) -> Result<PartialSignature, CryptoError> {
    sign_share(keypair, joint, party, nonces, &nonces.total(), message).map(PartialSignature)
}

pub fn verify_partial(
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    message: &[u8],
    partial: &PartialSignature,
) -> bool {
    verify_share(joint, party, nonces, &nonces.total(), message, &partial.0)
}

/// Adds both partial signatures into a complete signature under
/// `joint.aggregate()`. The result is not verified here.
pub fn combine(nonces: &Nonces, partials: [&PartialSignature; 2]) -> Signature {
    let s = partials[0].0 + partials[1].0;
    Signature::from_parts(nonces.total().compress().to_bytes(), &s)
}
