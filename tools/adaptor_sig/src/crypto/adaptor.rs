use std::fmt;

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::joint::{JointKey, Party};
use super::keys::{Keypair, PublicKey};
use super::nonce::Nonces;
use super::sign::{sign_share, verify_share};
use super::signature::{scalar_from_hex, Signature};
use crate::types::{decode_hex, CryptoError};

/// Adaptor secret `t`. Publishing a completed adaptor signature reveals it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AdaptorSecret(Scalar);

impl AdaptorSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
            .map(Self)
            .ok_or(CryptoError::InvalidScalar)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> AdaptorPoint {
        AdaptorPoint(EdwardsPoint::mul_base(&self.0))
    }

    /// True when `point == t·B`.
    pub fn matches(&self, point: &AdaptorPoint) -> bool {
        self.public() == *point
    }
}

impl fmt::Debug for AdaptorSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdaptorSecret(..)")
    }
}

/// Adaptor public key `T = t·B`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdaptorPoint(EdwardsPoint);

impl AdaptorPoint {
    pub fn from_compressed(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        PublicKey::from_compressed(bytes).map(|key| Self(*key.point()))
    }

    pub fn to_compressed(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }
}

impl fmt::Debug for AdaptorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdaptorPoint({})", hex::encode(self.to_compressed()))
    }
}

impl fmt::Display for AdaptorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_compressed()))
    }
}

impl TryFrom<String> for AdaptorPoint {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_compressed(decode_hex(&value)?)
    }
}

impl From<AdaptorPoint> for String {
    fn from(value: AdaptorPoint) -> Self {
        value.to_string()
    }
}

pub fn generate_adaptor() -> (AdaptorSecret, AdaptorPoint) {
    let mut wide = [0u8; 64];
    OsRng.fill_bytes(&mut wide);
    let secret = AdaptorSecret(Scalar::from_bytes_mod_order_wide(&wide));
    wide.zeroize();
    let point = secret.public();
    (secret, point)
}

/// A partial signature bound to an adaptor point. It verifies against the
/// signer's prime key but can only be turned into a valid joint signature by
/// someone who knows the adaptor secret.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdaptorSignature(Scalar);

impl fmt::Debug for AdaptorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdaptorSignature({})", hex::encode(self.0.as_bytes()))
    }
}

impl TryFrom<String> for AdaptorSignature {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        scalar_from_hex(&value).map(Self)
    }
}

impl From<AdaptorSignature> for String {
    fn from(value: AdaptorSignature) -> Self {
        hex::encode(value.0.as_bytes())
    }
}

fn adapted_nonce(nonces: &Nonces, adaptor: &AdaptorPoint) -> EdwardsPoint {
    nonces.total() + adaptor.0
}

pub fn adaptor_sign(
    keypair: &Keypair,
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    adaptor: &AdaptorPoint,
    message: &[u8],
) -> Result<AdaptorSignature, CryptoError> {
    let nonce_point = adapted_nonce(nonces, adaptor);
    sign_share(keypair, joint, party, nonces, &nonce_point, message).map(AdaptorSignature)
}

pub fn verify_adaptor(
    joint: &JointKey,
    party: Party,
    nonces: &Nonces,
    adaptor: &AdaptorPoint,
    message: &[u8],
    signature: &AdaptorSignature,
) -> bool {
    let nonce_point = adapted_nonce(nonces, adaptor);
    verify_share(joint, party, nonces, &nonce_point, message, &signature.0)
}

/// Adds both adaptor shares and the adaptor secret into a complete signature
/// with nonce `R_1 + R_2 + T`.
pub fn complete_adaptor(
    nonces: &Nonces,
    shares: [&AdaptorSignature; 2],
    secret: &AdaptorSecret,
) -> Signature {
    let nonce_point = adapted_nonce(nonces, &secret.public());
    let s = shares[0].0 + shares[1].0 + secret.0;
    Signature::from_parts(nonce_point.compress().to_bytes(), &s)
}

/// Recovers `t` from a published completed signature and both shares.
pub fn recover_adaptor_secret(
    signature: &Signature,
    shares: [&AdaptorSignature; 2],
) -> Result<AdaptorSecret, CryptoError> {
    let bytes = signature.to_bytes();
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&bytes[32..]);
    let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(s_bytes))
        .ok_or(CryptoError::InvalidScalar)?;
    Ok(AdaptorSecret(s - shares[0].0 - shares[1].0))
}
