use std::fmt;

use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use super::keys::PublicKey;
use crate::types::{decode_hex, CryptoError};

/// A complete 64-byte Ed25519 signature (`R || s`).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature([u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: 64,
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }

    pub(crate) fn from_parts(r: [u8; 32], s: &Scalar) -> Self {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&r);
        bytes[32..].copy_from_slice(s.as_bytes());
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl TryFrom<String> for Signature {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(decode_hex(&value)?))
    }
}

impl From<Signature> for String {
    fn from(value: Signature) -> Self {
        hex::encode(value.0)
    }
}

/// Verifies a complete signature with a stock Ed25519 verifier. Joint and
/// single-signer signatures are indistinguishable here.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&public_key.to_compressed()) else {
        return false;
    };
    let signature = DalekSignature::from_bytes(&signature.0);
    key.verify(message, &signature).is_ok()
}

pub(crate) fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

pub(crate) fn scalar_from_hex(value: &str) -> Result<Scalar, CryptoError> {
    let bytes: [u8; 32] = decode_hex(value)?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or(CryptoError::InvalidScalar)
}
