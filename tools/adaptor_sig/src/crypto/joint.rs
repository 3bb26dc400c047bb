use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::keys::PublicKey;
use super::signature::hash_to_scalar;
use crate::types::CryptoError;

/// Position of a signer within the 2-of-2 quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Initiator,
    Responder,
}

impl Party {
    pub fn index(self) -> usize {
        match self {
            Party::Initiator => 0,
            Party::Responder => 1,
        }
    }

    pub fn counterparty(self) -> Party {
        match self {
            Party::Initiator => Party::Responder,
            Party::Responder => Party::Initiator,
        }
    }
}

/// Aggregated 2-of-2 key.
///
/// Each party key `A_i` is weighted by `c_i = H(L || A_i)` where `L` hashes
/// both keys in sorted order. The aggregate `X = c_1·A_1 + c_2·A_2` is the
/// same whichever order the keys are supplied in; the prime key `c_i·A_i`
/// verifies party `i`'s partial contributions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointKey {
    aggregate: PublicKey,
    members: [PublicKey; 2],
    coefficients: [Scalar; 2],
    prime_keys: [PublicKey; 2],
}

pub fn derive_joint_key(
    initiator: &PublicKey,
    responder: &PublicKey,
) -> Result<JointKey, CryptoError> {
    if initiator == responder {
        return Err(CryptoError::DuplicateKey);
    }

    let members = [*initiator, *responder];
    let mut encoded = [initiator.to_compressed(), responder.to_compressed()];
    encoded.sort();
    let set_hash = hash_to_scalar(&[&encoded[0], &encoded[1]]).to_bytes();

    let coefficients = members.map(|key| hash_to_scalar(&[&set_hash, &key.to_compressed()]));
    let prime_points: [EdwardsPoint; 2] = [
        coefficients[0] * members[0].point(),
        coefficients[1] * members[1].point(),
    ];
    let aggregate = PublicKey::from_point(prime_points[0] + prime_points[1]);

    Ok(JointKey {
        aggregate,
        members,
        coefficients,
        prime_keys: prime_points.map(PublicKey::from_point),
    })
}

impl JointKey {
    pub fn aggregate(&self) -> &PublicKey {
        &self.aggregate
    }

    pub fn member(&self, party: Party) -> &PublicKey {
        &self.members[party.index()]
    }

    pub fn prime_key(&self, party: Party) -> &PublicKey {
        &self.prime_keys[party.index()]
    }

    pub(crate) fn coefficient(&self, party: Party) -> &Scalar {
        &self.coefficients[party.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn aggregate_ignores_argument_order() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let ab = derive_joint_key(a.public(), b.public()).unwrap();
        let ba = derive_joint_key(b.public(), a.public()).unwrap();
        assert_eq!(ab.aggregate(), ba.aggregate());
        assert_eq!(ab.prime_key(Party::Initiator), ba.prime_key(Party::Responder));
        assert_eq!(ab.prime_key(Party::Responder), ba.prime_key(Party::Initiator));
    }

    #[test]
    fn rejects_duplicate_members() {
        let a = Keypair::generate();
        let err = derive_joint_key(a.public(), a.public()).unwrap_err();
        assert_eq!(err, CryptoError::DuplicateKey);
    }
}
