//! Ledger-A transaction model: outputs guarded by unlock conditions, spent
//! by inputs carrying Ed25519 signatures.
//!
//! The transaction id and the signing digest cover everything except the
//! signatures, so a funding output keeps its id after the wallet signs.

use std::fmt;

use adaptor_sig::{PublicKey, Signature};
use blake2::{Blake2s256, Digest};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwapError};

pub type Currency = u128;
pub type BlockHeight = u64;

macro_rules! hash_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; 32]);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = hex::FromHexError;

            fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(value, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }
    };
}

hash_id!(UnlockHash);
hash_id!(OutputId);
hash_id!(TransactionId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub public_keys: Vec<PublicKey>,
    pub signatures_required: u32,
}

impl UnlockConditions {
    pub fn single(key: PublicKey) -> Self {
        Self {
            public_keys: vec![key],
            signatures_required: 1,
        }
    }

    pub fn unlock_hash(&self) -> UnlockHash {
        let mut hasher = Blake2s256::new();
        hasher.update(b"unlock");
        hasher.update((self.public_keys.len() as u64).to_le_bytes());
        for key in &self.public_keys {
            hasher.update(key.to_compressed());
        }
        hasher.update(self.signatures_required.to_le_bytes());
        UnlockHash(hasher.finalize().into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub parent_id: OutputId,
    pub unlock_conditions: UnlockConditions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature {
    pub parent_id: OutputId,
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub miner_fee: Currency,
    /// Earliest height at which the transaction may be included.
    pub timelock: BlockHeight,
    pub signatures: Vec<InputSignature>,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        let mut hasher = Blake2s256::new();
        hasher.update(b"transaction");
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.parent_id.0);
            hasher.update(input.unlock_conditions.unlock_hash().0);
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update(output.unlock_hash.0);
        }
        hasher.update(self.miner_fee.to_le_bytes());
        hasher.update(self.timelock.to_le_bytes());
        TransactionId(hasher.finalize().into())
    }

    /// Digest every input signature commits to.
    pub fn sig_hash(&self) -> [u8; 32] {
        let mut hasher = Blake2s256::new();
        hasher.update(b"sighash");
        hasher.update(self.id().0);
        hasher.finalize().into()
    }

    pub fn output_id(&self, index: usize) -> OutputId {
        let mut hasher = Blake2s256::new();
        hasher.update(b"output");
        hasher.update(self.id().0);
        hasher.update((index as u64).to_le_bytes());
        OutputId(hasher.finalize().into())
    }

    pub fn attach_signature(&mut self, parent_id: OutputId, public_key: PublicKey, signature: Signature) {
        self.signatures.retain(|sig| sig.parent_id != parent_id);
        self.signatures.push(InputSignature {
            parent_id,
            public_key,
            signature,
        });
    }

    pub fn output_total(&self) -> Currency {
        self.outputs.iter().map(|output| output.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableOutput {
    pub id: OutputId,
    pub value: Currency,
    pub unlock_conditions: UnlockConditions,
}

/// Builds an unsigned transaction paying `value` to `destination`.
///
/// Inputs are taken in order until their sum is strictly above
/// `value + miner_fee`; the remainder goes to `change` as a single output.
pub fn build_funding(
    usable: &[SpendableOutput],
    change: UnlockHash,
    destination: UnlockHash,
    value: Currency,
    miner_fee: Currency,
) -> Result<Transaction> {
    let required = value
        .checked_add(miner_fee)
        .ok_or(SwapError::InsufficientFunds { required: Currency::MAX, available: 0 })?;

    let mut inputs = Vec::new();
    let mut total: Currency = 0;
    for output in usable {
        if total > required {
            break;
        }
        total = total.saturating_add(output.value);
        inputs.push(Input {
            parent_id: output.id,
            unlock_conditions: output.unlock_conditions.clone(),
        });
    }
    if total <= required {
        return Err(SwapError::InsufficientFunds {
            required,
            available: total,
        });
    }

    Ok(Transaction {
        inputs,
        outputs: vec![
            Output {
                value,
                unlock_hash: destination,
            },
            Output {
                value: total - required,
                unlock_hash: change,
            },
        ],
        miner_fee,
        timelock: 0,
        signatures: Vec::new(),
    })
}

/// Spends output 0 of a funding transaction held under `joint`.
pub fn build_joint_spend(
    funding_output: OutputId,
    joint: &UnlockConditions,
    destination: UnlockHash,
    amount: Currency,
    miner_fee: Currency,
    timelock: BlockHeight,
) -> Transaction {
    Transaction {
        inputs: vec![Input {
            parent_id: funding_output,
            unlock_conditions: joint.clone(),
        }],
        outputs: vec![Output {
            value: amount,
            unlock_hash: destination,
        }],
        miner_fee,
        timelock,
        signatures: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptor_sig::Keypair;

    fn outputs(values: &[Currency]) -> Vec<SpendableOutput> {
        let key = Keypair::generate();
        values
            .iter()
            .enumerate()
            .map(|(index, value)| SpendableOutput {
                id: OutputId([index as u8; 32]),
                value: *value,
                unlock_conditions: UnlockConditions::single(*key.public()),
            })
            .collect()
    }

    #[test]
    fn selects_inputs_until_strictly_above_total() {
        let usable = outputs(&[60, 50, 40]);
        let tx = build_funding(&usable, UnlockHash([1; 32]), UnlockHash([2; 32]), 100, 10).unwrap();
        assert_eq!(tx.inputs.len(), 3);
        assert_eq!(tx.outputs[0].value, 100);
        assert_eq!(tx.outputs[1].value, 40);
        let tx = build_funding(&usable, UnlockHash([1; 32]), UnlockHash([2; 32]), 99, 10).unwrap();
        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs[1].value, 1);
    }

    #[test]
    fn exact_balance_is_insufficient() {
        let usable = outputs(&[60, 50]);
        let err = build_funding(&usable, UnlockHash([1; 32]), UnlockHash([2; 32]), 100, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            SwapError::InsufficientFunds { required: 110, available: 110 }
        ));
    }

    #[test]
    fn id_ignores_signatures() {
        let usable = outputs(&[500]);
        let mut tx = build_funding(&usable, UnlockHash([1; 32]), UnlockHash([2; 32]), 100, 10).unwrap();
        let id = tx.id();
        let output = tx.output_id(0);
        let key = Keypair::generate();
        let signature = key.sign(&tx.sig_hash());
        tx.attach_signature(usable[0].id, *key.public(), signature);
        assert_eq!(tx.id(), id);
        assert_eq!(tx.output_id(0), output);
        assert_ne!(tx.output_id(1), output);
    }

    #[test]
    fn timelock_changes_digest() {
        let joint = UnlockConditions::single(*Keypair::generate().public());
        let a = build_joint_spend(OutputId([3; 32]), &joint, UnlockHash([4; 32]), 10, 1, 100);
        let b = build_joint_spend(OutputId([3; 32]), &joint, UnlockHash([4; 32]), 10, 1, 101);
        assert_ne!(a.sig_hash(), b.sig_hash());
    }
}
