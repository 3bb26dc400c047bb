//! Threshold-signature capability for cross-chain swaps.
//!
//! Auditor notes:
//! - All curve code lives under `crypto/`.
//! - Party order is always `[Initiator, Responder]`.

pub mod crypto;
pub mod types;

pub use crypto::{
    adaptor_sign, combine, commit_nonce, complete_adaptor, derive_joint_key, generate_adaptor,
    partial_sign, recover_adaptor_secret, verify, verify_adaptor, verify_partial, AdaptorPoint,
    AdaptorSecret, AdaptorSignature, JointKey, Keypair, NonceCommitment, Nonces,
    PartialSignature, Party, PublicKey, SecretKey, Signature,
};
pub use types::{CryptoError, Result};
