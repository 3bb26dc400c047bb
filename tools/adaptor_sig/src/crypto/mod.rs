//! 2-of-2 joint Ed25519 signing with adaptor support.
//!
//! Auditor notes:
//! - Uses curve25519-dalek only for point/scalar arithmetic.
//! - Complete signatures are checked by ed25519-dalek, so anything this
//!   module accepts is an ordinary Ed25519 signature under the joint key.

mod adaptor;
mod joint;
mod keys;
mod nonce;
mod sign;
mod signature;

pub use adaptor::{
    adaptor_sign, complete_adaptor, generate_adaptor, recover_adaptor_secret, verify_adaptor,
    AdaptorPoint, AdaptorSecret, AdaptorSignature,
};
pub use joint::{derive_joint_key, JointKey, Party};
pub use keys::{Keypair, PublicKey, SecretKey};
pub use nonce::{commit_nonce, NonceCommitment, Nonces};
pub use sign::{combine, partial_sign, verify_partial, PartialSignature};
pub use signature::{verify, Signature};
