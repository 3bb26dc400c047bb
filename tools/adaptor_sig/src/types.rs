use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid compressed point")]
    InvalidPoint,
    #[error("small-order point")]
    SmallOrderPoint,
    #[error("non-canonical scalar")]
    InvalidScalar,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("joint key requires two distinct public keys")]
    DuplicateKey,
    #[error("nonce commitment does not match the signer's key and message")]
    NonceMismatch,
    #[error("signing key is not part of the joint key")]
    ForeignKey,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

pub(crate) fn decode_hex<const N: usize>(encoded: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(encoded).map_err(|_| CryptoError::InvalidHex)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidLength { expected: N, actual })
}
