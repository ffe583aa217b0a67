//! Shared error types: cryptography and address encoding.
//!
//! The wallet's own error kinds (`Locked`, `InsufficientFunds`, etc.) live
//! in `libcoin-wallet::error` since they describe wallet-level failures;
//! this crate only owns errors for the primitives it implements directly.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,
    #[error("invalid signature bytes")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding")]
    InvalidEncoding,
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("unknown network byte: {0:#04x}")]
    UnknownNetwork(u8),
}
