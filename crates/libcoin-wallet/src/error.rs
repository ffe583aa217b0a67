//! Wallet error types.

use libcoin_codec::CodecError;
use libcoin_core::error::{AddressError, CryptoError};
use libcoin_store::StoreError;
use thiserror::Error;

/// Errors produced by wallet operations.
///
/// Variants map directly onto the error kinds a wallet engine is
/// expected to distinguish: callers branch on these to decide whether
/// to prompt for a passphrase, retry with a smaller amount, or give up.
#[derive(Error, Debug)]
pub enum WalletError {
    /// The wallet is encrypted and currently locked.
    #[error("wallet is locked")]
    Locked,

    /// A key was referenced that this wallet does not hold.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// Available funds, after coin selection, fall short of what's needed.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    /// The computed fee exceeds the caller's configured maximum.
    #[error("fee too large: {fee} > {max}")]
    FeeTooLarge { fee: u64, max: u64 },

    /// The built transaction exceeds the maximum allowed size.
    #[error("transaction too large: {size} > {max}")]
    TxTooLarge { size: usize, max: usize },

    /// Input signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The on-disk wallet database is corrupt.
    #[error("wallet database is corrupt: {0}")]
    DbCorrupt(String),

    /// The on-disk wallet database is readable but written by an older
    /// version; the caller should rewrite it at the next opportunity.
    #[error("wallet database needs rewriting")]
    DbNeedsRewrite,

    /// A record failed to decode.
    #[error("decode error: {0}")]
    DecodeError(#[from] CodecError),

    /// The supplied passphrase did not unlock the wallet.
    #[error("bad passphrase")]
    BadPassphrase,

    /// The chain facade rejected a transaction the wallet tried to relay.
    #[error("transaction rejected by network")]
    Rejected,

    /// The fee-convergence loop in `CreateTransaction` did not settle
    /// within the iteration bound.
    #[error("fee did not converge after {iterations} iterations")]
    FeeNotConverged { iterations: u32 },

    /// Invalid recipient address.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// Underlying key-value store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Underlying cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds { have: 100, need: 200 };
        assert_eq!(e.to_string(), "insufficient funds: have 100, need 200");
    }

    #[test]
    fn display_locked() {
        assert_eq!(WalletError::Locked.to_string(), "wallet is locked");
    }

    #[test]
    fn display_bad_passphrase() {
        assert_eq!(WalletError::BadPassphrase.to_string(), "bad passphrase");
    }

    #[test]
    fn from_codec_error() {
        let e: WalletError = CodecError::Truncated.into();
        assert!(matches!(e, WalletError::DecodeError(CodecError::Truncated)));
    }

    #[test]
    fn from_address_error() {
        let e: WalletError = AddressError::UnknownNetwork(0xFF).into();
        assert!(matches!(e, WalletError::InvalidAddress(_)));
    }
}
