//! # libcoin-wallet — full-node wallet engine.
//!
//! Classic `mapWallet`-style wallet: plaintext and passphrase-encrypted
//! key custody, a standing keypool for instant address issuance, a
//! per-transaction index with an ancestor-aware confirmation predicate,
//! bounded subset-sum coin selection, and a fee-converging transaction
//! builder — all durable over a transactional key-value store and
//! driven by chain events through a narrow [`traits::ChainFacade`]-style
//! boundary owned by `libcoin-core`.
//!
//! # Modules
//!
//! - [`kdf`] / [`crypter`] — passphrase key derivation and the AES-CBC
//!   layer keys are sealed under
//! - [`keystore`] — plaintext key storage
//! - [`crypto_keystore`] — passphrase-encrypted key custody atop `keystore`
//! - [`keypool`] — pre-generated receiving keys
//! - [`tx_index`] — per-transaction wallet metadata (`mapWallet`)
//! - [`confirm`] — the `IsConfirmed` predicate
//! - [`coin_selector`] — bounded subset-sum coin picking
//! - [`tx_builder`] — transaction assembly, signing, and fee convergence
//! - [`walletdb`] — durable records over the key-value store
//! - [`sync_listener`] — the wallet's view of chain events
//! - [`rng`] — injectable randomness for coin selection and resend jitter
//! - [`wallet`] — the composition root tying all of the above together
//! - [`error`] — `WalletError` enum

pub mod coin_selector;
pub mod confirm;
pub mod crypter;
pub mod crypto_keystore;
pub mod error;
pub mod kdf;
pub mod keypool;
pub mod keystore;
pub mod rng;
pub mod sync_listener;
pub mod tx_builder;
pub mod tx_index;
pub mod wallet;
pub mod walletdb;

pub use coin_selector::{CoinInfo, Candidate, ConfirmTiers, CONFIRM_TIERS};
pub use crypto_keystore::{CryptoKeyStore, MasterKeyRecord};
pub use error::WalletError;
pub use keypool::KeyPool;
pub use sync_listener::{SyncListener, WalletSyncListener};
pub use tx_builder::{BuiltTransaction, SpendableCoin};
pub use tx_index::{AncestorTx, TxIndex, WalletTx};
pub use wallet::{Wallet, WalletBalance, WalletState};
pub use walletdb::{AddressBook, LoadWalletResult, LoadedWalletExtras, Settings, WalletDb};
