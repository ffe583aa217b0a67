//! Component B: `KeyStore` — an in-memory ledger of keypairs.
//!
//! The plaintext building block every wallet has even before encryption
//! is layered on top (see [`crate::crypto_keystore`]). Keys are looked
//! up by the raw 32-byte public key, matching how `TxOutput::pubkey_hash`
//! (which is derived from it) gets resolved back to signing material.

use std::collections::HashMap;

use libcoin_core::crypto::{KeyPair, PublicKey};

use crate::error::WalletError;

/// A ledger of known keypairs, keyed by public key bytes.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<[u8; 32], KeyPair>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keypair. Returns `false` if a key with the same public key
    /// was already present (it is left untouched).
    pub fn add_key(&mut self, keypair: KeyPair) -> bool {
        let pub_bytes = keypair.public_key().to_bytes();
        if self.keys.contains_key(&pub_bytes) {
            return false;
        }
        self.keys.insert(pub_bytes, keypair);
        true
    }

    pub fn have_key(&self, pubkey: &PublicKey) -> bool {
        self.keys.contains_key(&pubkey.to_bytes())
    }

    pub fn get_key(&self, pubkey: &PublicKey) -> Result<&KeyPair, WalletError> {
        self.keys
            .get(&pubkey.to_bytes())
            .ok_or_else(|| WalletError::UnknownKey(pubkey.to_string()))
    }

    pub fn get_pubkeys(&self) -> impl Iterator<Item = PublicKey> + '_ {
        self.keys.values().map(|kp| kp.public_key())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
