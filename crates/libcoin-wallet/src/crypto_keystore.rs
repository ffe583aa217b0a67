//! Component C: `CryptoKeyStore` — passphrase-encrypted key custody.
//!
//! Layers on top of [`KeyStore`]: before encryption, keys live in the
//! plaintext store exactly as before. `encrypt_keys` generates a random
//! master key, encrypts it under a passphrase-derived `Crypter`, then
//! re-encrypts every existing key under the master key and discards the
//! plaintext copies. From then on the store is locked until `unlock` is
//! called with the right passphrase.

use std::collections::HashMap;

use libcoin_core::crypto::{KeyPair, PublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::crypter::Crypter;
use crate::error::WalletError;
use crate::kdf::calibrate_rounds;
use crate::keystore::KeyStore;

/// The encrypted master key, as persisted to the wallet database.
#[derive(Clone)]
pub struct MasterKeyRecord {
    pub encrypted_master_key: Vec<u8>,
    pub salt: [u8; 8],
    pub derive_rounds: u32,
}

/// A `KeyStore` that can be sealed behind a passphrase.
///
/// While unencrypted, behaves exactly like [`KeyStore`]. Once
/// [`encrypt_keys`](Self::encrypt_keys) has been called, every operation
/// that needs a private key requires the store to be
/// [`unlock`](Self::unlock)ed first.
#[derive(Default)]
pub struct CryptoKeyStore {
    plain: KeyStore,
    encrypted_keys: HashMap<[u8; 32], Vec<u8>>,
    master_key_record: Option<MasterKeyRecord>,
    unlocked_master_key: Option<[u8; 32]>,
}

impl CryptoKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_crypted(&self) -> bool {
        self.master_key_record.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.is_crypted() && self.unlocked_master_key.is_none()
    }

    /// Add a plaintext key. Only valid before encryption; once crypted,
    /// new keys must arrive via `add_crypted_key` or by generating them
    /// while unlocked through a higher-level wallet operation.
    pub fn add_key(&mut self, keypair: KeyPair) -> Result<bool, WalletError> {
        if self.is_crypted() {
            return Err(WalletError::Locked);
        }
        Ok(self.plain.add_key(keypair))
    }

    /// Load an already-encrypted key record, as read back from the
    /// wallet database.
    pub fn add_crypted_key(&mut self, pubkey: PublicKey, encrypted_secret: Vec<u8>) {
        self.encrypted_keys.insert(pubkey.to_bytes(), encrypted_secret);
    }

    pub fn set_master_key_record(&mut self, record: MasterKeyRecord) {
        self.master_key_record = Some(record);
    }

    pub fn master_key_record(&self) -> Option<&MasterKeyRecord> {
        self.master_key_record.as_ref()
    }

    /// The raw ciphertext for an already-crypted key, for persisting to
    /// the wallet database. `None` if the store isn't crypted or holds
    /// no such key.
    pub fn encrypted_key_bytes(&self, pubkey: &PublicKey) -> Option<&[u8]> {
        self.encrypted_keys.get(&pubkey.to_bytes()).map(|v| v.as_slice())
    }

    pub fn have_key(&self, pubkey: &PublicKey) -> bool {
        if self.is_crypted() {
            self.encrypted_keys.contains_key(&pubkey.to_bytes())
        } else {
            self.plain.have_key(pubkey)
        }
    }

    pub fn get_pubkeys(&self) -> Vec<PublicKey> {
        if self.is_crypted() {
            self.encrypted_keys
                .keys()
                .map(|bytes| PublicKey::from_bytes(bytes).expect("stored pubkey bytes are valid"))
                .collect()
        } else {
            self.plain.get_pubkeys().collect()
        }
    }

    /// Whether `pubkey_hash` belongs to a key this store knows about.
    /// Needs only public material, so this works even while locked.
    pub fn is_mine(&self, pubkey_hash: &[u8; 20]) -> bool {
        if self.is_crypted() {
            self.encrypted_keys
                .keys()
                .any(|bytes| libcoin_core::address::hash160(bytes) == *pubkey_hash)
        } else {
            self.plain
                .get_pubkeys()
                .any(|pk| libcoin_core::address::hash160(&pk.to_bytes()) == *pubkey_hash)
        }
    }

    /// The public key behind `pubkey_hash`, if this store holds it.
    /// Works while locked, since only public material is needed.
    pub fn find_by_hash(&self, pubkey_hash: &[u8; 20]) -> Option<PublicKey> {
        if self.is_crypted() {
            self.encrypted_keys
                .keys()
                .find(|bytes| libcoin_core::address::hash160(bytes) == *pubkey_hash)
                .map(|bytes| PublicKey::from_bytes(bytes).expect("stored pubkey bytes are valid"))
        } else {
            self.plain
                .get_pubkeys()
                .find(|pk| libcoin_core::address::hash160(&pk.to_bytes()) == *pubkey_hash)
        }
    }

    pub fn len(&self) -> usize {
        if self.is_crypted() {
            self.encrypted_keys.len()
        } else {
            self.plain.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recover the keypair for `pubkey`, decrypting if necessary.
    pub fn get_key(&self, pubkey: &PublicKey) -> Result<KeyPair, WalletError> {
        if !self.is_crypted() {
            return self.plain.get_key(pubkey).map(|kp| kp.clone());
        }
        let master_key = self.unlocked_master_key.ok_or(WalletError::Locked)?;
        let encrypted = self
            .encrypted_keys
            .get(&pubkey.to_bytes())
            .ok_or_else(|| WalletError::UnknownKey(pubkey.to_string()))?;
        let secret = decrypt_key_secret(&master_key, pubkey, encrypted)?;
        Ok(KeyPair::from_secret_bytes(secret))
    }

    /// Derive a random master key, encrypt it under `passphrase`, and
    /// re-encrypt every plaintext key under that master key. Leaves the
    /// store locked; callers must `unlock` afterwards to use it.
    ///
    /// Round count is self-calibrated via [`calibrate_rounds`] rather
    /// than fixed, so derivation cost stays roughly constant across
    /// machines.
    pub fn encrypt_keys(&mut self, passphrase: &[u8]) -> Result<(), WalletError> {
        if self.is_crypted() {
            return Err(WalletError::Locked);
        }

        let mut master_key = [0u8; 32];
        OsRng.fill_bytes(&mut master_key);
        let mut salt = [0u8; 8];
        OsRng.fill_bytes(&mut salt);
        let rounds = calibrate_rounds();

        let passphrase_crypter = Crypter::from_passphrase(passphrase, &salt, rounds);
        let encrypted_master_key = passphrase_crypter.encrypt(&master_key);

        let mut freshly_encrypted = HashMap::new();
        for pubkey in self.plain.get_pubkeys().collect::<Vec<_>>() {
            let keypair = match self.plain.get_key(&pubkey) {
                Ok(kp) => kp,
                Err(e) => {
                    master_key.zeroize();
                    abort_on_partial_encryption(&format!("missing plaintext key mid-encryption: {e}"));
                }
            };
            let ciphertext = match encrypt_key_secret(&master_key, &pubkey, &keypair.secret_bytes()) {
                Ok(c) => c,
                Err(e) => {
                    master_key.zeroize();
                    abort_on_partial_encryption(&format!("failed to encrypt key: {e}"));
                }
            };
            freshly_encrypted.insert(pubkey.to_bytes(), ciphertext);
        }

        self.encrypted_keys = freshly_encrypted;
        self.master_key_record = Some(MasterKeyRecord {
            encrypted_master_key,
            salt,
            derive_rounds: rounds,
        });
        self.plain = KeyStore::new();
        master_key.zeroize();
        Ok(())
    }

    /// Unlock the store by deriving the master key from `passphrase`.
    /// Insert a key generated outside the plaintext-add path (namely, a
    /// freshly topped-up keypool entry), respecting whatever lock state
    /// the store is currently in. While uncrypted this is just
    /// `add_key`; once crypted, the store must be unlocked so the new
    /// key can be sealed under the existing master key, and the
    /// ciphertext is handed back for the caller to persist as a "ckey"
    /// record (the plaintext path persists as a "key" record instead).
    pub fn add_key_for_keypool(&mut self, keypair: KeyPair) -> Result<Option<Vec<u8>>, WalletError> {
        if !self.is_crypted() {
            self.plain.add_key(keypair);
            return Ok(None);
        }
        let master_key = self.unlocked_master_key.ok_or(WalletError::Locked)?;
        let pubkey = keypair.public_key();
        let ciphertext = encrypt_key_secret(&master_key, &pubkey, &keypair.secret_bytes())?;
        self.encrypted_keys.insert(pubkey.to_bytes(), ciphertext.clone());
        Ok(Some(ciphertext))
    }

    /// Derive the master key from `passphrase`, then decrypt every
    /// stored key and check its derived public key against the one it's
    /// filed under: all-or-nothing, so a passphrase that happens to
    /// decrypt the master-key record but not every key (a corrupt
    /// record, or sheer coincidence) never leaves the store half-unlocked.
    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<(), WalletError> {
        let record = self.master_key_record.as_ref().ok_or(WalletError::Locked)?;
        let crypter = Crypter::from_passphrase(passphrase, &record.salt, record.derive_rounds);
        let decrypted = crypter.decrypt(&record.encrypted_master_key)?;
        if decrypted.len() != 32 {
            return Err(WalletError::BadPassphrase);
        }
        let mut master_key = [0u8; 32];
        master_key.copy_from_slice(&decrypted);

        for (pub_bytes, ciphertext) in &self.encrypted_keys {
            let pubkey = PublicKey::from_bytes(pub_bytes).expect("stored pubkey bytes are valid");
            let mut secret = match decrypt_key_secret(&master_key, &pubkey, ciphertext) {
                Ok(secret) => secret,
                Err(_) => {
                    master_key.zeroize();
                    return Err(WalletError::BadPassphrase);
                }
            };
            let derived = KeyPair::from_secret_bytes(secret).public_key();
            secret.zeroize();
            if derived.to_bytes() != *pub_bytes {
                master_key.zeroize();
                return Err(WalletError::BadPassphrase);
            }
        }

        self.unlocked_master_key = Some(master_key);
        Ok(())
    }

    pub fn lock(&mut self) {
        if let Some(mut key) = self.unlocked_master_key.take() {
            key.zeroize();
        }
    }
}

/// Per-key IV derivation: the first 16 bytes of double-SHA256 of the
/// public key, so each key's ciphertext uses a distinct IV under the
/// shared master key without persisting one per key.
fn per_key_iv(pubkey: &PublicKey) -> [u8; 16] {
    let hash = libcoin_core::types::Hash256::double_sha256(&pubkey.to_bytes());
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&hash.as_bytes()[..16]);
    iv
}

fn encrypt_key_secret(master_key: &[u8; 32], pubkey: &PublicKey, secret: &[u8; 32]) -> Result<Vec<u8>, WalletError> {
    let crypter = Crypter::from_key_iv(*master_key, per_key_iv(pubkey));
    Ok(crypter.encrypt(secret))
}

fn decrypt_key_secret(master_key: &[u8; 32], pubkey: &PublicKey, ciphertext: &[u8]) -> Result<[u8; 32], WalletError> {
    let crypter = Crypter::from_key_iv(*master_key, per_key_iv(pubkey));
    let plaintext = crypter.decrypt(ciphertext)?;
    if plaintext.len() != 32 {
        return Err(WalletError::BadPassphrase);
    }
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&plaintext);
    Ok(secret)
}

/// A key failed to encrypt partway through `encrypt_keys`, leaving the
/// store in a mixed plaintext/ciphertext state that must never be
/// persisted. There is no reasonable recovery; log and terminate.
fn abort_on_partial_encryption(context: &str) -> ! {
    tracing::error!(context, "wallet left in partially encrypted state; aborting");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unencrypted_store_behaves_like_keystore() {
        let mut store = CryptoKeyStore::new();
        assert!(!store.is_crypted());
        assert!(!store.is_locked());
        let kp = KeyPair::generate();
        let pk = kp.public_key();
        store.add_key(kp).unwrap();
        assert!(store.have_key(&pk));
        assert_eq!(store.get_key(&pk).unwrap().public_key(), pk);
    }

    #[test]
    fn encrypt_then_unlock_roundtrips_keys() {
        let mut store = CryptoKeyStore::new();
        let kp = KeyPair::from_secret_bytes([7; 32]);
        let pk = kp.public_key();
        store.add_key(kp).unwrap();

        store.encrypt_keys(b"hunter2").unwrap();
        assert!(store.is_crypted());
        assert!(store.is_locked());
        assert!(matches!(store.get_key(&pk), Err(WalletError::Locked)));

        store.unlock(b"hunter2").unwrap();
        assert!(!store.is_locked());
        let recovered = store.get_key(&pk).unwrap();
        assert_eq!(recovered.public_key(), pk);
        assert_eq!(recovered.secret_bytes(), [7; 32]);
    }

    #[test]
    fn wrong_passphrase_fails_to_unlock() {
        let mut store = CryptoKeyStore::new();
        store.add_key(KeyPair::generate()).unwrap();
        store.encrypt_keys(b"correct").unwrap();
        assert!(matches!(store.unlock(b"wrong"), Err(WalletError::BadPassphrase)));
        assert!(store.is_locked());
    }

    #[test]
    fn lock_clears_master_key_and_blocks_access() {
        let mut store = CryptoKeyStore::new();
        let kp = KeyPair::generate();
        let pk = kp.public_key();
        store.add_key(kp).unwrap();
        store.encrypt_keys(b"pw").unwrap();
        store.unlock(b"pw").unwrap();
        assert!(store.get_key(&pk).is_ok());
        store.lock();
        assert!(store.is_locked());
        assert!(matches!(store.get_key(&pk), Err(WalletError::Locked)));
    }

    #[test]
    fn cannot_add_plaintext_key_once_crypted() {
        let mut store = CryptoKeyStore::new();
        store.encrypt_keys(b"pw").unwrap();
        assert!(matches!(store.add_key(KeyPair::generate()), Err(WalletError::Locked)));
    }

    #[test]
    fn is_mine_works_while_locked() {
        let mut store = CryptoKeyStore::new();
        let kp = KeyPair::generate();
        let hash = libcoin_core::address::hash160(&kp.public_key().to_bytes());
        store.add_key(kp).unwrap();
        store.encrypt_keys(b"pw").unwrap();
        assert!(store.is_locked());
        assert!(store.is_mine(&hash));
        assert!(!store.is_mine(&[0xAB; 20]));
    }

    #[test]
    fn distinct_keys_get_distinct_ivs() {
        let kp1 = KeyPair::from_secret_bytes([1; 32]);
        let kp2 = KeyPair::from_secret_bytes([2; 32]);
        assert_ne!(per_key_iv(&kp1.public_key()), per_key_iv(&kp2.public_key()));
    }

    #[test]
    fn unlocking_without_being_crypted_errors() {
        let mut store = CryptoKeyStore::new();
        assert!(matches!(store.unlock(b"pw"), Err(WalletError::Locked)));
    }

    #[test]
    fn unlock_is_all_or_nothing_across_every_key() {
        let mut store = CryptoKeyStore::new();
        store.add_key(KeyPair::generate()).unwrap();
        store.add_key(KeyPair::generate()).unwrap();
        store.encrypt_keys(b"pw").unwrap();

        // Corrupt one key's ciphertext so it won't decrypt to a secret
        // whose derived public key matches what it's filed under.
        let tampered_pubkey = *store.encrypted_keys.keys().next().unwrap();
        store.encrypted_keys.get_mut(&tampered_pubkey).unwrap()[0] ^= 0xFF;

        assert!(matches!(store.unlock(b"pw"), Err(WalletError::BadPassphrase)));
        assert!(store.is_locked());
    }
}
