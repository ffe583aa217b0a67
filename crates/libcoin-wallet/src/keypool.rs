//! Component E: `KeyPool` — pre-generated receiving keys.
//!
//! A wallet keeps a standing pool of unused keys so that handing out a
//! new receiving address never blocks on key generation (or, for an
//! encrypted wallet, on having it unlocked). `reserve_key` hands one out
//! without consuming it; the caller then either `keep_key`s it (the key
//! was actually used, generate a replacement) or `return_key`s it (the
//! caller backed out, put it back in the pool).

use std::collections::BTreeMap;

use libcoin_core::crypto::{KeyPair, PublicKey};

use crate::error::WalletError;

/// Default number of spare keys the pool tries to maintain.
pub const DEFAULT_KEYPOOL_TARGET: usize = 100;

/// A single pool slot: an index assigned at generation time and the
/// keypair generated for it.
struct PoolEntry {
    keypair: KeyPair,
}

#[derive(Default)]
pub struct KeyPool {
    target_size: usize,
    next_index: u64,
    pool: BTreeMap<u64, PoolEntry>,
    reserved: BTreeMap<u64, PoolEntry>,
}

impl KeyPool {
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            next_index: 0,
            pool: BTreeMap::new(),
            reserved: BTreeMap::new(),
        }
    }

    /// Number of unused keys currently sitting in the pool.
    pub fn size(&self) -> usize {
        self.pool.len()
    }

    /// Generate keys until the pool holds `target_size + 1` of them —
    /// one more than the configured target, so that reserving a key
    /// never itself drops the pool below target before the next top-up.
    pub fn top_up(&mut self) {
        while self.pool.len() < self.target_size + 1 {
            let index = self.next_index;
            self.next_index += 1;
            self.pool.insert(index, PoolEntry { keypair: KeyPair::generate() });
        }
    }

    /// Hand out the oldest unused key without removing it from
    /// circulation. Returns the pool index and the public key; the
    /// caller must follow up with `keep_key` or `return_key`.
    pub fn reserve_key(&mut self) -> Result<(u64, PublicKey), WalletError> {
        if self.pool.is_empty() {
            self.top_up();
        }
        let (&index, _) = self
            .pool
            .iter()
            .next()
            .ok_or_else(|| WalletError::DbCorrupt("keypool empty after top-up".into()))?;
        let entry = self.pool.remove(&index).expect("index just looked up");
        let pubkey = entry.keypair.public_key();
        self.reserved.insert(index, entry);
        Ok((index, pubkey))
    }

    /// Confirm a reserved key was actually used: remove it from
    /// circulation for good and top the pool back up.
    pub fn keep_key(&mut self, index: u64) -> Result<(), WalletError> {
        self.reserved
            .remove(&index)
            .ok_or(WalletError::UnknownKey(format!("keypool index {index}")))?;
        self.top_up();
        Ok(())
    }

    /// Put a reserved key back into circulation; it will be the next
    /// one handed out by `reserve_key`.
    pub fn return_key(&mut self, index: u64) -> Result<(), WalletError> {
        let entry = self
            .reserved
            .remove(&index)
            .ok_or(WalletError::UnknownKey(format!("keypool index {index}")))?;
        self.pool.insert(index, entry);
        Ok(())
    }

    /// Look up the keypair behind a reserved index, e.g. to hand it to
    /// `CryptoKeyStore` once the caller commits to using it.
    pub fn reserved_keypair(&self, index: u64) -> Option<&KeyPair> {
        self.reserved.get(&index).map(|e| &e.keypair)
    }

    /// Every unused pool slot, for persisting to the wallet database or
    /// registering with `CryptoKeyStore` after a `top_up`.
    pub fn iter_pool(&self) -> impl Iterator<Item = (u64, &KeyPair)> {
        self.pool.iter().map(|(i, e)| (*i, &e.keypair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_up_fills_to_target_plus_one() {
        let mut pool = KeyPool::new(5);
        pool.top_up();
        assert_eq!(pool.size(), 6);
    }

    #[test]
    fn default_target_yields_101_keys() {
        let mut pool = KeyPool::new(DEFAULT_KEYPOOL_TARGET);
        pool.top_up();
        assert_eq!(pool.size(), 101);
    }

    #[test]
    fn reserve_then_keep_consumes_and_refills() {
        let mut pool = KeyPool::new(3);
        pool.top_up();
        let (index, _pubkey) = pool.reserve_key().unwrap();
        assert_eq!(pool.size(), 3);
        pool.keep_key(index).unwrap();
        assert_eq!(pool.size(), 4);
        assert!(pool.reserved_keypair(index).is_none());
    }

    #[test]
    fn reserve_then_return_restores_pool() {
        let mut pool = KeyPool::new(3);
        pool.top_up();
        let (index, pubkey) = pool.reserve_key().unwrap();
        assert_eq!(pool.size(), 3);
        pool.return_key(index).unwrap();
        assert_eq!(pool.size(), 4);
        let (index2, pubkey2) = pool.reserve_key().unwrap();
        assert_eq!(index, index2);
        assert_eq!(pubkey, pubkey2);
    }

    #[test]
    fn reserve_key_tops_up_empty_pool_automatically() {
        let mut pool = KeyPool::new(2);
        let (_index, _pubkey) = pool.reserve_key().unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn keeping_unknown_index_errors() {
        let mut pool = KeyPool::new(2);
        pool.top_up();
        assert!(matches!(pool.keep_key(999), Err(WalletError::UnknownKey(_))));
    }

    #[test]
    fn returning_unknown_index_errors() {
        let mut pool = KeyPool::new(2);
        pool.top_up();
        assert!(matches!(pool.return_key(999), Err(WalletError::UnknownKey(_))));
    }

    #[test]
    fn each_reserved_key_is_distinct() {
        let mut pool = KeyPool::new(5);
        pool.top_up();
        let (i1, pk1) = pool.reserve_key().unwrap();
        let (i2, pk2) = pool.reserve_key().unwrap();
        assert_ne!(i1, i2);
        assert_ne!(pk1, pk2);
    }
}
