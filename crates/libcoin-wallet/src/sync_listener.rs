//! Component K: `SyncListener` — the wallet's view of chain events.
//!
//! An external chain driver (out of this crate's scope) holds an
//! `Arc<dyn SyncListener>` and calls back into it as new transactions and
//! blocks show up, rather than the wallet reaching out and polling. This
//! is a capability set, not an inheritance hierarchy — the driver only
//! ever needs these two notifications, so that's all the trait exposes.

use libcoin_core::traits::ChainFacade;
use libcoin_core::types::{BlockLocator, Hash256, Transaction};

use crate::crypto_keystore::CryptoKeyStore;
use crate::error::WalletError;
use crate::rng::WalletRng;
use crate::tx_builder;
use crate::tx_index::TxIndex;
use crate::walletdb::WalletDb;

/// Callback surface a chain driver invokes as new chain activity arrives.
pub trait SyncListener: Send + Sync {
    /// A transaction was accepted, either into the mempool or a block.
    /// `block` is `None` for a mempool-only observation.
    fn on_tx_accepted(&self, tx: Transaction, block: Option<(Hash256, i32, Vec<Hash256>)>, time_received: i64);

    /// A new block became the tip; `locator` is persisted as the
    /// wallet's resume point for the next `ScanForWalletTransactions`.
    fn on_block_accepted(&self, locator: BlockLocator);
}

/// The wallet's own `SyncListener` implementation: indexes incoming
/// transactions (Component G) and keeps the persisted best-block locator
/// (Component F) current. Held behind the same `cs_wallet` guard as the
/// rest of the wallet's mutable state by the composition root.
pub struct WalletSyncListener<'a> {
    pub index: &'a std::sync::Mutex<TxIndex>,
    pub keys: &'a std::sync::Mutex<CryptoKeyStore>,
    pub db: &'a WalletDb,
}

impl<'a> SyncListener for WalletSyncListener<'a> {
    fn on_tx_accepted(&self, tx: Transaction, block: Option<(Hash256, i32, Vec<Hash256>)>, time_received: i64) {
        let keys = self.keys.lock().expect("keystore mutex poisoned");
        let mut index = self.index.lock().expect("tx index mutex poisoned");
        if let Some(wtx) = index.add_to_wallet_if_involving_me(tx, block, time_received, &keys) {
            if let Err(err) = self.db.write_tx(wtx) {
                tracing::warn!(%err, "failed to persist incoming wallet transaction");
            }
        }
    }

    fn on_block_accepted(&self, locator: BlockLocator) {
        if let Err(err) = self.db.write_best_block(&locator) {
            tracing::warn!(%err, "failed to persist best-block locator");
        }
    }
}

/// Drive `resend_wallet_transactions` off a periodic tick, per the
/// design note's jittered 0–30 minute delay: callers invoke this no more
/// often than once a minute and it's a no-op unless the jitter window
/// has elapsed since `last_attempt`.
pub fn maybe_resend(
    index: &TxIndex,
    chain: &dyn ChainFacade,
    now: i64,
    last_attempt: i64,
    last_best_received_time: i64,
    rng: &mut dyn WalletRng,
) -> Result<Vec<Hash256>, WalletError> {
    let best_received_time = chain.best_received_time();
    Ok(tx_builder::resend_wallet_transactions(
        index,
        now,
        last_attempt,
        last_best_received_time,
        best_received_time,
        rng,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcoin_core::types::{OutPoint, TxInput, TxOutput};
    use libcoin_store::{open, OpenMode, KvEnv};
    use std::sync::Mutex;

    fn memory_db() -> WalletDb {
        WalletDb::new(KvEnv::new(open(":memory:", OpenMode::Create).unwrap()))
    }

    fn tx_paying(pubkey_hash: [u8; 20], value: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: vec![],
                public_key: vec![],
                sequence: 0,
            }],
            outputs: vec![TxOutput { value, pubkey_hash }],
            lock_time: 0,
        }
    }

    #[test]
    fn on_tx_accepted_indexes_and_persists_our_transaction() {
        let keys = Mutex::new(CryptoKeyStore::new());
        let kp = libcoin_core::crypto::KeyPair::generate();
        let hash = libcoin_core::address::hash160(&kp.public_key().to_bytes());
        keys.lock().unwrap().add_key(kp).unwrap();

        let index = Mutex::new(TxIndex::new());
        let db = memory_db();
        let listener = WalletSyncListener { index: &index, keys: &keys, db: &db };

        let tx = tx_paying(hash, 500);
        let txid = tx.txid();
        listener.on_tx_accepted(tx, None, 100);

        assert!(index.lock().unwrap().contains(&txid));
        assert!(db.load_wallet(&mut CryptoKeyStore::new(), &mut crate::keypool::KeyPool::new(2), &mut TxIndex::new()).is_ok());
    }

    #[test]
    fn on_tx_accepted_ignores_unrelated_transaction() {
        let keys = Mutex::new(CryptoKeyStore::new());
        let index = Mutex::new(TxIndex::new());
        let db = memory_db();
        let listener = WalletSyncListener { index: &index, keys: &keys, db: &db };

        listener.on_tx_accepted(tx_paying([9; 20], 1), None, 1);
        assert!(index.lock().unwrap().is_empty());
    }

    #[test]
    fn on_block_accepted_persists_locator() {
        let keys = Mutex::new(CryptoKeyStore::new());
        let index = Mutex::new(TxIndex::new());
        let db = memory_db();
        let listener = WalletSyncListener { index: &index, keys: &keys, db: &db };

        let locator = BlockLocator { height: 7, hash: Hash256([3; 32]) };
        listener.on_block_accepted(locator);

        let (_result, extras) = db
            .load_wallet(&mut CryptoKeyStore::new(), &mut crate::keypool::KeyPool::new(2), &mut TxIndex::new())
            .unwrap();
        assert_eq!(extras.best_block, Some(locator));
    }
}
