//! RocksDB-backed [`KvStore`].
//!
//! A single column family holds every wallet record; callers distinguish
//! record kinds by key prefix (see `libcoin-wallet::walletdb`), the same
//! way WalletDB's own key space is organized. Multi-key updates go
//! through an atomic [`WriteBatch`], mirroring how block connection is
//! made all-or-nothing in the chain store this pattern is grounded on.

use std::path::Path;

use rocksdb::{Options, WriteBatch, DB};

use crate::{KvStore, KvTransaction, OpenMode, StoreError};

pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        match mode {
            OpenMode::ReadOnly => {
                let db = DB::open_for_read_only(&opts, path.as_ref(), false)
                    .map_err(|e| StoreError::Engine(e.to_string()))?;
                return Ok(Self { db });
            }
            OpenMode::ReadWrite => {
                opts.create_if_missing(false);
            }
            OpenMode::Create => {
                opts.create_if_missing(true);
            }
        }

        let db = DB::open(&opts, path.as_ref()).map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(Self { db })
    }
}

impl KvStore for RocksKv {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(key, value)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn erase(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete(key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .db
            .get(key)
            .map_err(|e| StoreError::Engine(e.to_string()))?
            .is_some())
    }

    fn cursor(&self) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>, StoreError> {
        let iter = self
            .db
            .iterator(rocksdb::IteratorMode::Start)
            .filter_map(|item| item.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()));
        Ok(Box::new(iter))
    }

    fn txn_begin(&self) -> Result<Box<dyn KvTransaction + '_>, StoreError> {
        Ok(Box::new(RocksTxn {
            db: &self.db,
            batch: WriteBatch::default(),
            closed: false,
        }))
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::Engine(e.to_string()))
    }
}

struct RocksTxn<'a> {
    db: &'a DB,
    batch: WriteBatch,
    closed: bool,
}

impl<'a> KvTransaction for RocksTxn<'a> {
    fn write(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(key, value);
    }

    fn erase(&mut self, key: &[u8]) {
        self.batch.delete(key);
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        self.closed = true;
        let batch = std::mem::take(&mut self.batch);
        self.db
            .write(batch)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn abort(mut self: Box<Self>) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (RocksKv, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksKv::open(dir.path().join("wallet.db"), OpenMode::Create).unwrap();
        (store, dir)
    }

    #[test]
    fn write_read_erase() {
        let (store, _dir) = temp_store();
        store.write(b"k", b"v").unwrap();
        assert_eq!(store.read(b"k").unwrap(), Some(b"v".to_vec()));
        store.erase(b"k").unwrap();
        assert_eq!(store.read(b"k").unwrap(), None);
    }

    #[test]
    fn transaction_commit_is_atomic() {
        let (store, _dir) = temp_store();
        let mut txn = store.txn_begin().unwrap();
        txn.write(b"a", b"1");
        txn.write(b"b", b"2");
        txn.commit().unwrap();
        assert_eq!(store.read(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.read(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn readonly_open_of_existing_store_sees_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksKv::open(dir.path().join("wallet.db"), OpenMode::Create).unwrap();
            store.write(b"k", b"v").unwrap();
        }
        let store = RocksKv::open(dir.path().join("wallet.db"), OpenMode::ReadOnly).unwrap();
        assert_eq!(store.read(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn readwrite_open_fails_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = RocksKv::open(dir.path().join("missing.db"), OpenMode::ReadWrite);
        assert!(result.is_err());
    }
}
