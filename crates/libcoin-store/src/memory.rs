//! In-memory `KvStore`, used by wallet unit tests and by embedders that
//! don't want an on-disk database.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::{KvStore, KvTransaction, StoreError};

#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn erase(&self, key: &[u8]) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.lock().contains_key(key))
    }

    fn cursor(&self) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>, StoreError> {
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .data
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn txn_begin(&self) -> Result<Box<dyn KvTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTxn {
            store: self,
            writes: Vec::new(),
            erases: Vec::new(),
            closed: false,
        }))
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryKv,
    writes: Vec<(Vec<u8>, Vec<u8>)>,
    erases: Vec<Vec<u8>>,
    closed: bool,
}

impl<'a> KvTransaction for MemoryTxn<'a> {
    fn write(&mut self, key: &[u8], value: &[u8]) {
        self.writes.push((key.to_vec(), value.to_vec()));
    }

    fn erase(&mut self, key: &[u8]) {
        self.erases.push(key.to_vec());
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        self.closed = true;
        let mut guard = self.store.data.lock();
        for key in &self.erases {
            guard.remove(key);
        }
        for (key, value) in self.writes.drain(..) {
            guard.insert(key, value);
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.closed = true;
    }
}
