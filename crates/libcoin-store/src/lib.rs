//! Key/value store facade backing the wallet database.
//!
//! `KvStore` is the boundary between [`crate::KvEnv`] and the concrete
//! engine: a single in-memory implementation for tests and embedding,
//! and a RocksDB-backed implementation for everything else. Both give
//! the wallet the same contract: single-key reads/writes plus an
//! atomic, all-or-nothing transaction for the multi-record updates
//! `AddToWallet` and `KeyPool::top_up` need.

mod env;
pub mod memory;
pub mod rocks;

pub use env::KvEnv;

use std::path::Path;

/// Errors surfaced by a [`KvStore`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("underlying engine error: {0}")]
    Engine(String),
    #[error("transaction already committed or aborted")]
    TransactionClosed,
}

/// Open mode, mirroring the three modes WalletDB is opened under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; writes return an error.
    ReadOnly,
    /// Read-write, failing if the store does not already exist.
    ReadWrite,
    /// Read-write, creating the store if it does not exist.
    Create,
}

/// A flat key/value store with an atomic transaction.
///
/// Implementations need not support concurrent writers internally — the
/// wallet serializes all access behind `cs_wallet` (see the wallet
/// crate's `Wallet` type) — but must be `Send + Sync` so a `KvEnv`/
/// store pair can be shared behind an `Arc`.
pub trait KvStore: Send + Sync {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn erase(&self, key: &[u8]) -> Result<(), StoreError>;
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Iterate every key/value pair currently stored. Order is
    /// unspecified beyond "stable for the lifetime of the returned
    /// iterator" — callers that need a snapshot should collect it.
    fn cursor(&self) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>, StoreError>;

    /// Begin a transaction. Writes made through it are invisible to
    /// `read`/`cursor` until `commit` succeeds.
    fn txn_begin(&self) -> Result<Box<dyn KvTransaction + '_>, StoreError>;

    /// Force a durable checkpoint of everything committed so far.
    fn checkpoint(&self) -> Result<(), StoreError>;
}

/// A batch of writes/erases applied atomically on `commit`.
pub trait KvTransaction {
    fn write(&mut self, key: &[u8], value: &[u8]);
    fn erase(&mut self, key: &[u8]);
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
    fn abort(self: Box<Self>);
}

/// Open a store at `path`, choosing the RocksDB backend.
///
/// `path` of `:memory:` opens an in-memory store instead — convenient
/// for tests and for embedding the wallet without a filesystem.
pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Box<dyn KvStore>, StoreError> {
    if path.as_ref() == Path::new(":memory:") {
        return Ok(Box::new(memory::MemoryKv::new()));
    }
    Ok(Box::new(rocks::RocksKv::open(path, mode)?))
}
