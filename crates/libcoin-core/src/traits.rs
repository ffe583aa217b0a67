//! The wallet's view of the outside chain: [`ChainFacade`].
//!
//! The wallet never talks to network or consensus code directly — it
//! asks a `ChainFacade` implementation for everything it needs to know
//! about confirmation depth, maturity, and finality, and it hands
//! accepted transactions back through the same boundary. Production
//! wiring (a real P2P/consensus engine) is out of this crate's scope;
//! tests drive the wallet against an in-memory fake.

use crate::types::{BlockLocator, Hash256, OutPoint, Transaction};

/// Read/write boundary between the wallet and the rest of the node.
pub trait ChainFacade: Send + Sync {
    /// Whether `tx` satisfies the chain's finality rule (lock time, etc.)
    /// given the current tip.
    fn is_final(&self, tx: &Transaction) -> bool;

    /// Confirmation depth of the block containing `hash`, or 0 if
    /// unconfirmed/unknown.
    fn depth(&self, hash: &Hash256) -> i32;

    /// Number of this wallet's own transactions known to have spent at
    /// least one output of the transaction `hash`. Used by the
    /// confirmation predicate's ancestor walk.
    fn num_spent(&self, hash: &Hash256) -> i32;

    fn is_spent(&self, coin: &OutPoint) -> bool;

    /// The transaction that spent `coin`, if known.
    fn spent_in(&self, coin: &OutPoint) -> Option<Hash256>;

    /// Blocks remaining before `tx` (if coinbase) is mature; 0 if not
    /// coinbase or already mature.
    fn blocks_to_maturity(&self, tx: &Transaction) -> i32;

    /// Unix timestamp of the most recently received block.
    fn best_received_time(&self) -> i64;

    fn genesis_hash(&self) -> Hash256;

    /// Locator for the block at `index`, if the chain is at least that tall.
    fn block_at(&self, index: u64) -> Option<BlockLocator>;

    fn network_id(&self) -> u8;

    /// Submit `tx` for relay/acceptance. Returns whether it was accepted.
    fn accept_transaction(&self, tx: &Transaction) -> bool;
}
