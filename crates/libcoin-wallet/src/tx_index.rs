//! Component G: `TxIndex` — per-transaction wallet metadata (`mapWallet`).
//!
//! Augments each observed [`Transaction`] with the bookkeeping the wallet
//! needs: confirmation location, when it arrived, whether we originated
//! it, which of its outputs are already spent, and the ancestor
//! transactions needed to relay it again later. Insertion is the common
//! case; re-observing a transaction we already hold merges new
//! information in rather than replacing the record outright.

use std::collections::HashMap;

use libcoin_core::traits::ChainFacade;
use libcoin_core::types::{Hash256, Transaction};

use crate::crypto_keystore::CryptoKeyStore;

/// An ancestor transaction carried along for relay and for the
/// ancestry walk `IsConfirmed` performs (Component H): it needs its own
/// `from_me` flag and its own ancestors to let confirmation recurse
/// through a chain of our own unconfirmed transactions.
#[derive(Clone, Debug)]
pub struct AncestorTx {
    pub tx: Transaction,
    pub from_me: bool,
    pub vtx_prev: Vec<AncestorTx>,
}

impl AncestorTx {
    pub fn new(tx: Transaction, from_me: bool) -> Self {
        Self { tx, from_me, vtx_prev: Vec::new() }
    }
}

/// A transaction plus the wallet-specific metadata tracked alongside it.
#[derive(Clone, Debug)]
pub struct WalletTx {
    pub tx: Transaction,
    /// Zero until the transaction is seen in a block.
    pub block_hash: Hash256,
    pub merkle_branch: Vec<Hash256>,
    /// -1 until the transaction's position in its block is known.
    pub merkle_index: i32,
    pub time_received: i64,
    /// At least one input spends an output this wallet controls.
    pub from_me: bool,
    /// One entry per output; `spent[i]` is true once output `i` has
    /// been seen as spent by some other indexed transaction's input.
    pub spent: Vec<bool>,
    /// Ancestor transactions kept around so this transaction can be
    /// relayed (with its dependencies) even if the chain has since
    /// pruned them from its own mempool.
    pub vtx_prev: Vec<AncestorTx>,
}

impl WalletTx {
    pub fn new(tx: Transaction, time_received: i64) -> Self {
        let output_count = tx.outputs.len();
        Self {
            tx,
            block_hash: Hash256::ZERO,
            merkle_branch: Vec::new(),
            merkle_index: -1,
            time_received,
            from_me: false,
            spent: vec![false; output_count],
            vtx_prev: Vec::new(),
        }
    }

    pub fn txid(&self) -> Hash256 {
        self.tx.txid()
    }

    pub fn is_confirmed_by_block(&self) -> bool {
        !self.block_hash.is_zero()
    }
}

/// Whether `tx` pays or spends from a key this wallet holds.
pub fn classify(tx: &Transaction, keys: &CryptoKeyStore) -> (bool, bool) {
    let is_mine = tx.outputs.iter().any(|o| keys.is_mine(&o.pubkey_hash));
    // "From me" in the strict sense needs the previous outputs' scripts,
    // which this wallet doesn't have for foreign transactions; callers
    // that already know an input spends our coin (via `TxIndex` lookup)
    // pass that down instead of relying on this heuristic alone.
    let is_from_me = tx.inputs.iter().any(|i| !i.public_key.is_empty() && keys.is_mine(&libcoin_core::address::hash160(&i.public_key)));
    (is_mine, is_from_me)
}

#[derive(Default)]
pub struct TxIndex {
    map: HashMap<Hash256, WalletTx>,
}

impl TxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &Hash256) -> Option<&WalletTx> {
        self.map.get(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.map.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &WalletTx)> {
        self.map.iter()
    }

    /// Merge `incoming` into the index, per the field-by-field upgrade
    /// rule: each of `block_hash`/`merkle_index`/`from_me` only moves in
    /// the direction the wallet considers "more informative", and the
    /// spent bitmap is OR'd element-wise. Returns the merged record.
    pub fn add_to_wallet(&mut self, incoming: WalletTx) -> &WalletTx {
        let hash = incoming.txid();
        match self.map.get_mut(&hash) {
            None => {
                self.map.insert(hash, incoming);
            }
            Some(existing) => {
                if !incoming.block_hash.is_zero() && existing.block_hash.is_zero() {
                    existing.block_hash = incoming.block_hash;
                }
                if incoming.merkle_index != -1 && incoming.merkle_index != existing.merkle_index {
                    existing.merkle_index = incoming.merkle_index;
                    existing.merkle_branch = incoming.merkle_branch;
                }
                if incoming.from_me && !existing.from_me {
                    existing.from_me = true;
                }
                for (slot, incoming_spent) in existing.spent.iter_mut().zip(incoming.spent.iter()) {
                    *slot = *slot || *incoming_spent;
                }
                for ancestor in incoming.vtx_prev {
                    if !existing.vtx_prev.iter().any(|a| a.tx.txid() == ancestor.tx.txid()) {
                        existing.vtx_prev.push(ancestor);
                    }
                }
            }
        }
        self.map.get(&hash).expect("just inserted or merged")
    }

    /// Include `tx` iff it's already indexed, ours, or spends from us;
    /// always run `WalletUpdateSpent` regardless so externally-observed
    /// spends of our coins get marked even when the spending tx itself
    /// isn't worth indexing.
    pub fn add_to_wallet_if_involving_me(
        &mut self,
        tx: Transaction,
        block: Option<(Hash256, i32, Vec<Hash256>)>,
        time_received: i64,
        keys: &CryptoKeyStore,
    ) -> Option<&WalletTx> {
        let hash = tx.txid();
        let (is_mine, is_from_me) = classify(&tx, keys);
        let already_indexed = self.contains(&hash);

        self.wallet_update_spent(&tx);

        if !(already_indexed || is_mine || is_from_me) {
            return None;
        }

        let mut wtx = WalletTx::new(tx, time_received);
        wtx.from_me = is_from_me;
        if let Some((block_hash, index, branch)) = block {
            wtx.block_hash = block_hash;
            wtx.merkle_index = index;
            wtx.merkle_branch = branch;
        }
        Some(self.add_to_wallet(wtx))
    }

    /// Mark the referenced outputs of `tx`'s inputs as spent, for any
    /// previous output this index already tracks and considers ours.
    pub fn wallet_update_spent(&mut self, tx: &Transaction) {
        for input in &tx.inputs {
            if let Some(prev) = self.map.get_mut(&input.previous_output.txid) {
                let idx = input.previous_output.index as usize;
                if idx < prev.spent.len() {
                    prev.spent[idx] = true;
                }
            }
        }
    }

    /// Walk the chain forward from a locator, indexing every involving
    /// transaction. Returns the number of transactions added or merged.
    pub fn scan_for_wallet_transactions(
        &mut self,
        blocks: impl Iterator<Item = (libcoin_core::types::BlockLocator, Vec<Transaction>)>,
        time_received: impl Fn() -> i64,
        keys: &CryptoKeyStore,
    ) -> usize {
        let mut count = 0;
        for (locator, txs) in blocks {
            for tx in txs {
                if self
                    .add_to_wallet_if_involving_me(tx, Some((locator.hash, -1, Vec::new())), time_received(), keys)
                    .is_some()
                {
                    count += 1;
                }
            }
        }
        count
    }
}

/// `ChainFacade`-aware helper so `IsMine`/spend-tracking can participate
/// in deeper confirmation logic elsewhere (Component H) without TxIndex
/// itself depending on the facade for merge semantics.
pub fn depth_of(chain: &dyn ChainFacade, wtx: &WalletTx) -> i32 {
    if wtx.block_hash.is_zero() {
        0
    } else {
        chain.depth(&wtx.block_hash)
    }
}
