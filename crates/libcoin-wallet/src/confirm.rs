//! Component H: the `IsConfirmed` predicate.
//!
//! A transaction is confirmed if the chain says so directly (depth ≥ 1),
//! or — for transactions we originated ourselves — if every ancestor
//! reachable through `vtxPrev` is itself final and either confirmed or
//! also one of ours. Implemented as an explicit BFS so a long chain of
//! unconfirmed ancestors can't blow the stack.

use std::collections::VecDeque;

use libcoin_core::traits::ChainFacade;

use crate::tx_index::{AncestorTx, WalletTx};

/// `true` iff `wtx` is confirmed per the recursive (BFS) rule above.
pub fn is_confirmed(wtx: &WalletTx, chain: &dyn ChainFacade) -> bool {
    if !chain.is_final(&wtx.tx) {
        return false;
    }
    if chain.depth(&wtx.txid()) >= 1 {
        return true;
    }
    if !wtx.from_me {
        return false;
    }

    // BFS over vtxPrev: every ancestor must be final, and either
    // independently confirmed by depth (in which case its own ancestors
    // don't need checking — it's a real confirmation boundary) or
    // itself from-me, in which case its ancestors join the queue.
    let mut queue: VecDeque<&AncestorTx> = wtx.vtx_prev.iter().collect();
    while let Some(ancestor) = queue.pop_front() {
        if !chain.is_final(&ancestor.tx) {
            return false;
        }
        if chain.depth(&ancestor.tx.txid()) >= 1 {
            continue;
        }
        if !ancestor.from_me {
            return false;
        }
        queue.extend(ancestor.vtx_prev.iter());
    }

    true
}
