//! Component J: `TxBuilder` — assemble, sign, fee-iterate, commit.
//!
//! `create_transaction` is the one entry point that turns a list of
//! recipients into a signed, fee-adequate transaction: select coins,
//! reserve a change key if there's change to return, sign every input,
//! then check whether the fee it paid is still enough for the
//! transaction's final size — if not, raise the fee and go around
//! again. The loop is bounded; a pathological fee market that never
//! converges surfaces as a typed error instead of spinning forever.

use libcoin_core::address::hash160;
use libcoin_core::constants::{CENT, MAX_STANDARD_TX_SIZE, MIN_TX_FEE};
use libcoin_core::crypto::PublicKey;
use libcoin_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput};

use crate::coin_selector::{select_coins, Candidate};
use crate::crypto_keystore::CryptoKeyStore;
use crate::error::WalletError;
use crate::keypool::KeyPool;
use crate::rng::WalletRng;
use crate::tx_index::WalletTx;

/// Bound on the fee-convergence loop in `create_transaction`; past this
/// many iterations the fee market is assumed not to converge.
pub const MAX_FEE_ITERATIONS: u32 = 32;

/// Priority above which a transaction can go out fee-free, in the same
/// units as `compute_priority` (value · confirmations / byte).
const ALLOW_FREE_PRIORITY_THRESHOLD: f64 = 57_600_000.0;

/// A coin this wallet could spend, with everything `create_transaction`
/// needs: the outpoint and value `CoinSelector` reasons about, plus the
/// public key required to sign an input spending it.
#[derive(Clone)]
pub struct SpendableCoin {
    pub coin: OutPoint,
    pub value: u64,
    pub pubkey: PublicKey,
    pub from_me: bool,
    pub depth: i32,
    pub is_coinbase: bool,
    pub blocks_to_maturity: i32,
}

pub struct BuiltTransaction {
    pub wtx: WalletTx,
    pub fee_paid: u64,
    /// `Some` if a change output was created and its keypool slot
    /// reserved; the caller must `keep_key` on commit or `return_key`
    /// on abandonment.
    pub reserved_change_key: Option<u64>,
}

/// Build, sign, and fee-balance a transaction paying `recipients` out of
/// `available` coins.
pub fn create_transaction(
    recipients: &[([u8; 20], u64)],
    available: &[SpendableCoin],
    keystore: &CryptoKeyStore,
    keypool: &mut KeyPool,
    rng: &mut dyn WalletRng,
) -> Result<BuiltTransaction, WalletError> {
    let recipient_value: u64 = recipients.iter().map(|(_, v)| v).sum();
    let candidates: Vec<Candidate> = available.iter().map(|c| Candidate { coin: c.coin, value: c.value }).collect();

    let mut fee: u64 = 0;
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        if iterations > MAX_FEE_ITERATIONS {
            return Err(WalletError::FeeNotConverged { iterations });
        }

        let target = recipient_value.saturating_add(fee);
        let selected = select_coins(&candidates, target, rng).ok_or_else(|| {
            let have: u64 = available.iter().map(|c| c.value).sum();
            WalletError::InsufficientFunds { have, need: target }
        })?;

        let inputs_total: u64 = selected.iter().map(|c| c.value).sum();
        let mut change = inputs_total.saturating_sub(target);
        let mut this_fee = fee;
        if this_fee < MIN_TX_FEE && change > 0 && change < CENT {
            let move_to_fee = (MIN_TX_FEE - this_fee).min(change);
            this_fee += move_to_fee;
            change -= move_to_fee;
        }

        let mut outputs: Vec<TxOutput> = recipients.iter().map(|(h, v)| TxOutput { value: *v, pubkey_hash: *h }).collect();
        let mut reserved_change_key = None;
        if change > 0 {
            let (index, change_pubkey) = keypool.reserve_key()?;
            let pos = rng.gen_range_u64(0, (outputs.len() + 1) as u64) as usize;
            outputs.insert(pos, TxOutput { value: change, pubkey_hash: hash160(&change_pubkey.to_bytes()) });
            reserved_change_key = Some(index);
        }

        let inputs: Vec<TxInput> = selected
            .iter()
            .map(|c| TxInput {
                previous_output: c.coin,
                signature: Vec::new(),
                public_key: Vec::new(),
                sequence: u32::MAX,
            })
            .collect();

        let mut tx = Transaction { version: 1, inputs, outputs, lock_time: 0 };

        for (i, candidate) in selected.iter().enumerate() {
            let spendable = available
                .iter()
                .find(|c| c.coin == candidate.coin)
                .expect("selected coin came from `available`");
            let keypair = keystore.get_key(&spendable.pubkey)?;
            let message = sighash(&tx);
            let signature = keypair.sign(message.as_bytes());
            tx.inputs[i].signature = signature.to_vec();
            tx.inputs[i].public_key = spendable.pubkey.to_bytes().to_vec();
        }

        let size = tx.estimated_size();
        if size >= MAX_STANDARD_TX_SIZE {
            if let Some(index) = reserved_change_key {
                let _ = keypool.return_key(index);
            }
            return Err(WalletError::TxTooLarge { size, max: MAX_STANDARD_TX_SIZE });
        }

        let priority = compute_priority(&selected, available, size);
        let pay_fee = MIN_TX_FEE.saturating_mul(1 + (size as u64) / 1000);
        let min_fee = min_fee_for(size, allow_free(priority));
        let required_fee = pay_fee.max(min_fee);

        if this_fee < required_fee {
            if let Some(index) = reserved_change_key {
                let _ = keypool.return_key(index);
            }
            fee = required_fee;
            continue;
        }

        let mut wtx = WalletTx::new(tx, 0);
        wtx.from_me = true;
        return Ok(BuiltTransaction { wtx, fee_paid: this_fee, reserved_change_key });
    }
}

/// Message an input's signature covers: the transaction with every
/// input's signature/public key blanked out, so signing one input
/// doesn't depend on another input's signature already being present.
fn sighash(tx: &Transaction) -> Hash256 {
    let mut blanked = tx.clone();
    for input in &mut blanked.inputs {
        input.signature.clear();
        input.public_key.clear();
    }
    blanked.txid()
}

fn compute_priority(selected: &[Candidate], available: &[SpendableCoin], size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    let weighted: u64 = selected
        .iter()
        .filter_map(|c| available.iter().find(|a| a.coin == c.coin))
        .map(|a| a.value.saturating_mul(a.depth.max(0) as u64))
        .sum();
    weighted as f64 / size as f64
}

fn allow_free(priority: f64) -> bool {
    priority > ALLOW_FREE_PRIORITY_THRESHOLD
}

fn min_fee_for(size: usize, allow_free: bool) -> u64 {
    if allow_free && size < 1000 {
        return 0;
    }
    let size_kb = ((size + 999) / 1000).max(1) as u64;
    MIN_TX_FEE.saturating_mul(size_kb)
}

/// `CommitTransaction`: keep the reserved change key (if any), merge the
/// built transaction into the index, and mark its inputs' coins spent.
/// Returns the new transaction's hash to hand the broadcast callback,
/// plus every previously-indexed transaction whose spent bitmap changed
/// as a result — the caller must persist those too, or a reload forgets
/// which of their outputs this transaction just spent.
pub fn commit_transaction(
    built: &BuiltTransaction,
    keypool: &mut KeyPool,
    index: &mut crate::tx_index::TxIndex,
) -> Result<(Hash256, Vec<Hash256>), WalletError> {
    if let Some(key_index) = built.reserved_change_key {
        keypool.keep_key(key_index)?;
    }
    let merged = index.add_to_wallet(built.wtx.clone());
    let hash = merged.txid();
    index.wallet_update_spent(&built.wtx.tx);

    let mut updated_prev = Vec::new();
    for input in &built.wtx.tx.inputs {
        let prev_hash = input.previous_output.txid;
        if index.contains(&prev_hash) && !updated_prev.contains(&prev_hash) {
            updated_prev.push(prev_hash);
        }
    }
    Ok((hash, updated_prev))
}

/// `ResendWalletTransactions`: our own unconfirmed transactions older
/// than five minutes, oldest first, rate-limited by a random 0-30
/// minute delay since the last attempt and gated on the chain having
/// made progress since then.
pub fn resend_wallet_transactions(
    index: &crate::tx_index::TxIndex,
    now: i64,
    last_attempt: i64,
    last_best_received_time: i64,
    best_received_time: i64,
    rng: &mut dyn WalletRng,
) -> Vec<Hash256> {
    const MIN_AGE_SECS: i64 = 5 * 60;
    const MAX_DELAY_SECS: i64 = 30 * 60;

    if best_received_time <= last_best_received_time {
        return Vec::new();
    }
    let delay = rng.gen_range_u64(0, MAX_DELAY_SECS as u64) as i64;
    if now < last_attempt + delay {
        return Vec::new();
    }

    let mut candidates: Vec<(&Hash256, &WalletTx)> = index
        .iter()
        .filter(|(_, wtx)| wtx.from_me && wtx.block_hash.is_zero() && now - wtx.time_received >= MIN_AGE_SECS)
        .collect();
    candidates.sort_by_key(|(_, wtx)| wtx.time_received);
    candidates.into_iter().map(|(hash, _)| *hash).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::OsBackedRng;
    use libcoin_core::crypto::KeyPair;

    fn make_coin(keystore: &mut CryptoKeyStore, value: u64, depth: i32) -> SpendableCoin {
        let kp = KeyPair::generate();
        let pubkey = kp.public_key();
        keystore.add_key(kp).unwrap();
        SpendableCoin {
            coin: OutPoint { txid: Hash256::double_sha256(&pubkey.to_bytes()), index: 0 },
            value,
            pubkey,
            from_me: false,
            depth,
            is_coinbase: false,
            blocks_to_maturity: 0,
        }
    }

    #[test]
    fn builds_a_valid_signed_transaction() {
        let mut keystore = CryptoKeyStore::new();
        let coin = make_coin(&mut keystore, 50 * libcoin_core::constants::COIN, 6);
        let mut keypool = KeyPool::new(2);
        keypool.top_up();
        let mut rng = OsBackedRng::seeded(42);

        let recipient_hash = [9u8; 20];
        let built = create_transaction(&[(recipient_hash, libcoin_core::constants::COIN)], &[coin], &keystore, &mut keypool, &mut rng).unwrap();

        assert_eq!(built.wtx.tx.inputs.len(), 1);
        assert!(built.wtx.tx.outputs.iter().any(|o| o.pubkey_hash == recipient_hash && o.value == libcoin_core::constants::COIN));
        assert!(built.fee_paid > 0);

        for input in &built.wtx.tx.inputs {
            let pubkey_bytes: [u8; 32] = input.public_key.as_slice().try_into().unwrap();
            let pubkey = PublicKey::from_bytes(&pubkey_bytes).unwrap();
            let mut unsigned = built.wtx.tx.clone();
            for i in &mut unsigned.inputs {
                i.signature.clear();
                i.public_key.clear();
            }
            let sig: [u8; 64] = input.signature.as_slice().try_into().unwrap();
            assert!(pubkey.verify(unsigned.txid().as_bytes(), &sig).is_ok());
        }
    }

    #[test]
    fn insufficient_funds_errors() {
        let mut keystore = CryptoKeyStore::new();
        let coin = make_coin(&mut keystore, 100, 6);
        let mut keypool = KeyPool::new(2);
        keypool.top_up();
        let mut rng = OsBackedRng::seeded(1);

        let result = create_transaction(&[([1; 20], 1_000_000)], &[coin], &keystore, &mut keypool, &mut rng);
        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
    }

    #[test]
    fn change_output_created_when_input_exceeds_recipient_value() {
        let mut keystore = CryptoKeyStore::new();
        let coin = make_coin(&mut keystore, 10 * libcoin_core::constants::COIN, 6);
        let mut keypool = KeyPool::new(2);
        keypool.top_up();
        let mut rng = OsBackedRng::seeded(5);

        let built = create_transaction(&[([2; 20], libcoin_core::constants::COIN)], &[coin], &keystore, &mut keypool, &mut rng).unwrap();
        assert_eq!(built.wtx.tx.outputs.len(), 2);
        assert!(built.reserved_change_key.is_some());
    }

    #[test]
    fn commit_transaction_keeps_change_key_and_marks_spent() {
        let mut keystore = CryptoKeyStore::new();
        let coin = make_coin(&mut keystore, 10 * libcoin_core::constants::COIN, 6);
        let mut keypool = KeyPool::new(2);
        keypool.top_up();
        let mut rng = OsBackedRng::seeded(9);

        let built = create_transaction(&[([3; 20], libcoin_core::constants::COIN)], &[coin], &keystore, &mut keypool, &mut rng).unwrap();
        let change_index = built.reserved_change_key.unwrap();

        let mut index = crate::tx_index::TxIndex::new();
        let (_hash, updated_prev) = commit_transaction(&built, &mut keypool, &mut index).unwrap();
        assert!(keypool.reserved_keypair(change_index).is_none());
        assert!(updated_prev.is_empty());
    }

    #[test]
    fn commit_transaction_reports_prev_tx_that_became_spent() {
        let mut keystore = CryptoKeyStore::new();
        let kp = KeyPair::generate();
        let pubkey = kp.public_key();
        keystore.add_key(kp).unwrap();

        let funding_tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOutput { value: 10 * libcoin_core::constants::COIN, pubkey_hash: hash160(&pubkey.to_bytes()) }],
            lock_time: 0,
        };
        let funding_hash = funding_tx.txid();
        let coin = SpendableCoin {
            coin: OutPoint { txid: funding_hash, index: 0 },
            value: 10 * libcoin_core::constants::COIN,
            pubkey,
            from_me: true,
            depth: 6,
            is_coinbase: false,
            blocks_to_maturity: 0,
        };

        let mut keypool = KeyPool::new(2);
        keypool.top_up();
        let mut rng = OsBackedRng::seeded(13);
        let built = create_transaction(&[([4; 20], libcoin_core::constants::COIN)], &[coin], &keystore, &mut keypool, &mut rng).unwrap();

        let mut index = crate::tx_index::TxIndex::new();
        index.add_to_wallet(WalletTx::new(funding_tx, 0));

        let (_hash, updated_prev) = commit_transaction(&built, &mut keypool, &mut index).unwrap();
        assert_eq!(updated_prev, vec![funding_hash]);
        assert!(index.get(&funding_hash).unwrap().spent[0]);
    }

    #[test]
    fn resend_skips_when_chain_has_not_advanced() {
        let index = crate::tx_index::TxIndex::new();
        let mut rng = OsBackedRng::seeded(2);
        let result = resend_wallet_transactions(&index, 1000, 0, 500, 500, &mut rng);
        assert!(result.is_empty());
    }
}
