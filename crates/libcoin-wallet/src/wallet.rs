//! Composition root: `Wallet` ties every component in this crate
//! together behind one reentrant lock (`cs_wallet`), mirroring the
//! single critical-section design of the client this engine's wire
//! formats and coin selection are modeled on. A caller holding a
//! `&Wallet` can freely call back into other `Wallet` methods from
//! within, say, a `SyncListener` callback without deadlocking, since
//! the lock is reentrant — but every method still releases it before
//! invoking anything outside this crate (a tx-accept callback, chain
//! I/O), so this crate never holds `cs_wallet` across a call the
//! caller doesn't control.

use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::ReentrantMutex;

use libcoin_core::address::{Address, Network};
use libcoin_core::crypto::PublicKey;
use libcoin_core::traits::ChainFacade;
use libcoin_core::types::{Hash256, Transaction};

use crate::coin_selector::{self, CONFIRM_TIERS};
use crate::confirm;
use crate::crypto_keystore::CryptoKeyStore;
use crate::error::WalletError;
use crate::keypool::{KeyPool, DEFAULT_KEYPOOL_TARGET};
use crate::rng::WalletRng;
use crate::tx_builder::{self, BuiltTransaction, SpendableCoin};
use crate::tx_index::TxIndex;
use crate::walletdb::{AddressBook, LoadWalletResult, Settings, WalletDb, CURRENT_WALLET_VERSION};

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

/// Everything `Wallet` holds behind `cs_wallet`. Kept as one struct, not
/// scattered fields, so a single lock covers all of it.
pub struct WalletState {
    pub keystore: CryptoKeyStore,
    pub keypool: KeyPool,
    pub index: TxIndex,
    pub best_block: Option<libcoin_core::types::BlockLocator>,
    pub default_key: Option<PublicKey>,
    pub address_labels: AddressBook,
    pub settings: Settings,
}

/// Spendable/pending totals, in base units (see [`libcoin_core::constants::COIN`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletBalance {
    pub confirmed: u64,
    pub unconfirmed: u64,
}

/// A full-node wallet: key custody, address issuance, coin selection,
/// and transaction building over a durable `WalletDb`, all guarded by
/// one reentrant critical section.
pub struct Wallet {
    cs_wallet: ReentrantMutex<RefCell<WalletState>>,
    db: WalletDb,
    network: Network,
}

impl Wallet {
    /// Create a brand-new wallet: empty keystore, a freshly topped-up
    /// keypool, and the current version record written to `db`.
    pub fn create(db: WalletDb, network: Network) -> Result<Self, WalletError> {
        let wallet = Self {
            cs_wallet: ReentrantMutex::new(RefCell::new(WalletState {
                keystore: CryptoKeyStore::new(),
                keypool: KeyPool::new(DEFAULT_KEYPOOL_TARGET),
                index: TxIndex::new(),
                best_block: None,
                default_key: None,
                address_labels: AddressBook::new(),
                settings: Settings::new(),
            })),
            db,
            network,
        };
        wallet.top_up_keypool()?;
        wallet.db.write_version(CURRENT_WALLET_VERSION)?;
        Ok(wallet)
    }

    /// Reload a wallet from `db`. The keypool's unused slots are not
    /// recovered from disk (a "pool" record only carries the reserved
    /// public key, not the keypair behind it) — instead a fresh pool is
    /// topped up, which costs nothing beyond some churned key material,
    /// since every key that was ever actually handed out via
    /// `get_new_address` is already durable as a "key"/"ckey" record and
    /// comes back via `keystore`.
    pub fn load(db: WalletDb, network: Network) -> Result<(Self, LoadWalletResult), WalletError> {
        let mut keystore = CryptoKeyStore::new();
        let mut discard_pool = KeyPool::new(DEFAULT_KEYPOOL_TARGET);
        let mut index = TxIndex::new();
        let (result, extras) = db.load_wallet(&mut keystore, &mut discard_pool, &mut index)?;

        if let LoadWalletResult::Corrupt(detail) = &result {
            return Err(WalletError::DbCorrupt(detail.clone()));
        }

        let wallet = Self {
            cs_wallet: ReentrantMutex::new(RefCell::new(WalletState {
                keystore,
                keypool: KeyPool::new(DEFAULT_KEYPOOL_TARGET),
                index,
                best_block: extras.best_block,
                default_key: extras.default_key,
                address_labels: extras.address_labels,
                settings: extras.settings,
            })),
            db,
            network,
        };

        wallet.top_up_keypool()?;
        if result == LoadWalletResult::NeedsFirstRun {
            wallet.db.write_version(CURRENT_WALLET_VERSION)?;
        }
        Ok((wallet, result))
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// `TopUpKeyPool`: generate keys until the pool is back at its
    /// target size, registering and persisting each new key alongside
    /// its pool slot so a crash between the two never loses track of a
    /// key the pool claims to hold.
    pub fn top_up_keypool(&self) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        let mut state = guard.borrow_mut();
        state.keypool.top_up();

        let entries: Vec<(u64, libcoin_core::crypto::KeyPair)> =
            state.keypool.iter_pool().map(|(i, kp)| (i, kp.clone())).collect();

        for (index, keypair) in entries {
            let pubkey = keypair.public_key();
            if !state.keystore.have_key(&pubkey) {
                match state.keystore.add_key_for_keypool(keypair)? {
                    Some(ciphertext) => self.db.write_crypted_key(&pubkey, &ciphertext)?,
                    None => self.db.write_plain_key(&state.keystore.get_key(&pubkey)?)?,
                }
            }
            self.db.write_pool_entry(index, now(), &pubkey)?;
        }
        Ok(())
    }

    /// `GetNewAddress`: reserve and keep the next pool key, label it if
    /// asked, and promote it to the default key if this is the wallet's
    /// first address.
    pub fn get_new_address(&self, label: Option<&str>) -> Result<Address, WalletError> {
        let guard = self.cs_wallet.lock();
        let (index, pubkey) = {
            let mut state = guard.borrow_mut();
            let (index, pubkey) = state.keypool.reserve_key()?;
            state.keypool.keep_key(index)?;
            (index, pubkey)
        };
        self.db.erase_pool_entry(index)?;

        let address = Address::from_public_key(self.network, &pubkey);
        let mut set_default = false;
        {
            let mut state = guard.borrow_mut();
            if let Some(label) = label {
                state.address_labels.insert(address.to_string(), label.to_string());
            }
            if state.default_key.is_none() {
                state.default_key = Some(pubkey);
                set_default = true;
            }
        }
        if let Some(label) = label {
            self.db.write_name(&address.to_string(), label)?;
        }
        if set_default {
            self.db.write_default_key(&pubkey)?;
        }
        drop(guard);
        self.top_up_keypool()?;
        Ok(address)
    }

    /// `AddToWalletIfInvolvingMe`: the chain-driven counterpart to
    /// `get_new_address` — merges an observed transaction into the index,
    /// persists it, and, per the wallet update rule's final step,
    /// rotates `defaultKey` to a fresh keypool key if any output just
    /// paid the one currently in use.
    pub fn receive_transaction(
        &self,
        tx: Transaction,
        block: Option<(Hash256, i32, Vec<Hash256>)>,
        time_received: i64,
    ) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        let rotated;

        {
            let mut state = guard.borrow_mut();
            let hash = {
                let WalletState { index, keystore, .. } = &mut *state;
                let Some(wtx) = index.add_to_wallet_if_involving_me(tx, block, time_received, &*keystore) else {
                    return Ok(());
                };
                let hash = wtx.txid();
                self.db.write_tx(wtx)?;
                hash
            };
            rotated = self.rotate_default_key_if_paid(&mut state, hash)?;
        }

        drop(guard);
        if rotated {
            self.top_up_keypool()?;
        }
        Ok(())
    }

    /// Step 6 of the wallet update rule: if `hash`'s outputs pay the
    /// current `defaultKey` and the store is unlocked, promote a fresh
    /// keypool key to default so the paid-to key is never handed out
    /// again as a fresh receiving address.
    fn rotate_default_key_if_paid(&self, state: &mut WalletState, hash: Hash256) -> Result<bool, WalletError> {
        let Some(default_key) = state.default_key.clone() else { return Ok(false) };
        if state.keystore.is_locked() {
            return Ok(false);
        }

        let default_hash = libcoin_core::address::hash160(&default_key.to_bytes());
        let paid_to_default = state
            .index
            .get(&hash)
            .map(|wtx| wtx.tx.outputs.iter().any(|o| o.pubkey_hash == default_hash))
            .unwrap_or(false);
        if !paid_to_default {
            return Ok(false);
        }

        let (index, pubkey) = state.keypool.reserve_key()?;
        state.keypool.keep_key(index)?;
        self.db.erase_pool_entry(index)?;
        state.default_key = Some(pubkey);
        self.db.write_default_key(&pubkey)?;
        Ok(true)
    }

    pub fn set_label(&self, address: &Address, label: &str) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        guard.borrow_mut().address_labels.insert(address.to_string(), label.to_string());
        self.db.write_name(&address.to_string(), label)
    }

    pub fn label_of(&self, address: &Address) -> Option<String> {
        let guard = self.cs_wallet.lock();
        guard.borrow().address_labels.get(&address.to_string()).cloned()
    }

    pub fn set_setting(&self, name: &str, value: &[u8]) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        guard.borrow_mut().settings.insert(name.to_string(), value.to_vec());
        self.db.write_setting(name, value)
    }

    pub fn setting(&self, name: &str) -> Option<Vec<u8>> {
        let guard = self.cs_wallet.lock();
        guard.borrow().settings.get(name).cloned()
    }

    /// `EncryptWallet`: seal every key under a freshly derived master
    /// key. The wallet is left locked; callers must `unlock` afterward.
    pub fn encrypt_wallet(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        let mut state = guard.borrow_mut();
        if state.keystore.is_crypted() {
            return Err(WalletError::Locked);
        }
        self.db.encrypt_wallet(&mut state.keystore, passphrase)
    }

    pub fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        let guard = self.cs_wallet.lock();
        guard.borrow_mut().keystore.unlock(passphrase)
    }

    pub fn lock(&self) {
        let guard = self.cs_wallet.lock();
        guard.borrow_mut().keystore.lock();
    }

    pub fn is_crypted(&self) -> bool {
        let guard = self.cs_wallet.lock();
        guard.borrow().keystore.is_crypted()
    }

    pub fn is_locked(&self) -> bool {
        let guard = self.cs_wallet.lock();
        guard.borrow().keystore.is_locked()
    }

    /// Every coin this wallet could spend, given `chain`'s view of
    /// confirmation depth and maturity — the glue between `TxIndex` and
    /// `CoinSelector`/`TxBuilder`, which both reason about coins in the
    /// abstract.
    pub fn spendable_coins(&self, chain: &dyn ChainFacade) -> Vec<SpendableCoin> {
        let guard = self.cs_wallet.lock();
        let state = guard.borrow();
        let mut coins = Vec::new();

        for (_, wtx) in state.index.iter() {
            if !confirm::is_confirmed(wtx, chain) {
                continue;
            }
            let is_coinbase = wtx.tx.is_coinbase();
            let blocks_to_maturity = chain.blocks_to_maturity(&wtx.tx);
            if is_coinbase && blocks_to_maturity > 0 {
                continue;
            }
            let depth = crate::tx_index::depth_of(chain, wtx);

            for (i, output) in wtx.tx.outputs.iter().enumerate() {
                if wtx.spent[i] {
                    continue;
                }
                let Some(pubkey) = state.keystore.find_by_hash(&output.pubkey_hash) else { continue };
                coins.push(SpendableCoin {
                    coin: libcoin_core::types::OutPoint { txid: wtx.txid(), index: i as u32 },
                    value: output.value,
                    pubkey,
                    from_me: wtx.from_me,
                    depth,
                    is_coinbase,
                    blocks_to_maturity,
                });
            }
        }
        coins
    }

    /// `GetBalance`: confirmed and unconfirmed totals across every coin
    /// this wallet knows about (spent outputs excluded, regardless of
    /// confirmation tier).
    pub fn balance(&self, chain: &dyn ChainFacade) -> WalletBalance {
        let guard = self.cs_wallet.lock();
        let state = guard.borrow();
        let mut balance = WalletBalance::default();

        for (_, wtx) in state.index.iter() {
            let confirmed = confirm::is_confirmed(wtx, chain);
            for (i, output) in wtx.tx.outputs.iter().enumerate() {
                if wtx.spent[i] || !state.keystore.is_mine(&output.pubkey_hash) {
                    continue;
                }
                if confirmed {
                    balance.confirmed += output.value;
                } else {
                    balance.unconfirmed += output.value;
                }
            }
        }
        balance
    }

    /// `CreateTransaction`: build and sign a transaction paying
    /// `recipients`, selecting from whichever confirmation tier (see
    /// [`CONFIRM_TIERS`]) yields enough spendable coins.
    pub fn create_transaction(
        &self,
        recipients: &[(Address, u64)],
        chain: &dyn ChainFacade,
        rng: &mut dyn WalletRng,
    ) -> Result<BuiltTransaction, WalletError> {
        let recipient_hashes: Vec<([u8; 20], u64)> =
            recipients.iter().map(|(addr, value)| (*addr.pubkey_hash(), *value)).collect();

        let all_coins = self.spendable_coins(chain);
        let guard = self.cs_wallet.lock();
        let mut state = guard.borrow_mut();

        let mut last_err = None;
        for tiers in CONFIRM_TIERS {
            let infos: Vec<coin_selector::CoinInfo> = all_coins
                .iter()
                .map(|c| coin_selector::CoinInfo {
                    coin: c.coin,
                    value: c.value,
                    from_me: c.from_me,
                    depth: c.depth,
                    is_coinbase: c.is_coinbase,
                    blocks_to_maturity: c.blocks_to_maturity,
                })
                .collect();
            let eligible = coin_selector::eligible_candidates(&infos, tiers);
            let available: Vec<SpendableCoin> =
                all_coins.iter().filter(|c| eligible.iter().any(|e| e.coin == c.coin)).cloned().collect();

            match tx_builder::create_transaction(&recipient_hashes, &available, &state.keystore, &mut state.keypool, rng) {
                Ok(built) => return Ok(built),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(WalletError::InsufficientFunds { have: 0, need: 0 }))
    }

    /// `CommitTransaction`: keep the change key, merge into the index,
    /// persist, and hand the built transaction to `chain` for
    /// broadcast. The chain callback runs after `cs_wallet` is released,
    /// so it can safely call back into this wallet (e.g. from a
    /// `SyncListener`) without deadlocking.
    pub fn commit_transaction(&self, built: BuiltTransaction, chain: &dyn ChainFacade) -> Result<Hash256, WalletError> {
        let hash = {
            let guard = self.cs_wallet.lock();
            let mut state = guard.borrow_mut();
            let (hash, updated_prev) = tx_builder::commit_transaction(&built, &mut state.keypool, &mut state.index)?;
            self.db.write_tx(state.index.get(&hash).expect("just committed"))?;
            for prev_hash in updated_prev {
                let prev_wtx = state.index.get(&prev_hash).expect("reported as updated by commit_transaction");
                self.db.write_tx(prev_wtx)?;
            }
            hash
        };

        if !chain.accept_transaction(&built.wtx.tx) {
            return Err(WalletError::Rejected);
        }
        Ok(hash)
    }

    /// `SendMoney`: build, sign, commit, and broadcast in one call.
    pub fn send_money(
        &self,
        recipients: &[(Address, u64)],
        chain: &dyn ChainFacade,
        rng: &mut dyn WalletRng,
    ) -> Result<Hash256, WalletError> {
        let built = self.create_transaction(recipients, chain, rng)?;
        self.commit_transaction(built, chain)
    }

    pub fn checkpoint(&self) -> Result<(), WalletError> {
        self.db.checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcoin_core::crypto::KeyPair;
    use libcoin_core::types::{BlockLocator, OutPoint, Transaction, TxInput, TxOutput};
    use libcoin_store::{open, KvEnv, OpenMode};
    use std::collections::{HashMap, HashSet};

    fn memory_db() -> WalletDb {
        WalletDb::new(KvEnv::new(open(":memory:", OpenMode::Create).unwrap()))
    }

    struct FakeChain {
        depths: HashMap<Hash256, i32>,
        final_txids: HashSet<Hash256>,
    }

    impl FakeChain {
        fn new() -> Self {
            Self { depths: HashMap::new(), final_txids: HashSet::new() }
        }
        fn confirm(mut self, tx: &Transaction, depth: i32) -> Self {
            self.final_txids.insert(tx.txid());
            self.depths.insert(tx.txid(), depth);
            self
        }
    }

    impl ChainFacade for FakeChain {
        fn is_final(&self, tx: &Transaction) -> bool {
            self.final_txids.contains(&tx.txid())
        }
        fn depth(&self, hash: &Hash256) -> i32 {
            *self.depths.get(hash).unwrap_or(&0)
        }
        fn num_spent(&self, _hash: &Hash256) -> i32 {
            0
        }
        fn is_spent(&self, _coin: &OutPoint) -> bool {
            false
        }
        fn spent_in(&self, _coin: &OutPoint) -> Option<Hash256> {
            None
        }
        fn blocks_to_maturity(&self, _tx: &Transaction) -> i32 {
            0
        }
        fn best_received_time(&self) -> i64 {
            0
        }
        fn genesis_hash(&self) -> Hash256 {
            Hash256::ZERO
        }
        fn block_at(&self, _index: u64) -> Option<BlockLocator> {
            None
        }
        fn network_id(&self) -> u8 {
            0
        }
        fn accept_transaction(&self, _tx: &Transaction) -> bool {
            true
        }
    }

    fn funding_tx(pubkey_hash: [u8; 20], value: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput { previous_output: OutPoint::null(), signature: vec![], public_key: vec![], sequence: 0 }],
            outputs: vec![TxOutput { value, pubkey_hash }],
            lock_time: 0,
        }
    }

    #[test]
    fn create_then_get_new_address_yields_distinct_addresses() {
        let wallet = Wallet::create(memory_db(), Network::Testnet).unwrap();
        let a1 = wallet.get_new_address(Some("alice")).unwrap();
        let a2 = wallet.get_new_address(None).unwrap();
        assert_ne!(a1, a2);
        assert_eq!(wallet.label_of(&a1), Some("alice".to_string()));
    }

    #[test]
    fn fresh_wallet_needs_first_run_on_load() {
        let db = memory_db();
        let (_wallet, result) = Wallet::load(db, Network::Mainnet).unwrap();
        assert_eq!(result, LoadWalletResult::NeedsFirstRun);
    }

    #[test]
    fn balance_counts_confirmed_coin_paid_to_our_address() {
        let wallet = Wallet::create(memory_db(), Network::Mainnet).unwrap();
        let address = wallet.get_new_address(None).unwrap();
        let tx = funding_tx(*address.pubkey_hash(), 5_000);

        {
            let guard = wallet.cs_wallet.lock();
            let mut state = guard.borrow_mut();
            state.index.add_to_wallet(crate::tx_index::WalletTx::new(tx.clone(), 0));
        }

        let chain = FakeChain::new().confirm(&tx, 6);
        let balance = wallet.balance(&chain);
        assert_eq!(balance.confirmed, 5_000);
        assert_eq!(balance.unconfirmed, 0);
    }

    #[test]
    fn send_money_builds_commits_and_broadcasts() {
        let wallet = Wallet::create(memory_db(), Network::Mainnet).unwrap();
        let address = wallet.get_new_address(None).unwrap();
        let funding = funding_tx(*address.pubkey_hash(), 50 * libcoin_core::constants::COIN);
        {
            let guard = wallet.cs_wallet.lock();
            let mut state = guard.borrow_mut();
            state.index.add_to_wallet(crate::tx_index::WalletTx::new(funding.clone(), 0));
        }

        let chain = FakeChain::new().confirm(&funding, 6);
        let mut rng = crate::rng::OsBackedRng::seeded(11);
        let recipient = Address::from_public_key(Network::Mainnet, &KeyPair::generate().public_key());

        let hash = wallet.send_money(&[(recipient, libcoin_core::constants::COIN)], &chain, &mut rng).unwrap();
        let guard = wallet.cs_wallet.lock();
        assert!(guard.borrow().index.contains(&hash));
    }

    #[test]
    fn receive_transaction_rotates_default_key_when_paid() {
        let wallet = Wallet::create(memory_db(), Network::Mainnet).unwrap();
        let address = wallet.get_new_address(None).unwrap();
        let original_default = {
            let guard = wallet.cs_wallet.lock();
            guard.borrow().default_key.clone().unwrap()
        };

        let tx = funding_tx(*address.pubkey_hash(), 1_000);
        wallet.receive_transaction(tx, None, 0).unwrap();

        let new_default = {
            let guard = wallet.cs_wallet.lock();
            guard.borrow().default_key.clone().unwrap()
        };
        assert_ne!(original_default.to_bytes(), new_default.to_bytes());
    }

    #[test]
    fn receive_transaction_does_not_rotate_default_key_while_locked() {
        let wallet = Wallet::create(memory_db(), Network::Mainnet).unwrap();
        let address = wallet.get_new_address(None).unwrap();
        wallet.encrypt_wallet(b"hunter2").unwrap();
        assert!(wallet.is_locked());

        let original_default = {
            let guard = wallet.cs_wallet.lock();
            guard.borrow().default_key.clone().unwrap()
        };

        let tx = funding_tx(*address.pubkey_hash(), 1_000);
        wallet.receive_transaction(tx, None, 0).unwrap();

        let still_default = {
            let guard = wallet.cs_wallet.lock();
            guard.borrow().default_key.clone().unwrap()
        };
        assert_eq!(original_default.to_bytes(), still_default.to_bytes());
    }

    #[test]
    fn encrypt_then_reload_requires_unlock_to_recover_keys() {
        let env = KvEnv::new(open(":memory:", OpenMode::Create).unwrap());
        let wallet = Wallet::create(WalletDb::new(env.clone()), Network::Mainnet).unwrap();
        wallet.encrypt_wallet(b"hunter2").unwrap();
        wallet.unlock(b"hunter2").unwrap();
        let address = wallet.get_new_address(Some("alice")).unwrap();

        let (reloaded, result) = Wallet::load(WalletDb::new(env), Network::Mainnet).unwrap();
        assert_eq!(result, LoadWalletResult::Ok);
        assert!(reloaded.is_crypted());
        assert!(reloaded.is_locked());
        assert_eq!(reloaded.label_of(&address), Some("alice".to_string()));
        reloaded.unlock(b"hunter2").unwrap();
        assert!(!reloaded.is_locked());
    }
}
