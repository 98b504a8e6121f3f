//! The journaled world state (C4): a snapshot stack over a secured accounts trie and per-account
//! secured storage tries, supporting nested begin/commit/rollback and the bookkeeping
//! `SSTORE`/`SELFDESTRUCT`/EIP-161 cleanup need.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable};
use corevm_mpt::Trie;

use super::account::{Account, TrieAccount, KECCAK_EMPTY};
use crate::errors::StateError;

/// A point-in-time copy of the mutable parts of the world state. Cloning a [`Trie`] is O(1), so
/// taking a `Snapshot` is cheap enough to do on every nested call frame.
#[derive(Clone)]
struct Snapshot {
    account_trie: Trie,
    storage_tries: HashMap<Address, Trie>,
    code: HashMap<B256, Bytes>,
    created_accounts: HashSet<Address>,
    transient_storage: HashMap<(Address, B256), U256>,
}

/// The journaled, Merkle-Patricia-committed world state.
#[derive(Clone)]
pub struct JournaledState {
    account_trie: Trie,
    storage_tries: HashMap<Address, Trie>,
    code: HashMap<B256, Bytes>,
    created_accounts: HashSet<Address>,
    transient_storage: HashMap<(Address, B256), U256>,
    snapshots: Vec<Snapshot>,
    /// State at the start of the current transaction, used by `get_storage_original`.
    tx_baseline: Option<Snapshot>,
    /// Accounts touched (read or written) during the current transaction; used to apply EIP-161
    /// empty-account pruning after the transaction settles.
    touched_accounts: HashSet<Address>,
    /// Accounts that executed `SELFDESTRUCT` during the current transaction.
    accounts_to_delete: HashSet<Address>,
}

impl std::fmt::Debug for JournaledState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledState")
            .field("state_root", &self.account_trie.root())
            .field("open_snapshots", &self.snapshots.len())
            .finish()
    }
}

impl JournaledState {
    /// Constructs an empty world state.
    pub fn new() -> Self {
        Self {
            account_trie: Trie::new(true),
            storage_tries: HashMap::new(),
            code: HashMap::new(),
            created_accounts: HashSet::new(),
            transient_storage: HashMap::new(),
            snapshots: Vec::new(),
            tx_baseline: None,
            touched_accounts: HashSet::new(),
            accounts_to_delete: HashSet::new(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            account_trie: self.account_trie.copy(),
            storage_tries: self.storage_tries.clone(),
            code: self.code.clone(),
            created_accounts: self.created_accounts.clone(),
            transient_storage: self.transient_storage.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.account_trie = snapshot.account_trie;
        self.storage_tries = snapshot.storage_tries;
        self.code = snapshot.code;
        self.created_accounts = snapshot.created_accounts;
        self.transient_storage = snapshot.transient_storage;
    }

    /// Opens a new journal entry. Every frame that might revert begins one of these.
    pub fn begin(&mut self) {
        self.snapshots.push(self.snapshot());
    }

    /// Discards the most recently opened journal entry, keeping the current state.
    pub fn commit(&mut self) -> Result<(), StateError> {
        self.snapshots.pop().ok_or(StateError::JournalUnderflow)?;
        Ok(())
    }

    /// Restores the state to the most recently opened journal entry.
    pub fn rollback(&mut self) -> Result<(), StateError> {
        let snapshot = self.snapshots.pop().ok_or(StateError::JournalUnderflow)?;
        self.restore(snapshot);
        Ok(())
    }

    /// Marks the start of a transaction: captures the pre-transaction state as the baseline for
    /// `get_storage_original` and clears the per-transaction `transient_storage` map.
    pub fn begin_transaction(&mut self) {
        self.transient_storage.clear();
        self.tx_baseline = Some(self.snapshot());
        self.touched_accounts.clear();
        self.accounts_to_delete.clear();
    }

    /// Marks the end of a transaction: clears `created_accounts` and the baseline snapshot.
    pub fn end_transaction(&mut self) {
        self.created_accounts.clear();
        self.tx_baseline = None;
    }

    /// Accounts that executed `SELFDESTRUCT` during the current transaction, to be purged by the
    /// block pipeline once the transaction has committed.
    pub fn accounts_to_delete(&self) -> &HashSet<Address> {
        &self.accounts_to_delete
    }

    /// Accounts touched during the current transaction, for EIP-161 empty-account pruning.
    pub fn touched_accounts(&self) -> &HashSet<Address> {
        &self.touched_accounts
    }

    fn account_key(address: Address) -> [u8; 20] {
        address.into_array()
    }

    /// Reads an account, decoding it from the accounts trie.
    pub fn get_account(&self, address: Address) -> Option<Account> {
        let raw = self.account_trie.get(&Self::account_key(address))?;
        let trie_account = TrieAccount::decode(&mut raw.as_ref()).ok()?;
        let code = if trie_account.code_hash == KECCAK_EMPTY {
            Bytes::new()
        } else {
            self.code.get(&trie_account.code_hash).cloned().unwrap_or_default()
        };
        Some(Account { nonce: trie_account.nonce, balance: trie_account.balance, code })
    }

    /// Writes an account (and, if non-empty, its code) into the world state.
    pub fn set_account(&mut self, address: Address, account: &Account) {
        let code_hash = account.code_hash();
        if !account.code.is_empty() {
            self.code.entry(code_hash).or_insert_with(|| account.code.clone());
        }
        let storage_root = self
            .storage_tries
            .entry(address)
            .or_insert_with(|| Trie::new(true))
            .root();
        let trie_account =
            TrieAccount { nonce: account.nonce, balance: account.balance, storage_root, code_hash };
        let mut buf = Vec::with_capacity(trie_account.length());
        trie_account.encode(&mut buf);
        self.account_trie.set(&Self::account_key(address), buf.into());
        self.touched_accounts.insert(address);
    }

    /// Removes an account and its storage trie entirely.
    pub fn delete_account(&mut self, address: Address) {
        self.account_trie.set(&Self::account_key(address), Bytes::new());
        self.storage_tries.remove(&address);
    }

    /// Whether `address` is present in the accounts trie.
    pub fn account_exists(&self, address: Address) -> bool {
        self.get_account(address).is_some()
    }

    /// Whether `address` exists and is empty per EIP-161.
    pub fn account_exists_and_is_empty(&self, address: Address) -> bool {
        self.get_account(address).map(|a| a.is_empty()).unwrap_or(false)
    }

    /// `exists ∧ ¬empty`.
    pub fn is_account_alive(&self, address: Address) -> bool {
        self.get_account(address).map(|a| !a.is_empty()).unwrap_or(false)
    }

    /// Whether the account has deployed code or a nonzero nonce.
    pub fn account_has_code_or_nonce(&self, address: Address) -> bool {
        self.get_account(address).map(|a| a.has_code_or_nonce()).unwrap_or(false)
    }

    /// Whether the account's storage trie has any entries.
    pub fn account_has_storage(&self, address: Address) -> bool {
        self.storage_tries.get(&address).map(|t| t.root() != Trie::new(true).root()).unwrap_or(false)
    }

    /// Records that `address` was observed during the current transaction.
    pub fn touch_account(&mut self, address: Address) {
        self.touched_accounts.insert(address);
    }

    /// Moves `value` wei from `from` to `to`, materializing `to` if it did not already exist.
    /// Returns `false` if `from` has insufficient balance.
    pub fn move_ether(&mut self, from: Address, to: Address, value: U256) -> bool {
        if value.is_zero() {
            self.touch_account(to);
            return true;
        }
        let mut sender = self.get_account(from).unwrap_or_default();
        if sender.balance < value {
            return false;
        }
        sender.balance -= value;
        self.set_account(from, &sender);

        let mut recipient = self.get_account(to).unwrap_or_default();
        recipient.balance += value;
        self.set_account(to, &recipient);
        true
    }

    /// Installs `code` as `address`'s code, creating the account if it does not yet exist.
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let mut account = self.get_account(address).unwrap_or_default();
        account.code = code;
        self.set_account(address, &account);
    }

    /// Increments `address`'s nonce by one, creating the account if it does not yet exist.
    pub fn increment_nonce(&mut self, address: Address) {
        let mut account = self.get_account(address).unwrap_or_default();
        account.nonce += 1;
        self.set_account(address, &account);
    }

    /// Marks `address` for removal once the current transaction settles.
    pub fn destroy_account(&mut self, address: Address) {
        self.accounts_to_delete.insert(address);
    }

    /// Clears all storage entries for `address`.
    pub fn destroy_storage(&mut self, address: Address) {
        self.storage_tries.insert(address, Trie::new(true));
    }

    /// Records that `address` was materialized (by `CREATE`/`CREATE2`) during the current
    /// transaction.
    pub fn mark_account_created(&mut self, address: Address) {
        self.created_accounts.insert(address);
    }

    /// Whether `address` was created during the current transaction.
    pub fn is_account_created(&self, address: Address) -> bool {
        self.created_accounts.contains(&address)
    }

    /// Reads a storage slot, returning zero if absent.
    pub fn get_storage(&self, address: Address, key: B256) -> U256 {
        let Some(trie) = self.storage_tries.get(&address) else {
            return U256::ZERO;
        };
        match trie.get(key.as_slice()) {
            Some(raw) => U256::decode(&mut raw.as_ref()).unwrap_or_default(),
            None => U256::ZERO,
        }
    }

    /// Writes a storage slot. Setting to zero removes the slot from the trie.
    pub fn set_storage(&mut self, address: Address, key: B256, value: U256) {
        let trie = self.storage_tries.entry(address).or_insert_with(|| Trie::new(true));
        if value.is_zero() {
            trie.set(key.as_slice(), Bytes::new());
        } else {
            let mut buf = Vec::with_capacity(value.length());
            value.encode(&mut buf);
            trie.set(key.as_slice(), buf.into());
        }
        self.touched_accounts.insert(address);
        self.sync_storage_root(address);
    }

    /// Re-encodes `address`'s entry in the accounts trie with its current `storage_tries` root.
    /// The account RLP embeds `storage_root`, so every storage write must be reflected here or
    /// `state_root` goes stale relative to the account's actual storage.
    fn sync_storage_root(&mut self, address: Address) {
        let Some(raw) = self.account_trie.get(&Self::account_key(address)) else {
            return;
        };
        let Ok(mut trie_account) = TrieAccount::decode(&mut raw.as_ref()) else {
            return;
        };
        let storage_root =
            self.storage_tries.get(&address).map(|t| t.root()).unwrap_or_else(|| Trie::new(true).root());
        if trie_account.storage_root != storage_root {
            trie_account.storage_root = storage_root;
            let mut buf = Vec::with_capacity(trie_account.length());
            trie_account.encode(&mut buf);
            self.account_trie.set(&Self::account_key(address), buf.into());
        }
    }

    /// Reads a storage slot as it stood at the start of the current transaction, returning zero
    /// if `address` was created during this transaction (its prior value is meaningless).
    pub fn get_storage_original(&self, address: Address, key: B256) -> U256 {
        if self.created_accounts.contains(&address) {
            return U256::ZERO;
        }
        let Some(baseline) = &self.tx_baseline else {
            return self.get_storage(address, key);
        };
        let Some(trie) = baseline.storage_tries.get(&address) else {
            return U256::ZERO;
        };
        match trie.get(key.as_slice()) {
            Some(raw) => U256::decode(&mut raw.as_ref()).unwrap_or_default(),
            None => U256::ZERO,
        }
    }

    /// Reads a transient storage slot (EIP-1153), returning zero if absent.
    pub fn get_transient_storage(&self, address: Address, key: B256) -> U256 {
        self.transient_storage.get(&(address, key)).copied().unwrap_or_default()
    }

    /// Writes a transient storage slot (EIP-1153). Cleared at the end of every transaction.
    pub fn set_transient_storage(&mut self, address: Address, key: B256, value: U256) {
        self.transient_storage.insert((address, key), value);
    }

    /// The root hash of the accounts trie: the world state's commitment.
    pub fn state_root(&self) -> B256 {
        self.account_trie.root()
    }
}

impl Default for JournaledState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const ALICE: Address = address!("0000000000000000000000000000000000000a");
    const BOB: Address = address!("0000000000000000000000000000000000000b");

    #[test]
    fn fresh_account_does_not_exist() {
        let state = JournaledState::new();
        assert!(!state.account_exists(ALICE));
    }

    #[test]
    fn move_ether_debits_and_credits() {
        let mut state = JournaledState::new();
        state.set_account(ALICE, &Account { balance: U256::from(100u64), ..Default::default() });
        assert!(state.move_ether(ALICE, BOB, U256::from(40u64)));
        assert_eq!(state.get_account(ALICE).unwrap().balance, U256::from(60u64));
        assert_eq!(state.get_account(BOB).unwrap().balance, U256::from(40u64));
    }

    #[test]
    fn move_ether_rejects_insufficient_balance() {
        let mut state = JournaledState::new();
        state.set_account(ALICE, &Account { balance: U256::from(10u64), ..Default::default() });
        assert!(!state.move_ether(ALICE, BOB, U256::from(100u64)));
    }

    #[test]
    fn rollback_undoes_mutations() {
        let mut state = JournaledState::new();
        state.set_account(ALICE, &Account { balance: U256::from(5u64), ..Default::default() });
        state.begin();
        state.set_account(ALICE, &Account { balance: U256::from(500u64), ..Default::default() });
        state.rollback().unwrap();
        assert_eq!(state.get_account(ALICE).unwrap().balance, U256::from(5u64));
    }

    #[test]
    fn commit_keeps_mutations() {
        let mut state = JournaledState::new();
        state.begin();
        state.set_account(ALICE, &Account { balance: U256::from(9u64), ..Default::default() });
        state.commit().unwrap();
        assert_eq!(state.get_account(ALICE).unwrap().balance, U256::from(9u64));
    }

    #[test]
    fn storage_round_trips_and_removes_at_zero() {
        let mut state = JournaledState::new();
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        state.set_storage(ALICE, key, U256::from(42u64));
        assert_eq!(state.get_storage(ALICE, key), U256::from(42u64));
        state.set_storage(ALICE, key, U256::ZERO);
        assert_eq!(state.get_storage(ALICE, key), U256::ZERO);
    }

    #[test]
    fn get_storage_original_reads_transaction_start_value() {
        let mut state = JournaledState::new();
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        state.set_storage(ALICE, key, U256::from(1u64));
        state.begin_transaction();
        state.set_storage(ALICE, key, U256::from(2u64));
        assert_eq!(state.get_storage_original(ALICE, key), U256::from(1u64));
        assert_eq!(state.get_storage(ALICE, key), U256::from(2u64));
    }

    #[test]
    fn created_account_has_zero_original_storage() {
        let mut state = JournaledState::new();
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        state.begin_transaction();
        state.mark_account_created(ALICE);
        state.set_storage(ALICE, key, U256::from(7u64));
        assert_eq!(state.get_storage_original(ALICE, key), U256::ZERO);
    }

    #[test]
    fn storage_write_to_existing_account_updates_state_root() {
        let mut state = JournaledState::new();
        state.set_account(ALICE, &Account { balance: U256::from(1u64), ..Default::default() });
        let root_before = state.state_root();
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        state.set_storage(ALICE, key, U256::from(99u64));
        assert_ne!(state.state_root(), root_before);
    }

    #[test]
    fn transient_storage_is_not_the_persistent_trie() {
        let mut state = JournaledState::new();
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        state.set_transient_storage(ALICE, key, U256::from(3u64));
        assert_eq!(state.get_transient_storage(ALICE, key), U256::from(3u64));
        assert_eq!(state.get_storage(ALICE, key), U256::ZERO);
    }
}
