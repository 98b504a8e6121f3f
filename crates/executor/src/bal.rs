//! The Block Access List tracker and builder (C11, EIP-7928).
//!
//! Every storage/balance/nonce/code mutation observed during block execution is recorded against
//! the index of the transaction that caused it. [`BlockAccessListTracker::build`] then produces a
//! deterministic, address-sorted [`BlockAccessList`] suitable for RLP encoding into the block
//! body.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{BufMut, Encodable, Header};
use corevm_primitives::Address;

/// A single storage write, tagged with the transaction that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Index, within the block, of the transaction that wrote this value.
    pub tx_index: u32,
    /// The value written.
    pub new_value: U256,
}

/// Every write this block made to one storage slot, in transaction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChanges {
    /// The storage slot.
    pub slot: B256,
    /// Writes to `slot`, ordered by `tx_index`.
    pub changes: Vec<StorageChange>,
}

/// A balance change, tagged with the transaction that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    /// Index of the causing transaction.
    pub tx_index: u32,
    /// The account's balance immediately after this transaction.
    pub post_balance: U256,
}

/// A nonce change, tagged with the transaction that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceChange {
    /// Index of the causing transaction.
    pub tx_index: u32,
    /// The account's nonce immediately after this transaction.
    pub new_nonce: u64,
}

/// A code change, tagged with the transaction that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChange {
    /// Index of the causing transaction.
    pub tx_index: u32,
    /// The account's code immediately after this transaction.
    pub new_code: Bytes,
}

/// Everything this block changed (or read, for storage) about one account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountChanges {
    /// The account's address.
    pub address: Address,
    /// Per-slot write history, sorted by slot.
    pub storage_changes: Vec<SlotChanges>,
    /// Slots read but never written this block, sorted.
    pub storage_reads: Vec<B256>,
    /// Balance history, sorted by `tx_index`.
    pub balance_changes: Vec<BalanceChange>,
    /// Nonce history, sorted by `tx_index`.
    pub nonce_changes: Vec<NonceChange>,
    /// Code history, sorted by `tx_index`.
    pub code_changes: Vec<CodeChange>,
}

/// The complete, deterministically ordered Block Access List.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockAccessList {
    /// Per-account changes, sorted by address.
    pub account_changes: Vec<AccountChanges>,
}

impl BlockAccessList {
    /// RLP-encodes this access list, for hashing into the block header's `bal_hash` field.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.account_changes.encode(&mut out);
        out
    }

    /// `keccak256` of the RLP encoding, the header-committed digest.
    pub fn hash(&self) -> B256 {
        alloy_primitives::keccak256(self.encode())
    }
}

impl Encodable for StorageChange {
    fn length(&self) -> usize {
        self.tx_index.length() + self.new_value.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.tx_index.encode(out);
        self.new_value.encode(out);
    }
}

impl Encodable for SlotChanges {
    fn length(&self) -> usize {
        self.slot.length() + self.changes.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.slot.encode(out);
        self.changes.encode(out);
    }
}

impl Encodable for BalanceChange {
    fn length(&self) -> usize {
        self.tx_index.length() + self.post_balance.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.tx_index.encode(out);
        self.post_balance.encode(out);
    }
}

impl Encodable for NonceChange {
    fn length(&self) -> usize {
        self.tx_index.length() + self.new_nonce.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.tx_index.encode(out);
        self.new_nonce.encode(out);
    }
}

impl Encodable for CodeChange {
    fn length(&self) -> usize {
        self.tx_index.length() + self.new_code.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.tx_index.encode(out);
        self.new_code.encode(out);
    }
}

impl Encodable for AccountChanges {
    fn length(&self) -> usize {
        self.address.length()
            + self.storage_changes.length()
            + self.storage_reads.length()
            + self.balance_changes.length()
            + self.nonce_changes.length()
            + self.code_changes.length()
    }

    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.length();
        Header { list: true, payload_length }.encode(out);
        self.address.encode(out);
        self.storage_changes.encode(out);
        self.storage_reads.encode(out);
        self.balance_changes.encode(out);
        self.nonce_changes.encode(out);
        self.code_changes.encode(out);
    }
}

#[derive(Debug, Clone, Default)]
struct AccountAccesses {
    storage_changes: BTreeMap<B256, Vec<StorageChange>>,
    storage_reads: BTreeSet<B256>,
    balance_changes: Vec<BalanceChange>,
    nonce_changes: Vec<NonceChange>,
    code_changes: Vec<CodeChange>,
}

/// Accumulates per-account accesses during block execution and builds the final
/// [`BlockAccessList`] once the block has finished.
///
/// When `enabled` is false (any fork before Osaka), every recording method is a no-op: callers
/// don't need to branch on fork activation themselves.
#[derive(Debug, Default)]
pub struct BlockAccessListTracker {
    enabled: bool,
    tx_index: u32,
    accounts: BTreeMap<Address, AccountAccesses>,
}

impl BlockAccessListTracker {
    /// Constructs a tracker; pass `enabled = config.is_osaka_active(..)`.
    pub fn new(enabled: bool) -> Self {
        Self { enabled, tx_index: 0, accounts: BTreeMap::new() }
    }

    /// Sets the index of the transaction whose side effects are about to be recorded.
    pub fn set_tx_index(&mut self, index: u32) {
        self.tx_index = index;
    }

    fn account_mut(&mut self, address: Address) -> &mut AccountAccesses {
        self.accounts.entry(address).or_default()
    }

    /// Records a storage write.
    pub fn record_storage_write(&mut self, address: Address, slot: B256, new_value: U256) {
        if !self.enabled {
            return;
        }
        let tx_index = self.tx_index;
        self.account_mut(address)
            .storage_changes
            .entry(slot)
            .or_default()
            .push(StorageChange { tx_index, new_value });
    }

    /// Records a storage read. Dropped from the final list if the same slot was also written.
    pub fn record_storage_read(&mut self, address: Address, slot: B256) {
        if !self.enabled {
            return;
        }
        self.account_mut(address).storage_reads.insert(slot);
    }

    /// Records that `address`'s balance changed; `post_balance` is its value immediately after.
    pub fn record_balance_change(&mut self, address: Address, post_balance: U256) {
        if !self.enabled {
            return;
        }
        let tx_index = self.tx_index;
        self.account_mut(address).balance_changes.push(BalanceChange { tx_index, post_balance });
    }

    /// Records that `address` was touched (read but not necessarily mutated), e.g. by `BALANCE`
    /// or value transfer accounting. No-op beyond ensuring the account appears in the final list.
    pub fn record_balance_touch(&mut self, address: Address) {
        if !self.enabled {
            return;
        }
        self.account_mut(address);
    }

    /// Records that `address`'s nonce changed to `new_nonce`.
    pub fn record_nonce_change(&mut self, address: Address, new_nonce: u64) {
        if !self.enabled {
            return;
        }
        let tx_index = self.tx_index;
        self.account_mut(address).nonce_changes.push(NonceChange { tx_index, new_nonce });
    }

    /// Records a nonce bump without the post-increment value at hand (e.g. `CREATE`'s own nonce
    /// bump, recorded in its simpler `_touch` form since the caller computes the value itself).
    pub fn record_nonce_touch(&mut self, address: Address) {
        if !self.enabled {
            return;
        }
        self.account_mut(address);
    }

    /// Records that `address`'s code changed to `new_code`.
    pub fn record_code_change(&mut self, address: Address, new_code: Bytes) {
        if !self.enabled {
            return;
        }
        let tx_index = self.tx_index;
        self.account_mut(address).code_changes.push(CodeChange { tx_index, new_code });
    }

    /// Records a code deployment without threading the post-value logic through the interpreter's
    /// hot path; equivalent to [`Self::record_code_change`].
    pub fn record_code_touch(&mut self, address: Address, new_code: Bytes) {
        self.record_code_change(address, new_code);
    }

    /// Builds the final, deterministically ordered access list.
    pub fn build(self) -> BlockAccessList {
        let mut account_changes = Vec::with_capacity(self.accounts.len());
        for (address, access) in self.accounts {
            let mut storage_changes: Vec<SlotChanges> = access
                .storage_changes
                .iter()
                .map(|(slot, changes)| {
                    let mut changes = changes.clone();
                    changes.sort_by_key(|c| c.tx_index);
                    SlotChanges { slot: *slot, changes }
                })
                .collect();
            storage_changes.sort_by_key(|s| s.slot);

            let written: BTreeSet<B256> = access.storage_changes.keys().copied().collect();
            let storage_reads: Vec<B256> =
                access.storage_reads.into_iter().filter(|slot| !written.contains(slot)).collect();

            let mut balance_changes = access.balance_changes;
            balance_changes.sort_by_key(|c| c.tx_index);
            let mut nonce_changes = access.nonce_changes;
            nonce_changes.sort_by_key(|c| c.tx_index);
            let mut code_changes = access.code_changes;
            code_changes.sort_by_key(|c| c.tx_index);

            account_changes.push(AccountChanges {
                address,
                storage_changes,
                storage_reads,
                balance_changes,
                nonce_changes,
                code_changes,
            });
        }
        BlockAccessList { account_changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ALICE: Address = address!("0000000000000000000000000000000000000a");

    #[test]
    fn disabled_tracker_records_nothing() {
        let mut tracker = BlockAccessListTracker::new(false);
        tracker.record_balance_change(ALICE, U256::from(1u64));
        assert!(tracker.build().account_changes.is_empty());
    }

    #[test]
    fn storage_read_is_dropped_if_also_written() {
        let mut tracker = BlockAccessListTracker::new(true);
        let slot = B256::repeat_byte(1);
        tracker.record_storage_read(ALICE, slot);
        tracker.record_storage_write(ALICE, slot, U256::from(1u64));
        let built = tracker.build();
        let account = &built.account_changes[0];
        assert!(account.storage_reads.is_empty());
        assert_eq!(account.storage_changes.len(), 1);
    }

    #[test]
    fn account_changes_are_sorted_by_address() {
        let mut tracker = BlockAccessListTracker::new(true);
        let bob = address!("0000000000000000000000000000000000000b");
        tracker.record_balance_change(bob, U256::from(1u64));
        tracker.record_balance_change(ALICE, U256::from(1u64));
        let built = tracker.build();
        assert_eq!(built.account_changes[0].address, ALICE);
        assert_eq!(built.account_changes[1].address, bob);
    }

    #[test]
    fn storage_changes_preserve_tx_order() {
        let mut tracker = BlockAccessListTracker::new(true);
        let slot = B256::repeat_byte(2);
        tracker.set_tx_index(1);
        tracker.record_storage_write(ALICE, slot, U256::from(2u64));
        tracker.set_tx_index(0);
        tracker.record_storage_write(ALICE, slot, U256::from(1u64));
        let built = tracker.build();
        let changes = &built.account_changes[0].storage_changes[0].changes;
        assert_eq!(changes[0].tx_index, 0);
        assert_eq!(changes[1].tx_index, 1);
    }

    #[test]
    fn hash_is_stable_for_the_same_content() {
        let mut a = BlockAccessListTracker::new(true);
        a.record_balance_change(ALICE, U256::from(5u64));
        let mut b = BlockAccessListTracker::new(true);
        b.record_balance_change(ALICE, U256::from(5u64));
        assert_eq!(a.build().hash(), b.build().hash());
    }
}
