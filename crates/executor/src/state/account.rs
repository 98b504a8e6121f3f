//! The account types: the public, decoded [`Account`] and the RLP wire format stored in the
//! accounts trie.

use alloy_primitives::{keccak256, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// `keccak256(rlp(""))`, the code hash of an account with no code.
pub const KECCAK_EMPTY: B256 = B256::new([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// An Ethereum account as represented in the accounts trie: nonce, balance, and pointers to the
/// account's storage trie and code, rather than the code/storage themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable)]
pub(crate) struct TrieAccount {
    pub(crate) nonce: u64,
    pub(crate) balance: U256,
    pub(crate) storage_root: B256,
    pub(crate) code_hash: B256,
}

/// A decoded, convenient view of an account: nonce, balance, and its code (not merely the code
/// hash). Storage lives outside the account, keyed by `(Address, slot)` in the journaled state.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Account {
    /// Number of transactions sent from this account (or, for contracts, number of contracts
    /// created).
    pub nonce: u64,
    /// Account balance in wei.
    pub balance: U256,
    /// The account's code. Empty for externally-owned accounts and not-yet-deployed contracts.
    pub code: Bytes,
}

impl Account {
    /// An account is empty iff it has zero nonce, zero balance, and no code (EIP-161).
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }

    /// Whether the account has deployed code or a nonzero nonce (used to detect `CREATE`
    /// collisions).
    pub fn has_code_or_nonce(&self) -> bool {
        !self.code.is_empty() || self.nonce != 0
    }

    /// The account's code hash, or [`KECCAK_EMPTY`] if it has no code.
    pub fn code_hash(&self) -> B256 {
        if self.code.is_empty() {
            KECCAK_EMPTY
        } else {
            keccak256(&self.code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_hash_matches_keccak_empty_string() {
        assert_eq!(keccak256([]), KECCAK_EMPTY);
    }

    #[test]
    fn default_account_is_empty() {
        assert!(Account::default().is_empty());
    }

    #[test]
    fn account_with_nonzero_nonce_is_not_empty() {
        let account = Account { nonce: 1, ..Default::default() };
        assert!(!account.is_empty());
        assert!(account.has_code_or_nonce());
    }
}
