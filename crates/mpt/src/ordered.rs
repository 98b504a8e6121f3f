//! Helper for computing the "ordered list" tries (transactions, receipts, withdrawals) that key
//! an unsecured trie by the RLP encoding of the item's index within the list.

use alloy_primitives::{Bytes, B256};
use alloy_rlp::Encodable;

use crate::Trie;

/// Computes the root of an unsecured trie whose keys are `rlp(index)` for `index` in
/// `0..items.len()` and whose values are produced by `encode`.
///
/// This is how `transactions_root`, `receipts_root`, and `withdrawals_root` are all computed:
/// each is an ordered-list trie over a different item type and encoder.
pub fn ordered_trie_root<T>(items: &[T], mut encode: impl FnMut(&T) -> Bytes) -> B256 {
    let mut trie = Trie::new(false);
    for (index, item) in items.iter().enumerate() {
        let mut key = Vec::new();
        (index as u64).encode(&mut key);
        trie.set(&key, encode(item));
    }
    trie.root()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_root_is_empty_trie_root() {
        let root = ordered_trie_root::<u8>(&[], |_| Bytes::new());
        assert_eq!(root, Trie::new(false).root());
    }
}
