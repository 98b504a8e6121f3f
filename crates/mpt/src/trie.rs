//! The public [`Trie`] handle: a secured or unsecured Merkle-Patricia Trie over arbitrary
//! byte-string keys and values.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::EMPTY_STRING_CODE;

use crate::nibbles::bytes_to_nibbles;
use crate::node::TrieNode;

/// A Merkle-Patricia Trie mapping byte-string keys to byte-string values.
///
/// If `secured` is set, every key is hashed with `keccak256` before being inserted into the
/// radix tree (this is how the account and storage tries are committed — see
/// [the spec, §4.2](../../../SPEC_FULL.md)); `get`/`set` still take the *unhashed* key.
///
/// Cloning a [`Trie`] is O(1): the root [`TrieNode`] shares all of its descendants with the
/// clone via `Rc`, so [`Trie::copy`] is cheap enough to call on every journal snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trie {
    secured: bool,
    root: TrieNode,
}

impl Trie {
    /// Constructs a new, empty trie.
    pub const fn new(secured: bool) -> Self {
        Self { secured, root: TrieNode::Empty }
    }

    /// Whether this trie hashes keys before insertion.
    pub const fn is_secured(&self) -> bool {
        self.secured
    }

    /// Looks up `key`, returning `None` if absent.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.root.get(&self.path_for(key))
    }

    /// Binds `key` to `value`. Setting a key to an empty value removes it, matching the
    /// reference spec's "default-valued entries are absent" convention.
    pub fn set(&mut self, key: &[u8], value: Bytes) {
        let path = self.path_for(key);
        if value.is_empty() {
            self.root = self.root.remove(&path).unwrap_or(TrieNode::Empty);
        } else {
            self.root = self.root.insert(&path, value);
        }
    }

    /// Computes the root commitment of this trie: the keccak256 hash of the RLP-encoded root
    /// node, or the keccak256 hash of the empty RLP string for an empty trie.
    pub fn root(&self) -> B256 {
        match &self.root {
            TrieNode::Empty => keccak256([EMPTY_STRING_CODE]),
            node => node.root_hash(),
        }
    }

    /// Returns an O(1) persistent snapshot of this trie, safe to mutate independently of `self`.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn path_for(&self, key: &[u8]) -> Vec<u8> {
        if self.secured {
            bytes_to_nibbles(keccak256(key).as_slice())
        } else {
            bytes_to_nibbles(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_root_is_keccak_of_empty_rlp_string() {
        let trie = Trie::new(false);
        assert_eq!(trie.root(), keccak256([0x80]));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut trie = Trie::new(true);
        trie.set(b"hello", Bytes::from_static(b"world"));
        assert_eq!(trie.get(b"hello"), Some(Bytes::from_static(b"world")));
        assert_eq!(trie.get(b"missing"), None);
    }

    #[test]
    fn overwrite_and_remove() {
        let mut trie = Trie::new(false);
        trie.set(b"key", Bytes::from_static(b"v1"));
        trie.set(b"key", Bytes::from_static(b"v2"));
        assert_eq!(trie.get(b"key"), Some(Bytes::from_static(b"v2")));

        trie.set(b"key", Bytes::new());
        assert_eq!(trie.get(b"key"), None);
        assert_eq!(trie.root(), keccak256([0x80]));
    }

    #[test]
    fn copy_is_independent() {
        let mut trie = Trie::new(false);
        trie.set(b"a", Bytes::from_static(b"1"));
        let snapshot = trie.copy();
        trie.set(b"b", Bytes::from_static(b"2"));
        assert_eq!(snapshot.get(b"b"), None);
        assert_eq!(trie.get(b"b"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn many_keys_is_order_independent() {
        let keys: &[&[u8]] = &[b"dog", b"doge", b"horse", b"cat", b"cats"];
        let mut forward = Trie::new(true);
        for (i, k) in keys.iter().enumerate() {
            forward.set(k, Bytes::from(vec![i as u8]));
        }
        let mut backward = Trie::new(true);
        for (i, k) in keys.iter().enumerate().rev() {
            backward.set(k, Bytes::from(vec![i as u8]));
        }
        assert_eq!(forward.root(), backward.root());
    }
}
