//! The [`TrieNode`] type: an in-memory, reference-counted representation of a Merkle-Patricia
//! Trie node, following the same branch/leaf/extension shape the teacher's `kona-mpt` crate uses
//! for proof-backed nodes, but read-write and persistent (path-copying) rather than proof-backed.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{BufMut, Encodable, Header, EMPTY_STRING_CODE};
use std::rc::Rc;

use crate::nibbles::{common_prefix_len, hex_prefix_encode};

/// Number of child slots in a branch node (one per nibble value).
const BRANCH_WIDTH: usize = 16;

/// A node within a Merkle-Patricia Trie.
///
/// Nodes are immutable once constructed; every mutating [`crate::Trie`] operation returns a new
/// root built by path-copying only the nodes on the path to the modified key; everything else is
/// shared via [`Rc`] with the previous version of the trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    /// The empty trie.
    Empty,
    /// A leaf node: the final segment of a key's nibble path, plus its value.
    Leaf {
        /// Remaining nibbles of the key, from this node to the leaf.
        path: Vec<u8>,
        /// The value stored at this key.
        value: Bytes,
    },
    /// An extension node: a shared nibble prefix pointing at a single child (always a branch).
    Extension {
        /// The shared nibble prefix.
        prefix: Vec<u8>,
        /// The child node the prefix points to.
        child: Rc<TrieNode>,
    },
    /// A branch node: up to 16 children (one per next nibble) plus an optional value for a key
    /// that terminates exactly at this node.
    Branch {
        /// The 16 child slots.
        children: [Option<Rc<TrieNode>>; BRANCH_WIDTH],
        /// The value for a key ending at this branch, if any.
        value: Option<Bytes>,
    },
}

/// A reference to a child node as it appears inside its parent's RLP encoding: embedded inline if
/// the child's own RLP encoding is under 32 bytes, otherwise referenced by its keccak256 hash.
enum NodeRef {
    Embedded(Vec<u8>),
    Hashed(B256),
}

impl TrieNode {
    /// Looks up `path` (a nibble sequence) within this subtree.
    pub fn get(&self, path: &[u8]) -> Option<Bytes> {
        match self {
            TrieNode::Empty => None,
            TrieNode::Leaf { path: key, value } => (key.as_slice() == path).then(|| value.clone()),
            TrieNode::Extension { prefix, child } => {
                path.strip_prefix(prefix.as_slice()).and_then(|rest| child.get(rest))
            }
            TrieNode::Branch { children, value } => match path.first() {
                None => value.clone(),
                Some(&nibble) => children[nibble as usize]
                    .as_ref()
                    .and_then(|child| child.get(&path[1..])),
            },
        }
    }

    /// Returns a new subtree with `path` bound to `value`.
    pub fn insert(&self, path: &[u8], value: Bytes) -> TrieNode {
        match self {
            TrieNode::Empty => TrieNode::Leaf { path: path.to_vec(), value },
            TrieNode::Leaf { path: key, value: existing } => {
                if key == path {
                    return TrieNode::Leaf { path: path.to_vec(), value };
                }
                let common = common_prefix_len(key, path);
                let mut children = Self::empty_branch();
                let mut branch_value = None;
                place_remainder(&mut children, &mut branch_value, &key[common..], existing.clone());
                place_remainder(&mut children, &mut branch_value, &path[common..], value);
                Self::wrap_with_prefix(&path[..common], TrieNode::Branch { children, value: branch_value })
            }
            TrieNode::Extension { prefix, child } => {
                if let Some(rest) = path.strip_prefix(prefix.as_slice()) {
                    let new_child = child.insert(rest, value);
                    return TrieNode::Extension { prefix: prefix.clone(), child: Rc::new(new_child) };
                }
                let common = common_prefix_len(prefix, path);
                let mut children = Self::empty_branch();
                let mut branch_value = None;
                if prefix.len() - common == 1 {
                    let nibble = prefix[common];
                    branch_set_child(&mut children, nibble, child.clone());
                } else {
                    let remaining_prefix = prefix[common + 1..].to_vec();
                    let nibble = prefix[common];
                    let node = if remaining_prefix.is_empty() {
                        (*child.as_ref()).clone()
                    } else {
                        TrieNode::Extension { prefix: remaining_prefix, child: child.clone() }
                    };
                    branch_set_child(&mut children, nibble, Rc::new(node));
                }
                place_remainder(&mut children, &mut branch_value, &path[common..], value);
                Self::wrap_with_prefix(&path[..common], TrieNode::Branch { children, value: branch_value })
            }
            TrieNode::Branch { children, value: branch_value } => {
                let mut children = children.clone();
                let mut branch_value = branch_value.clone();
                match path.first() {
                    None => branch_value = Some(value),
                    Some(&nibble) => {
                        let updated = match &children[nibble as usize] {
                            Some(child) => child.insert(&path[1..], value),
                            None => TrieNode::Leaf { path: path[1..].to_vec(), value },
                        };
                        children[nibble as usize] = Some(Rc::new(updated));
                    }
                }
                TrieNode::Branch { children, value: branch_value }
            }
        }
    }

    /// Returns a new subtree with `path` removed, or `None` if the resulting subtree is empty.
    pub fn remove(&self, path: &[u8]) -> Option<TrieNode> {
        match self {
            TrieNode::Empty => None,
            TrieNode::Leaf { path: key, .. } => (key != path).then(|| self.clone()),
            TrieNode::Extension { prefix, child } => {
                let rest = path.strip_prefix(prefix.as_slice())?;
                match child.remove(rest)? {
                    new_child @ TrieNode::Branch { .. } => {
                        Some(Self::wrap_with_prefix(prefix, new_child))
                    }
                    other => Some(Self::merge_extension(prefix, other)),
                }
            }
            TrieNode::Branch { children, value } => {
                let mut children = children.clone();
                let mut value = value.clone();
                match path.first() {
                    None => value = None,
                    Some(&nibble) => match &children[nibble as usize] {
                        None => return Some(self.clone()),
                        Some(child) => {
                            children[nibble as usize] = child.remove(&path[1..]).map(Rc::new);
                        }
                    },
                }
                Some(Self::collapse_branch(children, value))
            }
        }
    }

    /// Computes this node's reference-root: a 32-byte keccak256 hash for a big node, or an
    /// embedded short representation for a node whose RLP encoding would be under 32 bytes.
    pub fn root_hash(&self) -> B256 {
        match self.node_ref() {
            NodeRef::Hashed(hash) => hash,
            NodeRef::Embedded(rlp) => keccak256(rlp),
        }
    }

    fn node_ref(&self) -> NodeRef {
        let mut encoded = Vec::new();
        self.rlp_encode_self(&mut encoded);
        if encoded.len() < 32 {
            NodeRef::Embedded(encoded)
        } else {
            NodeRef::Hashed(keccak256(&encoded))
        }
    }

    /// Writes the item representing this node inside a *parent's* RLP list: the raw embedded
    /// bytes if short, otherwise the 32-byte hash encoded as an RLP string.
    fn rlp_encode_as_child(&self, out: &mut dyn BufMut) {
        match self {
            TrieNode::Empty => out.put_u8(EMPTY_STRING_CODE),
            _ => match self.node_ref() {
                NodeRef::Embedded(rlp) => out.put_slice(&rlp),
                NodeRef::Hashed(hash) => hash.as_slice().encode(out),
            },
        }
    }

    /// Writes this node's own canonical RLP encoding (the bytes that get keccak256-hashed).
    fn rlp_encode_self(&self, out: &mut Vec<u8>) {
        match self {
            TrieNode::Empty => out.push(EMPTY_STRING_CODE),
            TrieNode::Leaf { path, value } => {
                let encoded_path = hex_prefix_encode(path, true);
                let payload_len = encoded_path.length() + value.length();
                Header { list: true, payload_length: payload_len }.encode(out);
                encoded_path.encode(out);
                value.encode(out);
            }
            TrieNode::Extension { prefix, child } => {
                let encoded_path = hex_prefix_encode(prefix, false);
                let mut child_buf = Vec::new();
                child.rlp_encode_as_child(&mut child_buf);
                let payload_len = encoded_path.length() + child_buf.len();
                Header { list: true, payload_length: payload_len }.encode(out);
                encoded_path.encode(out);
                out.extend_from_slice(&child_buf);
            }
            TrieNode::Branch { children, value } => {
                let mut child_bufs: Vec<Vec<u8>> = Vec::with_capacity(BRANCH_WIDTH);
                for child in children {
                    let mut buf = Vec::new();
                    match child {
                        Some(node) => node.rlp_encode_as_child(&mut buf),
                        None => buf.push(EMPTY_STRING_CODE),
                    }
                    child_bufs.push(buf);
                }
                let value_bytes = value.clone().unwrap_or_default();
                let payload_len: usize =
                    child_bufs.iter().map(Vec::len).sum::<usize>() + value_bytes.length();
                Header { list: true, payload_length: payload_len }.encode(out);
                for buf in child_bufs {
                    out.extend_from_slice(&buf);
                }
                value_bytes.encode(out);
            }
        }
    }

    fn empty_branch() -> [Option<Rc<TrieNode>>; BRANCH_WIDTH] {
        Default::default()
    }

    fn wrap_with_prefix(prefix: &[u8], branch_node: TrieNode) -> TrieNode {
        if prefix.is_empty() {
            branch_node
        } else {
            TrieNode::Extension { prefix: prefix.to_vec(), child: Rc::new(branch_node) }
        }
    }

    /// Merges an extension's prefix with a now-collapsed child (a leaf or another extension),
    /// since an extension may never point directly at a leaf/extension without folding the
    /// prefixes together.
    fn merge_extension(prefix: &[u8], child: TrieNode) -> TrieNode {
        match child {
            TrieNode::Leaf { path, value } => {
                let mut full = prefix.to_vec();
                full.extend(path);
                TrieNode::Leaf { path: full, value }
            }
            TrieNode::Extension { prefix: child_prefix, child: grandchild } => {
                let mut full = prefix.to_vec();
                full.extend(child_prefix);
                TrieNode::Extension { prefix: full, child: grandchild }
            }
            branch @ TrieNode::Branch { .. } => {
                TrieNode::Extension { prefix: prefix.to_vec(), child: Rc::new(branch) }
            }
            TrieNode::Empty => TrieNode::Empty,
        }
    }

    /// After removing an entry from a branch, collapses it if only one child (or only the
    /// branch's own value) remains, since a branch with a single remaining edge is not a valid
    /// canonical MPT node.
    fn collapse_branch(
        children: [Option<Rc<TrieNode>>; BRANCH_WIDTH],
        value: Option<Bytes>,
    ) -> TrieNode {
        let present: Vec<usize> =
            (0..BRANCH_WIDTH).filter(|&i| children[i].is_some()).collect();

        match (present.len(), &value) {
            (0, None) => TrieNode::Empty,
            (0, Some(v)) => TrieNode::Leaf { path: Vec::new(), value: v.clone() },
            (1, None) => {
                let nibble = present[0];
                let child = children[nibble].clone().unwrap();
                let mut prefix = vec![nibble as u8];
                match child.as_ref() {
                    TrieNode::Leaf { path, value } => {
                        prefix.extend(path);
                        TrieNode::Leaf { path: prefix, value: value.clone() }
                    }
                    TrieNode::Extension { prefix: child_prefix, child: grandchild } => {
                        prefix.extend(child_prefix);
                        TrieNode::Extension { prefix, child: grandchild.clone() }
                    }
                    TrieNode::Branch { .. } => TrieNode::Extension { prefix, child },
                    TrieNode::Empty => TrieNode::Empty,
                }
            }
            _ => TrieNode::Branch { children, value },
        }
    }
}

/// Sets branch slot `nibble` to `child`.
fn branch_set_child(
    branch: &mut [Option<Rc<TrieNode>>; BRANCH_WIDTH],
    nibble: u8,
    child: Rc<TrieNode>,
) {
    branch[nibble as usize] = Some(child);
}

/// Places `value` into `children`/`branch_value` at the slot addressed by `remainder`'s first
/// nibble, or directly into `branch_value` if `remainder` is empty (the key terminates at this
/// branch).
fn place_remainder(
    children: &mut [Option<Rc<TrieNode>>; BRANCH_WIDTH],
    branch_value: &mut Option<Bytes>,
    remainder: &[u8],
    value: Bytes,
) {
    match remainder.first() {
        None => *branch_value = Some(value),
        Some(&nibble) => {
            children[nibble as usize] =
                Some(Rc::new(TrieNode::Leaf { path: remainder[1..].to_vec(), value }));
        }
    }
}
