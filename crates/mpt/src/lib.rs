#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod nibbles;

mod node;
pub use node::TrieNode;

mod trie;
pub use trie::Trie;

mod ordered;
pub use ordered::ordered_trie_root;
