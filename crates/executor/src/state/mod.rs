//! The journaled world state (C4): accounts, storage, and transient storage, committed through
//! [`corevm_mpt::Trie`] and guarded by a snapshot stack for nested call frames.

mod account;
pub use account::Account;

mod journal;
pub use journal::JournaledState;
