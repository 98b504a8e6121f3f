//! Error taxonomies for the executor.
//!
//! Two distinct hierarchies, matching the severity of the failure: a [`BlockError`] rejects the
//! whole block (header mismatch, bad admissibility), while a [`FrameError`] is scoped to a single
//! EVM frame and is recoverable by the calling frame.

use alloy_primitives::{Address, B256};

/// The error type for block-level state-transition failures.
///
/// A `BlockError` means the candidate block is invalid; no partial application of its
/// transactions is ever observable by the caller.
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    /// The header does not match the expected value derived from the parent header and the
    /// executed transactions.
    #[error("invalid block header: {0}")]
    InvalidHeader(&'static str),
    /// `block.number != parent.number + 1`.
    #[error("block number {got} does not follow parent number {parent}")]
    InvalidBlockNumber {
        /// The candidate block's number.
        got: u64,
        /// The parent block's number.
        parent: u64,
    },
    /// The transaction failed one of the sender-side admissibility checks.
    #[error("transaction {index} failed admissibility: {reason}")]
    InadmissibleTransaction {
        /// Index of the offending transaction within the block.
        index: usize,
        /// Human-readable reason, see [`crate::tx`] admissibility checks.
        reason: &'static str,
    },
    /// Signature recovery failed for the given transaction index.
    #[error("transaction {0} has an invalid signature")]
    InvalidSignature(usize),
    /// `sum(tx.gas_limit) + cumulative_gas_used` would exceed `header.gas_limit`.
    #[error("block gas limit exceeded at transaction {0}")]
    GasUsedExceedsLimit(usize),
    /// The block's cumulative blob gas exceeds `MAX_BLOB_GAS_PER_BLOCK`.
    #[error("blob gas limit exceeded")]
    BlobGasLimitExceeded,
    /// A computed commitment (state root, receipts root, ...) did not match the header's.
    #[error("commitment mismatch: {field} expected {expected} got {got}")]
    CommitmentMismatch {
        /// Name of the mismatched header field.
        field: &'static str,
        /// The value present in the header.
        expected: B256,
        /// The value this engine computed.
        got: B256,
    },
    /// A system transaction's target account has no code.
    #[error("system contract {0} has no code")]
    MissingSystemContract(Address),
    /// Propagated from the journaled state / trie layer.
    #[error(transparent)]
    State(#[from] StateError),
}

/// A [`Result`] alias for [`BlockError`].
pub type BlockResult<T> = Result<T, BlockError>;

/// Errors surfaced by the journaled world state that are not specific to a single EVM frame
/// (trie decode failures, missing accounts expected to exist).
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// The RLP-encoded account or storage value stored in the trie could not be decoded.
    #[error("failed to decode trie value: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// A snapshot was committed or rolled back with no matching `begin`.
    #[error("journal underflow: no open snapshot")]
    JournalUnderflow,
}

/// Errors that abort execution of a single EVM frame.
///
/// A `FrameError` never invalidates the block: the calling frame (or the transaction loop, for a
/// top-level frame) observes it, discards the failed frame's state mutations, and either burns
/// the frame's remaining gas (exceptional halt) or preserves it (`Revert`).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame ran out of gas.
    #[error("out of gas")]
    OutOfGas,
    /// An opcode attempted to pop more stack items than are present.
    #[error("stack underflow")]
    StackUnderflow,
    /// A push would grow the stack beyond 1024 items.
    #[error("stack overflow")]
    StackOverflow,
    /// `JUMP`/`JUMPI` targeted a byte that is not a valid jump destination.
    #[error("invalid jump destination")]
    InvalidJumpDest,
    /// The opcode byte has no handler.
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),
    /// A state-mutating opcode was executed within a static (`STATICCALL`) context.
    #[error("write attempted in static context")]
    WriteInStaticContext,
    /// Memory or calldata was read past its logical bounds and could not be zero-extended.
    #[error("out of bounds read")]
    OutOfBoundsRead,
    /// A `CREATE`/`CREATE2` init code returned output beginning with the `0xEF` byte.
    #[error("contract creation code begins with 0xEF")]
    InvalidContractPrefix,
    /// `CREATE`/`CREATE2` collided with an existing account that has code, a nonzero nonce, or
    /// storage.
    #[error("address collision on contract creation")]
    AddressCollision,
    /// `REVERT` was executed; carries the returned data.
    #[error("reverted")]
    Revert(alloy_primitives::Bytes),
    /// The call/create depth limit of 1024 was reached.
    #[error("call depth limit reached")]
    StackDepthLimit,
    /// A precompile rejected its input.
    #[error("invalid precompile input")]
    InvalidParameter,
}

/// A [`Result`] alias for [`FrameError`].
pub type FrameResult<T> = Result<T, FrameError>;

impl FrameError {
    /// Whether this error preserves the frame's remaining gas when propagated to the caller.
    ///
    /// Only `REVERT` preserves gas; every other frame error is an exceptional halt that burns
    /// whatever gas remained in the frame.
    pub const fn preserves_gas(&self) -> bool {
        matches!(self, Self::Revert(_))
    }
}
