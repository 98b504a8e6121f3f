//! Protocol-wide magic constants (§6 of the spec).

use alloy_primitives::{address, Address};

/// The sender address used for protocol system transactions.
pub(crate) const SYSTEM_ADDRESS: Address = address!("fffffffffffffffffffffffffffffffffffffffe");

/// Gas limit assigned to unchecked pre-block system transactions.
pub(crate) const SYSTEM_TRANSACTION_GAS: u64 = 30_000_000;

/// Maximum size, in bytes, of deployed contract code.
pub(crate) const MAX_CODE_SIZE: usize = 24_576;

/// Maximum cumulative blob gas usable within a single block.
pub(crate) const MAX_BLOB_GAS_PER_BLOCK: u64 = 1_179_648;

/// Gas charged per blob.
pub(crate) const GAS_PER_BLOB: u64 = 131_072;

/// Target cumulative blob gas per block, used by the excess-blob-gas update rule.
pub(crate) const TARGET_BLOB_GAS_PER_BLOCK: u64 = 786_432;

/// Denominator of the blob base fee's Taylor-series update fraction.
pub(crate) const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 5_007_716;

/// Required first byte of every EIP-4844 versioned hash.
pub(crate) const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// Denominator of the maximum base-fee change between consecutive blocks.
pub(crate) const BASE_FEE_MAX_CHANGE_DENOMINATOR: u64 = 8;

/// Multiplier between a block's gas target and its gas limit.
pub(crate) const ELASTICITY_MULTIPLIER: u64 = 2;

/// Denominator bounding how much the gas limit may change block-to-block.
pub(crate) const GAS_LIMIT_ADJUSTMENT_FACTOR: u64 = 1024;

/// The minimum gas limit a block header may declare.
pub(crate) const GAS_LIMIT_MINIMUM: u64 = 5_000;

/// Maximum EVM stack depth.
pub(crate) const STACK_LIMIT: usize = 1024;

/// Maximum call/create nesting depth.
pub(crate) const CALL_DEPTH_LIMIT: usize = 1024;

/// The three-byte prefix of an EIP-7702 delegation designator, followed by a 20-byte address.
pub(crate) const DELEGATION_DESIGNATOR_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// Byte length of a full EIP-7702 delegation designator.
pub(crate) const DELEGATION_DESIGNATOR_LEN: usize = 23;

/// Gas refunded per cleared storage slot, pre-London.
pub(crate) const SSTORE_REFUND_LEGACY: i64 = 15_000;

/// Gas refunded per `SSTORE` clearing a slot, post-EIP-3529 (London+).
pub(crate) const SSTORE_REFUND: i64 = 4_800;

/// Denominator of the post-London refund cap: `applied <= gas_used / REFUND_CAP_DENOMINATOR`.
pub(crate) const REFUND_CAP_DENOMINATOR: u64 = 5;

/// EIP-4788 beacon roots contract, called with the parent beacon block root before every block's
/// transactions.
pub(crate) const BEACON_ROOTS_ADDRESS: Address = address!("000f3df6d732807ef1319fb7b8bb8522d0beac02");

/// EIP-2935 history storage contract, called with the parent hash before every block's
/// transactions.
pub(crate) const HISTORY_STORAGE_ADDRESS: Address = address!("0000f90827f1c53a10cb7a02335b175320002935");

/// EIP-7002 withdrawal request predeploy, called with no input after every block's transactions.
pub(crate) const WITHDRAWAL_REQUEST_PREDEPLOY_ADDRESS: Address =
    address!("00000961ef480eb55e80d19ad83579a64c007002");

/// EIP-7251 consolidation request predeploy, called with no input after every block's
/// transactions.
pub(crate) const CONSOLIDATION_REQUEST_PREDEPLOY_ADDRESS: Address =
    address!("0000bbddc7ce488642fb579f8b00f3a590007251");

/// EIP-6110 deposit contract; deposit requests are parsed from its logs, not from a system call.
pub(crate) const DEPOSIT_CONTRACT_ADDRESS: Address = address!("00000000219ab540356cbb839cbe05303d7705fa");

/// Byte length of one EIP-7002 withdrawal request in the system call's return data.
pub(crate) const WITHDRAWAL_REQUEST_LENGTH: usize = 76;

/// Byte length of one EIP-7251 consolidation request in the system call's return data.
pub(crate) const CONSOLIDATION_REQUEST_LENGTH: usize = 116;
