//! Gas accounting (C6): intrinsic cost, memory expansion, the message-call reservation rule, and
//! blob base fee math.

use corevm_primitives::{ceil32, taylor_exponential};

use crate::constants::BLOB_BASE_FEE_UPDATE_FRACTION;

/// Base intrinsic gas cost of every transaction.
pub const TX_BASE_COST: u64 = 21_000;
/// Gas charged per zero byte of calldata.
pub const TX_DATA_ZERO_COST: u64 = 4;
/// Gas charged per nonzero byte of calldata, pre-EIP-2028/7623 token accounting.
pub const TX_DATA_NONZERO_COST: u64 = 16;
/// Extra intrinsic gas for contract creation.
pub const TX_CREATE_COST: u64 = 32_000;
/// Gas per 32-byte word of init code, post-EIP-3860.
pub const INIT_CODE_WORD_COST: u64 = 2;
/// Gas per access-list address.
pub const ACCESS_LIST_ADDRESS_COST: u64 = 2_400;
/// Gas per access-list storage key.
pub const ACCESS_LIST_STORAGE_KEY_COST: u64 = 1_900;
/// Gas per EIP-7702 authorization tuple.
pub const PER_AUTHORIZATION_COST: u64 = 25_000;
/// EIP-7623 per-token calldata floor cost.
const FLOOR_COST_PER_TOKEN: u64 = 10;
/// EIP-7623 "token" weight of a nonzero calldata byte.
const TOKEN_WEIGHT_NONZERO: u64 = 4;

/// Counts the zero and nonzero bytes of `data`.
fn count_zero_nonzero(data: &[u8]) -> (u64, u64) {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    (zeros, data.len() as u64 - zeros)
}

/// Parameters influencing intrinsic gas, gathered from the transaction being validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntrinsicGasInput {
    /// Whether this transaction creates a contract.
    pub is_create: bool,
    /// Number of distinct addresses in the access list.
    pub access_list_addresses: u64,
    /// Total number of storage keys across the access list.
    pub access_list_storage_keys: u64,
    /// Number of EIP-7702 authorization tuples.
    pub authorization_count: u64,
}

/// Computes the intrinsic gas of a transaction carrying `data`, applying the EIP-7623 calldata
/// floor when `apply_calldata_floor` (Prague+) is set.
pub fn intrinsic_gas(data: &[u8], input: IntrinsicGasInput, apply_calldata_floor: bool) -> u64 {
    let (zeros, nonzeros) = count_zero_nonzero(data);

    let mut execution_intrinsic = TX_BASE_COST + zeros * TX_DATA_ZERO_COST + nonzeros * TX_DATA_NONZERO_COST;
    execution_intrinsic += input.access_list_addresses * ACCESS_LIST_ADDRESS_COST;
    execution_intrinsic += input.access_list_storage_keys * ACCESS_LIST_STORAGE_KEY_COST;
    execution_intrinsic += input.authorization_count * PER_AUTHORIZATION_COST;

    if input.is_create {
        execution_intrinsic += TX_CREATE_COST;
        execution_intrinsic += ceil32(data.len() as u64) / 32 * INIT_CODE_WORD_COST;
    }

    if !apply_calldata_floor {
        return execution_intrinsic;
    }

    let tokens = zeros + nonzeros * TOKEN_WEIGHT_NONZERO;
    let floor = TX_BASE_COST + tokens * FLOOR_COST_PER_TOKEN;
    execution_intrinsic.max(floor)
}

/// Cost, in gas, of expanding memory to `new_size_words` 32-byte words: `3w + w²/512`.
const fn memory_cost(size_words: u64) -> u64 {
    3 * size_words + (size_words * size_words) / 512
}

/// Gas charged for growing memory's high-water mark from `current_words` to `new_words`. Returns
/// zero if memory does not need to grow.
pub const fn memory_expansion_cost(current_words: u64, new_words: u64) -> u64 {
    if new_words <= current_words {
        0
    } else {
        memory_cost(new_words) - memory_cost(current_words)
    }
}

/// Converts a byte length to the number of 32-byte words it occupies.
pub const fn bytes_to_words(len: u64) -> u64 {
    ceil32(len) / 32
}

/// Applies the "all but 1/64" message-call gas reservation rule: the gas forwarded to a child
/// call is capped so the caller always retains at least `1/64` of what remained after charging
/// the call's other costs.
pub const fn call_gas_with_stipend(requested: u64, gas_left_after_costs: u64) -> u64 {
    let max_forwardable = gas_left_after_costs - gas_left_after_costs / 64;
    if requested < max_forwardable {
        requested
    } else {
        max_forwardable
    }
}

/// `taylor_exponential(1, excess_blob_gas, BLOB_BASE_FEE_UPDATE_FRACTION)`: the per-blob base fee
/// for a block with the given excess blob gas.
pub fn blob_base_fee(excess_blob_gas: u64) -> u64 {
    taylor_exponential(1, excess_blob_gas, BLOB_BASE_FEE_UPDATE_FRACTION)
}

/// Caps a raw refund counter at `gas_used / 5`, per EIP-3529.
pub const fn capped_refund(refund_counter: i64, gas_used: u64) -> u64 {
    let cap = gas_used / 5;
    if refund_counter <= 0 {
        0
    } else if (refund_counter as u64) > cap {
        cap
    } else {
        refund_counter as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_transfer_costs_21000() {
        let gas = intrinsic_gas(&[], IntrinsicGasInput::default(), false);
        assert_eq!(gas, TX_BASE_COST);
    }

    #[test]
    fn calldata_is_charged_per_byte_kind() {
        let data = [0u8, 0u8, 1u8];
        let gas = intrinsic_gas(&data, IntrinsicGasInput::default(), false);
        assert_eq!(gas, TX_BASE_COST + 2 * TX_DATA_ZERO_COST + TX_DATA_NONZERO_COST);
    }

    #[test]
    fn calldata_floor_dominates_for_large_zero_heavy_data() {
        let data = vec![0u8; 1000];
        let execution = intrinsic_gas(&data, IntrinsicGasInput::default(), false);
        let floored = intrinsic_gas(&data, IntrinsicGasInput::default(), true);
        assert!(floored >= execution);
        assert_eq!(floored, TX_BASE_COST + 1000 * FLOOR_COST_PER_TOKEN);
    }

    #[test]
    fn creation_adds_create_and_init_code_cost() {
        let data = vec![0u8; 64];
        let input = IntrinsicGasInput { is_create: true, ..Default::default() };
        let gas = intrinsic_gas(&data, input, false);
        assert_eq!(
            gas,
            TX_BASE_COST + 64 * TX_DATA_ZERO_COST + TX_CREATE_COST + 2 * INIT_CODE_WORD_COST
        );
    }

    #[test]
    fn memory_expansion_is_zero_when_not_growing() {
        assert_eq!(memory_expansion_cost(10, 10), 0);
        assert_eq!(memory_expansion_cost(10, 5), 0);
    }

    #[test]
    fn memory_expansion_charges_the_delta() {
        let cost = memory_expansion_cost(0, 1);
        assert_eq!(cost, memory_cost(1));
    }

    #[test]
    fn call_gas_reserves_one_sixty_fourth() {
        let forwarded = call_gas_with_stipend(1_000_000, 640);
        assert_eq!(forwarded, 640 - 640 / 64);
    }

    #[test]
    fn call_gas_does_not_exceed_request() {
        let forwarded = call_gas_with_stipend(10, 640);
        assert_eq!(forwarded, 10);
    }

    #[test]
    fn refund_is_capped_at_one_fifth_of_gas_used() {
        assert_eq!(capped_refund(1000, 1000), 200);
        assert_eq!(capped_refund(100, 1000), 100);
        assert_eq!(capped_refund(-5, 1000), 0);
    }

    #[test]
    fn blob_base_fee_at_zero_excess_is_one() {
        assert_eq!(blob_base_fee(0), 1);
    }
}
