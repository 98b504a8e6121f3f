//! Pre- and post-block system transactions: EIP-4788 beacon roots, EIP-2935 history storage,
//! EIP-7002/7251 withdrawal and consolidation requests, and EIP-6110 deposit request parsing.

use alloy_primitives::{Bytes, Log, B256};

use crate::constants::{
    BEACON_ROOTS_ADDRESS, CONSOLIDATION_REQUEST_LENGTH, CONSOLIDATION_REQUEST_PREDEPLOY_ADDRESS,
    DEPOSIT_CONTRACT_ADDRESS, HISTORY_STORAGE_ADDRESS, SYSTEM_ADDRESS, SYSTEM_TRANSACTION_GAS,
    WITHDRAWAL_REQUEST_LENGTH, WITHDRAWAL_REQUEST_PREDEPLOY_ADDRESS,
};
use crate::evm::{execute_frame, ExecutionContext, Message};

/// Request type-prefix bytes (EIP-7685).
pub mod request_type {
    /// EIP-6110 deposit request.
    pub const DEPOSIT: u8 = 0x00;
    /// EIP-7002 withdrawal request.
    pub const WITHDRAWAL: u8 = 0x01;
    /// EIP-7251 consolidation request.
    pub const CONSOLIDATION: u8 = 0x02;
}

/// Invokes a pre- or post-block system call, silently doing nothing if the target has no
/// deployed code (the contract is simply not present on this chain). Returns the call's output on
/// success, or `None` if the call was skipped or reverted.
fn call_system_contract(
    ctx: &mut ExecutionContext,
    address: alloy_primitives::Address,
    input: Bytes,
) -> Option<Bytes> {
    if ctx.state.get_account(address).map(|a| a.code.is_empty()).unwrap_or(true) {
        return None;
    }
    let msg = Message::Call {
        scheme: crate::evm::CallScheme::Call,
        code_address: address,
        storage_address: address,
        caller: SYSTEM_ADDRESS,
        value: alloy_primitives::U256::ZERO,
        input,
        gas_limit: SYSTEM_TRANSACTION_GAS,
        is_static: false,
    };
    let frame = execute_frame(ctx, msg, 0);
    frame.success.then_some(frame.output)
}

/// EIP-4788: calls the beacon roots contract with `parent_beacon_root`, run before every block's
/// transactions.
pub fn apply_beacon_root(ctx: &mut ExecutionContext, parent_beacon_root: B256) {
    call_system_contract(ctx, BEACON_ROOTS_ADDRESS, Bytes::copy_from_slice(parent_beacon_root.as_slice()));
}

/// EIP-2935: calls the history storage contract with the parent block hash, run before every
/// block's transactions (after the beacon roots call).
pub fn apply_history_storage(ctx: &mut ExecutionContext, parent_hash: B256) {
    call_system_contract(ctx, HISTORY_STORAGE_ADDRESS, Bytes::copy_from_slice(parent_hash.as_slice()));
}

/// EIP-7002: calls the withdrawal request predeploy with no input after every block's
/// transactions, returning the type-prefixed requests it reports.
pub fn collect_withdrawal_requests(ctx: &mut ExecutionContext) -> Bytes {
    let Some(output) = call_system_contract(ctx, WITHDRAWAL_REQUEST_PREDEPLOY_ADDRESS, Bytes::new()) else {
        return Bytes::new();
    };
    prefix_fixed_chunks(&output, WITHDRAWAL_REQUEST_LENGTH, request_type::WITHDRAWAL)
}

/// EIP-7251: calls the consolidation request predeploy with no input after every block's
/// transactions, returning the type-prefixed requests it reports.
pub fn collect_consolidation_requests(ctx: &mut ExecutionContext) -> Bytes {
    let Some(output) = call_system_contract(ctx, CONSOLIDATION_REQUEST_PREDEPLOY_ADDRESS, Bytes::new())
    else {
        return Bytes::new();
    };
    prefix_fixed_chunks(&output, CONSOLIDATION_REQUEST_LENGTH, request_type::CONSOLIDATION)
}

fn prefix_fixed_chunks(data: &[u8], chunk_len: usize, type_byte: u8) -> Bytes {
    let count = data.len() / chunk_len;
    let mut out = Vec::with_capacity(count * (chunk_len + 1));
    for i in 0..count {
        out.push(type_byte);
        out.extend_from_slice(&data[i * chunk_len..(i + 1) * chunk_len]);
    }
    out.into()
}

/// EIP-6110: extracts one deposit request from a `DepositEvent` log's 512-byte ABI-encoded data
/// at its fixed byte offsets.
fn parse_deposit_data(data: &[u8]) -> Option<Bytes> {
    if data.len() < 512 {
        return None;
    }
    let mut out = Vec::with_capacity(1 + 48 + 32 + 8 + 96 + 8);
    out.push(request_type::DEPOSIT);
    out.extend_from_slice(&data[192..240]); // pubkey
    out.extend_from_slice(&data[288..320]); // withdrawal_credentials
    out.extend_from_slice(&data[352..360]); // amount
    out.extend_from_slice(&data[416..512]); // signature
    out.extend_from_slice(data.get(544..552)?); // index
    Some(out.into())
}

/// EIP-6110: scans a transaction's logs for `DepositEvent`s emitted by the deposit contract and
/// concatenates their parsed, type-prefixed requests.
pub fn parse_deposit_requests_from_logs(logs: &[Log]) -> Bytes {
    let mut out = Vec::new();
    for log in logs {
        if log.address == DEPOSIT_CONTRACT_ADDRESS {
            if let Some(parsed) = parse_deposit_data(&log.data.data) {
                out.extend_from_slice(&parsed);
            }
        }
    }
    out.into()
}

/// Computes EIP-7685's `requests_hash = sha256(sha256(req_0) ‖ sha256(req_1) ‖ ...)` over the
/// type-prefixed request lists, in ascending type order.
pub fn requests_hash(deposits: &[u8], withdrawals: &[u8], consolidations: &[u8]) -> B256 {
    use sha2::{Digest, Sha256};
    let mut outer = Sha256::new();
    for requests in [deposits, withdrawals, consolidations] {
        let digest = Sha256::digest(requests);
        outer.update(digest);
    }
    B256::from_slice(&outer.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requests_hash_is_stable() {
        let a = requests_hash(&[], &[], &[]);
        let b = requests_hash(&[], &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn prefix_fixed_chunks_splits_by_chunk_len() {
        let data = vec![0u8; WITHDRAWAL_REQUEST_LENGTH * 2];
        let out = prefix_fixed_chunks(&data, WITHDRAWAL_REQUEST_LENGTH, request_type::WITHDRAWAL);
        assert_eq!(out.len(), 2 * (WITHDRAWAL_REQUEST_LENGTH + 1));
        assert_eq!(out[0], request_type::WITHDRAWAL);
        assert_eq!(out[WITHDRAWAL_REQUEST_LENGTH + 1], request_type::WITHDRAWAL);
    }

    #[test]
    fn short_deposit_log_data_is_rejected() {
        assert!(parse_deposit_data(&[0u8; 10]).is_none());
    }

    #[test]
    fn deposit_requests_ignore_logs_from_other_contracts() {
        let log = Log {
            address: alloy_primitives::Address::ZERO,
            data: alloy_primitives::LogData::new(vec![], vec![0u8; 600].into()).unwrap(),
        };
        assert!(parse_deposit_requests_from_logs(&[log]).is_empty());
    }
}
