//! The fixed-dispatch-table execution loop (C7) and the call/create protocol (C8).

use std::collections::{HashSet, VecDeque};

use alloy_primitives::{keccak256, Address, Log, LogData, B256, U256};
use corevm_primitives::{clamp_shift, from_signed, signed_cmp, to_signed, Sign};

use super::frame::{CallScheme, Frame, Message};
use super::memory::Memory;
use super::opcodes as op;
use super::stack::Stack;
use crate::bal::BlockAccessListTracker;
use crate::config::ForkConfig;
use crate::constants::{CALL_DEPTH_LIMIT, MAX_CODE_SIZE};
use crate::errors::FrameError;
use crate::gas::{bytes_to_words, call_gas_with_stipend, memory_expansion_cost};
use crate::precompile::{call_precompile, is_precompile_address};
use crate::state::JournaledState;
use crate::tx::resolve_delegation;

/// Fields of the executing block, as the interpreter needs them (`COINBASE`, `NUMBER`, ...).
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// The executing block's number.
    pub number: u64,
    /// The executing block's timestamp.
    pub timestamp: u64,
    /// Fee recipient.
    pub coinbase: Address,
    /// Block gas limit.
    pub gas_limit: u64,
    /// EIP-1559 base fee.
    pub base_fee: u128,
    /// `PREVRANDAO` (post-Merge) or difficulty (pre-Merge).
    pub prev_randao: B256,
    /// EIP-4844 per-blob base fee for this block.
    pub blob_base_fee: u128,
    /// Ancestor block hashes available to `BLOCKHASH` (C7), oldest first, ending at this block's
    /// immediate parent. Holds at most the last 256.
    pub ancestor_hashes: VecDeque<B256>,
}

impl BlockContext {
    /// The hash of block `queried_number`, or zero if it falls outside the 256-block window
    /// `BLOCKHASH` is allowed to see.
    pub fn block_hash(&self, queried_number: u64) -> B256 {
        if queried_number >= self.number {
            return B256::ZERO;
        }
        let distance = self.number - queried_number;
        if distance == 0 || distance > 256 || distance as usize > self.ancestor_hashes.len() {
            return B256::ZERO;
        }
        let index = self.ancestor_hashes.len() - distance as usize;
        self.ancestor_hashes.get(index).copied().unwrap_or_default()
    }
}

/// Fields of the executing transaction, as the interpreter needs them (`ORIGIN`, `GASPRICE`, ...).
#[derive(Debug, Clone)]
pub struct TxContext {
    /// The transaction's sender.
    pub origin: Address,
    /// The effective gas price paid by this transaction.
    pub gas_price: u128,
    /// The transaction's EIP-4844 blob versioned hashes.
    pub blob_hashes: Vec<B256>,
}

/// Mutable state threaded through every frame of a single transaction's execution.
pub struct ExecutionContext<'a> {
    /// The world state every frame reads and writes.
    pub state: &'a mut JournaledState,
    /// The active hardfork schedule.
    pub config: &'a ForkConfig,
    /// The executing block's environment.
    pub block: &'a BlockContext,
    /// The executing transaction's environment.
    pub tx: &'a TxContext,
    /// Addresses already charged the EIP-2929 cold-access surcharge this transaction.
    pub warm_addresses: &'a mut HashSet<Address>,
    /// `(address, slot)` pairs already charged the EIP-2929 cold-access surcharge.
    pub warm_storage: &'a mut HashSet<(Address, B256)>,
    /// Logs emitted so far this transaction.
    pub logs: &'a mut Vec<Log>,
    /// Block Access List tracker (EIP-7928); a no-op sink pre-Osaka.
    pub bal: &'a mut BlockAccessListTracker,
}

const COLD_ACCOUNT_ACCESS_COST: u64 = 2_600;
const WARM_ACCOUNT_ACCESS_COST: u64 = 100;
const COLD_SLOAD_COST: u64 = 2_100;
const WARM_SLOAD_COST: u64 = 100;
const SSTORE_SET_COST: u64 = 20_000;
const SSTORE_RESET_COST: u64 = 2_900;
const SSTORE_STIPEND: u64 = 2_300;

impl ExecutionContext<'_> {
    fn access_address(&mut self, address: Address, berlin_active: bool) -> u64 {
        if !berlin_active || is_precompile_address(&address) {
            return 0;
        }
        if self.warm_addresses.insert(address) {
            COLD_ACCOUNT_ACCESS_COST - WARM_ACCOUNT_ACCESS_COST
        } else {
            0
        }
    }

    /// Marks `(address, key)` warm, returning whether this access was the cold one.
    fn access_storage_slot(&mut self, address: Address, key: B256, berlin_active: bool) -> bool {
        berlin_active && self.warm_storage.insert((address, key))
    }
}

/// Runs `msg` to completion, including the surrounding journal begin/commit/rollback and value
/// transfer, recursing into child frames for `CALL`-family and `CREATE`-family opcodes.
pub fn execute_frame(ctx: &mut ExecutionContext, msg: Message, depth: usize) -> Frame {
    if depth > CALL_DEPTH_LIMIT {
        return Frame::halted(FrameError::StackDepthLimit);
    }

    ctx.state.begin();

    let address = msg.address();
    let value = msg.value();
    let scheme_is_transfer = !matches!(
        msg,
        Message::Call { scheme: CallScheme::DelegateCall | CallScheme::StaticCall, .. }
    );

    if scheme_is_transfer && !value.is_zero() {
        let caller = msg.caller();
        if !ctx.state.move_ether(caller, address, value) {
            ctx.state.rollback().ok();
            return Frame::halted(FrameError::InvalidParameter);
        }
        ctx.bal.record_balance_touch(caller);
        ctx.bal.record_balance_touch(address);
    } else {
        ctx.state.touch_account(address);
    }

    let result = match &msg {
        Message::Create { init_code, gas_limit, .. } => {
            run_create(ctx, &msg, init_code.clone(), *gas_limit, depth)
        }
        Message::Call { code_address, input, gas_limit, is_static, .. } => {
            run_call(ctx, &msg, *code_address, input.clone(), *gas_limit, *is_static, depth)
        }
    };

    if result.success {
        ctx.state.commit().ok();
    } else {
        ctx.state.rollback().ok();
    }
    result
}

fn run_call(
    ctx: &mut ExecutionContext,
    msg: &Message,
    code_address: Address,
    calldata: alloy_primitives::Bytes,
    gas_limit: u64,
    is_static: bool,
    depth: usize,
) -> Frame {
    if is_precompile_address(&code_address) {
        let berlin = ctx.config.is_berlin_active(ctx.block.number, ctx.block.timestamp);
        ctx.access_address(code_address, berlin);
        return match call_precompile(
            ctx.config,
            ctx.block.number,
            ctx.block.timestamp,
            code_address,
            &calldata,
            gas_limit,
        ) {
            Ok((gas_used, output)) => Frame::returned(gas_limit - gas_used, 0, output),
            Err(err) => Frame::halted(err),
        };
    }

    let Some(account) = ctx.state.get_account(code_address) else {
        return Frame::stop(gas_limit);
    };
    let code = resolve_code(ctx, &account.code);

    run_bytecode(ctx, msg.address(), msg.caller(), msg.value(), &calldata, &code, gas_limit, is_static, depth)
}

fn resolve_code(ctx: &mut ExecutionContext, code: &[u8]) -> alloy_primitives::Bytes {
    if !ctx.config.is_prague_active(ctx.block.number, ctx.block.timestamp) {
        return code.to_vec().into();
    }
    match resolve_delegation(code) {
        Some(target) => ctx.state.get_account(target).map(|a| a.code).unwrap_or_default(),
        None => code.to_vec().into(),
    }
}

fn run_create(
    ctx: &mut ExecutionContext,
    msg: &Message,
    init_code: alloy_primitives::Bytes,
    gas_limit: u64,
    depth: usize,
) -> Frame {
    let address = msg.address();
    if ctx.state.account_has_code_or_nonce(address) || ctx.state.account_has_storage(address) {
        return Frame::halted(FrameError::AddressCollision);
    }
    ctx.state.mark_account_created(address);
    ctx.state.increment_nonce(address);
    ctx.bal.record_nonce_touch(address);

    let frame = run_bytecode(ctx, address, msg.caller(), msg.value(), &[], &init_code, gas_limit, false, depth);
    if !frame.success {
        return frame;
    }

    let deployed = frame.output.clone();
    if deployed.first() == Some(&0xef) {
        return Frame::halted(FrameError::InvalidContractPrefix);
    }
    if deployed.len() > MAX_CODE_SIZE {
        return Frame::halted(FrameError::InvalidParameter);
    }
    let deposit_cost = deployed.len() as u64 * 200;
    let Some(gas_left) = frame.gas_left.checked_sub(deposit_cost) else {
        return Frame::halted(FrameError::OutOfGas);
    };

    ctx.state.set_code(address, deployed.clone());
    ctx.bal.record_code_touch(address, deployed.clone());
    Frame::returned(gas_left, frame.gas_refund, deployed)
}

/// Derives the address of a `CREATE`-deployed contract: `keccak256(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    use alloy_rlp::{Encodable, Header};
    let payload_length = sender.length() + nonce.length();
    let mut buf = Vec::with_capacity(1 + payload_length);
    Header { list: true, payload_length }.encode(&mut buf);
    sender.encode(&mut buf);
    nonce.encode(&mut buf);
    Address::from_slice(&keccak256(buf)[12..])
}

/// Derives the address of a `CREATE2`-deployed contract:
/// `keccak256(0xff ‖ sender ‖ salt ‖ keccak256(init_code))[12..]`.
pub fn create2_address(sender: Address, salt: B256, init_code: &[u8]) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(sender.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(keccak256(init_code).as_slice());
    Address::from_slice(&keccak256(buf)[12..])
}

#[allow(clippy::too_many_arguments)]
fn run_bytecode(
    ctx: &mut ExecutionContext,
    address: Address,
    caller: Address,
    call_value: U256,
    calldata: &[u8],
    code: &[u8],
    gas_limit: u64,
    is_static: bool,
    depth: usize,
) -> Frame {
    let valid_jumpdests = op::analyze_jumpdests(code);
    let mut stack = Stack::new();
    let mut memory = Memory::new();
    let mut pc = 0usize;
    let mut gas = gas_limit;
    let mut refund = 0i64;
    let mut return_data = alloy_primitives::Bytes::new();

    macro_rules! charge {
        ($amount:expr) => {{
            let cost = $amount;
            match gas.checked_sub(cost) {
                Some(remaining) => gas = remaining,
                None => return Frame::halted(FrameError::OutOfGas),
            }
        }};
    }

    macro_rules! pop {
        () => {
            match stack.pop() {
                Ok(v) => v,
                Err(e) => return Frame::halted(e),
            }
        };
    }

    macro_rules! push {
        ($v:expr) => {
            if let Err(e) = stack.push($v) {
                return Frame::halted(e);
            }
        };
    }

    macro_rules! ensure_memory {
        ($offset:expr, $len:expr) => {{
            let words = Memory::words_required($offset, $len);
            charge!(memory_expansion_cost(memory.words(), words));
            memory.resize(words);
        }};
    }

    let berlin = ctx.config.is_berlin_active(ctx.block.number, ctx.block.timestamp);
    let cancun = ctx.config.is_cancun_active(ctx.block.number, ctx.block.timestamp);

    loop {
        let Some(&opcode) = code.get(pc) else {
            return Frame::returned(gas, refund, alloy_primitives::Bytes::new());
        };

        if is_static && is_write_opcode(opcode) {
            return Frame::halted(FrameError::WriteInStaticContext);
        }

        match opcode {
            op::STOP => return Frame::returned(gas, refund, alloy_primitives::Bytes::new()),

            op::ADD => { charge!(3); let (a, b) = (pop!(), pop!()); push!(a.wrapping_add(b)); }
            op::MUL => { charge!(5); let (a, b) = (pop!(), pop!()); push!(a.wrapping_mul(b)); }
            op::SUB => { charge!(3); let (a, b) = (pop!(), pop!()); push!(a.wrapping_sub(b)); }
            op::DIV => {
                charge!(5);
                let (a, b) = (pop!(), pop!());
                push!(if b.is_zero() { U256::ZERO } else { a.wrapping_div(b) });
            }
            op::SDIV => {
                charge!(5);
                let (a, b) = (pop!(), pop!());
                push!(signed_div(a, b));
            }
            op::MOD => {
                charge!(5);
                let (a, b) = (pop!(), pop!());
                push!(if b.is_zero() { U256::ZERO } else { a.wrapping_rem(b) });
            }
            op::SMOD => {
                charge!(5);
                let (a, b) = (pop!(), pop!());
                push!(signed_mod(a, b));
            }
            op::ADDMOD => {
                charge!(8);
                let (a, b, m) = (pop!(), pop!(), pop!());
                push!(addmod(a, b, m));
            }
            op::MULMOD => {
                charge!(8);
                let (a, b, m) = (pop!(), pop!(), pop!());
                push!(mulmod(a, b, m));
            }
            op::EXP => {
                let (base, exponent) = (pop!(), pop!());
                let byte_len = (256 - exponent.leading_zeros()).div_ceil(8) as u64;
                charge!(10 + 50 * byte_len);
                push!(base.pow(exponent));
            }
            op::SIGNEXTEND => {
                charge!(5);
                let (size, value) = (pop!(), pop!());
                push!(sign_extend(size, value));
            }

            op::LT => { charge!(3); let (a, b) = (pop!(), pop!()); push!(bool_to_u256(a < b)); }
            op::GT => { charge!(3); let (a, b) = (pop!(), pop!()); push!(bool_to_u256(a > b)); }
            op::SLT => {
                charge!(3);
                let (a, b) = (pop!(), pop!());
                push!(bool_to_u256(signed_cmp(a, b) == std::cmp::Ordering::Less));
            }
            op::SGT => {
                charge!(3);
                let (a, b) = (pop!(), pop!());
                push!(bool_to_u256(signed_cmp(a, b) == std::cmp::Ordering::Greater));
            }
            op::EQ => { charge!(3); let (a, b) = (pop!(), pop!()); push!(bool_to_u256(a == b)); }
            op::ISZERO => { charge!(3); let a = pop!(); push!(bool_to_u256(a.is_zero())); }
            op::AND => { charge!(3); let (a, b) = (pop!(), pop!()); push!(a & b); }
            op::OR => { charge!(3); let (a, b) = (pop!(), pop!()); push!(a | b); }
            op::XOR => { charge!(3); let (a, b) = (pop!(), pop!()); push!(a ^ b); }
            op::NOT => { charge!(3); let a = pop!(); push!(!a); }
            op::BYTE => {
                charge!(3);
                let (index, value) = (pop!(), pop!());
                push!(byte_at(index, value));
            }
            op::SHL => {
                charge!(3);
                let (shift, value) = (pop!(), pop!());
                push!(value << clamp_shift(shift));
            }
            op::SHR => {
                charge!(3);
                let (shift, value) = (pop!(), pop!());
                push!(value >> clamp_shift(shift));
            }
            op::SAR => {
                charge!(3);
                let (shift, value) = (pop!(), pop!());
                push!(arithmetic_shift_right(shift, value));
            }

            op::KECCAK256 => {
                let (offset, len) = (pop!(), pop!());
                let (offset, len) = (as_usize(offset), as_usize(len));
                ensure_memory!(offset as u64, len as u64);
                charge!(30 + 6 * bytes_to_words(len as u64));
                let data = memory.load_padded(offset, len);
                push!(U256::from_be_bytes(keccak256(data).0));
            }

            op::ADDRESS => { charge!(2); push!(address_to_u256(address)); }
            op::BALANCE => {
                let addr = u256_to_address(pop!());
                charge!(WARM_ACCOUNT_ACCESS_COST + ctx.access_address(addr, berlin));
                push!(ctx.state.get_account(addr).unwrap_or_default().balance);
            }
            op::ORIGIN => { charge!(2); push!(address_to_u256(ctx.tx.origin)); }
            op::CALLER => { charge!(2); push!(address_to_u256(caller)); }
            op::CALLVALUE => { charge!(2); push!(call_value); }
            op::CALLDATALOAD => {
                charge!(3);
                let offset = as_usize(pop!());
                push!(load_calldata_word(calldata, offset));
            }
            op::CALLDATASIZE => { charge!(2); push!(U256::from(calldata.len() as u64)); }
            op::CALLDATACOPY => {
                let (dest, offset, len) = (pop!(), pop!(), pop!());
                let (dest, offset, len) = (as_usize(dest), as_usize(offset), as_usize(len));
                ensure_memory!(dest as u64, len as u64);
                charge!(3 + 3 * bytes_to_words(len as u64));
                let data = copy_padded(calldata, offset, len);
                if let Err(e) = memory.set_slice(dest, &data) {
                    return Frame::halted(e);
                }
            }
            op::CODESIZE => { charge!(2); push!(U256::from(code.len() as u64)); }
            op::CODECOPY => {
                let (dest, offset, len) = (pop!(), pop!(), pop!());
                let (dest, offset, len) = (as_usize(dest), as_usize(offset), as_usize(len));
                ensure_memory!(dest as u64, len as u64);
                charge!(3 + 3 * bytes_to_words(len as u64));
                let data = copy_padded(code, offset, len);
                if let Err(e) = memory.set_slice(dest, &data) {
                    return Frame::halted(e);
                }
            }
            op::GASPRICE => { charge!(2); push!(U256::from(ctx.tx.gas_price)); }
            op::EXTCODESIZE => {
                let addr = u256_to_address(pop!());
                charge!(WARM_ACCOUNT_ACCESS_COST + ctx.access_address(addr, berlin));
                push!(U256::from(ctx.state.get_account(addr).unwrap_or_default().code.len() as u64));
            }
            op::EXTCODECOPY => {
                let addr = u256_to_address(pop!());
                let (dest, offset, len) = (pop!(), pop!(), pop!());
                let (dest, offset, len) = (as_usize(dest), as_usize(offset), as_usize(len));
                ensure_memory!(dest as u64, len as u64);
                charge!(3 * bytes_to_words(len as u64) + WARM_ACCOUNT_ACCESS_COST + ctx.access_address(addr, berlin));
                let account_code = ctx.state.get_account(addr).unwrap_or_default().code;
                let data = copy_padded(&account_code, offset, len);
                if let Err(e) = memory.set_slice(dest, &data) {
                    return Frame::halted(e);
                }
            }
            op::RETURNDATASIZE => { charge!(2); push!(U256::from(return_data.len() as u64)); }
            op::RETURNDATACOPY => {
                let (dest, offset, len) = (pop!(), pop!(), pop!());
                let (dest, offset, len) = (as_usize(dest), as_usize(offset), as_usize(len));
                if offset + len > return_data.len() {
                    return Frame::halted(FrameError::OutOfBoundsRead);
                }
                ensure_memory!(dest as u64, len as u64);
                charge!(3 + 3 * bytes_to_words(len as u64));
                if let Err(e) = memory.set_slice(dest, &return_data[offset..offset + len]) {
                    return Frame::halted(e);
                }
            }
            op::EXTCODEHASH => {
                let addr = u256_to_address(pop!());
                charge!(WARM_ACCOUNT_ACCESS_COST + ctx.access_address(addr, berlin));
                let account = ctx.state.get_account(addr);
                push!(match account {
                    Some(a) if !a.is_empty() => U256::from_be_bytes(a.code_hash().0),
                    _ => U256::ZERO,
                });
            }

            op::BLOCKHASH => {
                charge!(20);
                let queried_number = as_u64(pop!());
                push!(U256::from_be_bytes(ctx.block.block_hash(queried_number).0));
            }
            op::COINBASE => { charge!(2); push!(address_to_u256(ctx.block.coinbase)); }
            op::TIMESTAMP => { charge!(2); push!(U256::from(ctx.block.timestamp)); }
            op::NUMBER => { charge!(2); push!(U256::from(ctx.block.number)); }
            op::PREVRANDAO => { charge!(2); push!(U256::from_be_bytes(ctx.block.prev_randao.0)); }
            op::GASLIMIT => { charge!(2); push!(U256::from(ctx.block.gas_limit)); }
            op::CHAINID => { charge!(2); push!(ctx.config.chain_id); }
            op::SELFBALANCE => {
                charge!(5);
                push!(ctx.state.get_account(address).unwrap_or_default().balance);
            }
            op::BASEFEE => { charge!(2); push!(U256::from(ctx.block.base_fee)); }
            op::BLOBHASH => {
                charge!(3);
                let index = as_usize(pop!());
                push!(ctx.tx.blob_hashes.get(index).map(|h| U256::from_be_bytes(h.0)).unwrap_or_default());
            }
            op::BLOBBASEFEE => { charge!(2); push!(U256::from(ctx.block.blob_base_fee)); }

            op::POP => { charge!(2); let _ = pop!(); }
            op::MLOAD => {
                let offset = as_usize(pop!());
                ensure_memory!(offset as u64, 32);
                charge!(3);
                push!(match memory.load(offset) {
                    Ok(v) => v,
                    Err(e) => return Frame::halted(e),
                });
            }
            op::MSTORE => {
                let (offset, value) = (pop!(), pop!());
                let offset = as_usize(offset);
                ensure_memory!(offset as u64, 32);
                charge!(3);
                if let Err(e) = memory.store(offset, value) {
                    return Frame::halted(e);
                }
            }
            op::MSTORE8 => {
                let (offset, value) = (pop!(), pop!());
                let offset = as_usize(offset);
                ensure_memory!(offset as u64, 1);
                charge!(3);
                if let Err(e) = memory.store_byte(offset, value.byte(0)) {
                    return Frame::halted(e);
                }
            }
            op::SLOAD => {
                let key = U256::to_be_bytes::<32>(pop!()).into();
                let cold = ctx.access_storage_slot(address, key, berlin);
                charge!(WARM_SLOAD_COST + if cold { COLD_SLOAD_COST - WARM_SLOAD_COST } else { 0 });
                ctx.bal.record_storage_read(address, key);
                push!(ctx.state.get_storage(address, key));
            }
            op::SSTORE => {
                if gas <= SSTORE_STIPEND {
                    return Frame::halted(FrameError::OutOfGas);
                }
                let (key, new_value) = (pop!(), pop!());
                let key: B256 = U256::to_be_bytes::<32>(key).into();
                // EIP-2929 charges the full cold-SLOAD cost as SSTORE's cold-slot surcharge, not
                // the SLOAD warm-base delta.
                let cold_surcharge = if ctx.access_storage_slot(address, key, berlin) {
                    COLD_SLOAD_COST
                } else {
                    0
                };
                let current = ctx.state.get_storage(address, key);
                let original = ctx.state.get_storage_original(address, key);
                let cost = sstore_cost(current, original, new_value) + cold_surcharge;
                charge!(cost);
                refund += sstore_refund(current, original, new_value);
                ctx.state.set_storage(address, key, new_value);
                ctx.bal.record_storage_write(address, key, new_value);
            }
            op::JUMP => {
                charge!(8);
                let dest = as_usize(pop!());
                if !valid_jumpdests.get(dest).copied().unwrap_or(false) {
                    return Frame::halted(FrameError::InvalidJumpDest);
                }
                pc = dest;
                continue;
            }
            op::JUMPI => {
                charge!(10);
                let (dest, cond) = (pop!(), pop!());
                if !cond.is_zero() {
                    let dest = as_usize(dest);
                    if !valid_jumpdests.get(dest).copied().unwrap_or(false) {
                        return Frame::halted(FrameError::InvalidJumpDest);
                    }
                    pc = dest;
                    continue;
                }
            }
            op::PC => { charge!(2); push!(U256::from(pc as u64)); }
            op::MSIZE => { charge!(2); push!(U256::from(memory.len() as u64)); }
            op::GAS => { charge!(2); push!(U256::from(gas.saturating_sub(2))); }
            op::JUMPDEST => { charge!(1); }
            op::TLOAD => {
                charge!(100);
                let key: B256 = U256::to_be_bytes::<32>(pop!()).into();
                push!(ctx.state.get_transient_storage(address, key));
            }
            op::TSTORE => {
                charge!(100);
                let (key, value) = (pop!(), pop!());
                let key: B256 = U256::to_be_bytes::<32>(key).into();
                ctx.state.set_transient_storage(address, key, value);
            }
            op::MCOPY => {
                let (dest, offset, len) = (pop!(), pop!(), pop!());
                let (dest, offset, len) = (as_usize(dest), as_usize(offset), as_usize(len));
                ensure_memory!(dest.max(offset) as u64, len as u64);
                charge!(3 + 3 * bytes_to_words(len as u64));
                let data = memory.load_padded(offset, len);
                if let Err(e) = memory.set_slice(dest, &data) {
                    return Frame::halted(e);
                }
            }
            op::PUSH0 => { charge!(2); push!(U256::ZERO); }

            n if (op::PUSH1..=op::PUSH32).contains(&n) => {
                charge!(3);
                let len = (n - op::PUSH1 + 1) as usize;
                let bytes = code.get(pc + 1..pc + 1 + len).unwrap_or(&[]);
                let mut padded = [0u8; 32];
                padded[32 - bytes.len()..].copy_from_slice(bytes);
                push!(U256::from_be_bytes(padded));
                pc += len + 1;
                continue;
            }
            n if (op::DUP1..=op::DUP16).contains(&n) => {
                charge!(3);
                let depth = (n - op::DUP1 + 1) as usize;
                let value = match stack.peek(depth) {
                    Ok(v) => v,
                    Err(e) => return Frame::halted(e),
                };
                push!(value);
            }
            n if (op::SWAP1..=op::SWAP16).contains(&n) => {
                charge!(3);
                let depth = (n - op::SWAP1 + 1) as usize;
                if let Err(e) = stack.swap_from_top(depth) {
                    return Frame::halted(e);
                }
            }
            n if (op::LOG0..=op::LOG4).contains(&n) => {
                let topic_count = (n - op::LOG0) as usize;
                let (offset, len) = (pop!(), pop!());
                let (offset, len) = (as_usize(offset), as_usize(len));
                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    topics.push(U256::to_be_bytes::<32>(pop!()).into());
                }
                ensure_memory!(offset as u64, len as u64);
                charge!(375 + 375 * topic_count as u64 + 8 * len as u64);
                let data = memory.load_padded(offset, len);
                ctx.logs.push(Log {
                    address,
                    data: LogData::new(topics, data.into()).unwrap_or_default(),
                });
            }

            op::CREATE | op::CREATE2 => {
                let (value, offset, len) = (pop!(), pop!(), pop!());
                let salt = if opcode == op::CREATE2 { Some(pop!()) } else { None };
                let (offset, len) = (as_usize(offset), as_usize(len));
                ensure_memory!(offset as u64, len as u64);
                let init_code = memory.load_padded(offset, len);
                if opcode == op::CREATE2 {
                    charge!(32_000 + 6 * bytes_to_words(len as u64));
                } else {
                    charge!(32_000);
                }

                let sender_nonce = ctx.state.get_account(address).unwrap_or_default().nonce;
                let new_address = match salt {
                    Some(salt) => create2_address(address, U256::to_be_bytes::<32>(salt).into(), &init_code),
                    None => create_address(address, sender_nonce),
                };

                let child_gas = call_gas_with_stipend(gas, gas);
                charge!(child_gas);
                let child_msg = Message::Create {
                    caller: address,
                    new_address,
                    value,
                    init_code: init_code.into(),
                    gas_limit: child_gas,
                };
                let child = execute_frame(ctx, child_msg, depth + 1);
                gas += child.gas_left;
                if child.success {
                    refund += child.gas_refund;
                    push!(address_to_u256(new_address));
                } else {
                    push!(U256::ZERO);
                }
                return_data = child.output;
            }

            op::CALL | op::CALLCODE | op::DELEGATECALL | op::STATICCALL => {
                let scheme = match opcode {
                    op::CALL => CallScheme::Call,
                    op::CALLCODE => CallScheme::CallCode,
                    op::DELEGATECALL => CallScheme::DelegateCall,
                    _ => CallScheme::StaticCall,
                };
                let requested_gas = as_u64(pop!());
                let target = u256_to_address(pop!());
                let value = if matches!(scheme, CallScheme::DelegateCall | CallScheme::StaticCall) {
                    U256::ZERO
                } else {
                    pop!()
                };
                let (in_off, in_len) = (pop!(), pop!());
                let (out_off, out_len) = (pop!(), pop!());
                let (in_off, in_len) = (as_usize(in_off), as_usize(in_len));
                let (out_off, out_len) = (as_usize(out_off), as_usize(out_len));

                ensure_memory!(in_off.max(out_off) as u64, in_len.max(out_len) as u64);
                let access_cost = ctx.access_address(target, berlin);
                let value_transfer_cost = if !value.is_zero() { 9_000 } else { 0 };
                let new_account_cost =
                    if !ctx.state.account_exists(target) && !value.is_zero() { 25_000 } else { 0 };
                charge!(WARM_ACCOUNT_ACCESS_COST + access_cost + value_transfer_cost + new_account_cost);

                if matches!(scheme, CallScheme::StaticCall) && !value.is_zero() {
                    return Frame::halted(FrameError::WriteInStaticContext);
                }

                let gas_stipend = if !value.is_zero() { 2_300 } else { 0 };
                let available = call_gas_with_stipend(requested_gas, gas);
                charge!(available);
                let child_gas = available + gas_stipend;

                let input = memory.load_padded(in_off, in_len);
                let (storage_address, child_caller, child_value) = match scheme {
                    CallScheme::Call | CallScheme::StaticCall => (target, address, value),
                    CallScheme::CallCode => (address, address, value),
                    CallScheme::DelegateCall => (address, caller, call_value),
                };
                let child_msg = Message::Call {
                    scheme,
                    code_address: target,
                    storage_address,
                    caller: child_caller,
                    value: child_value,
                    input: input.into(),
                    gas_limit: child_gas,
                    is_static: is_static || matches!(scheme, CallScheme::StaticCall),
                };
                let child = execute_frame(ctx, child_msg, depth + 1);
                // Whatever of `child_gas` (including any unconsumed stipend) the child didn't
                // spend returns to the caller.
                gas += child.gas_left;
                if child.success {
                    refund += child.gas_refund;
                }
                let copy_len = out_len.min(child.output.len());
                if let Err(e) = memory.set_slice(out_off, &child.output[..copy_len]) {
                    return Frame::halted(e);
                }
                push!(bool_to_u256(child.success));
                return_data = child.output;
            }

            op::RETURN => {
                let (offset, len) = (pop!(), pop!());
                let (offset, len) = (as_usize(offset), as_usize(len));
                ensure_memory!(offset as u64, len as u64);
                let output = memory.load_padded(offset, len);
                return Frame::returned(gas, refund, output.into());
            }
            op::REVERT => {
                let (offset, len) = (pop!(), pop!());
                let (offset, len) = (as_usize(offset), as_usize(len));
                ensure_memory!(offset as u64, len as u64);
                let output = memory.load_padded(offset, len);
                return Frame::reverted(gas, output.into());
            }
            op::INVALID => return Frame::halted(FrameError::InvalidOpcode(op::INVALID)),
            op::SELFDESTRUCT => {
                charge!(5_000);
                let beneficiary = u256_to_address(pop!());
                let balance = ctx.state.get_account(address).unwrap_or_default().balance;
                if !ctx.state.account_exists(beneficiary) && !balance.is_zero() {
                    charge!(25_000);
                }
                ctx.access_address(beneficiary, berlin);
                ctx.state.move_ether(address, beneficiary, balance);
                if !cancun {
                    ctx.state.destroy_account(address);
                    refund += 24_000;
                }
                return Frame::returned(gas, refund, alloy_primitives::Bytes::new());
            }

            other => return Frame::halted(FrameError::InvalidOpcode(other)),
        }

        pc += 1;
    }
}

/// Whether `opcode` mutates state and is therefore forbidden in a static context.
fn is_write_opcode(opcode: u8) -> bool {
    matches!(opcode, op::SSTORE | op::CREATE | op::CREATE2 | op::SELFDESTRUCT)
        || (op::LOG0..=op::LOG4).contains(&opcode)
}

fn sstore_cost(current: U256, original: U256, new: U256) -> u64 {
    if current == new {
        return WARM_SLOAD_COST;
    }
    if current == original {
        if original.is_zero() {
            SSTORE_SET_COST
        } else {
            SSTORE_RESET_COST
        }
    } else {
        WARM_SLOAD_COST
    }
}

fn sstore_refund(current: U256, original: U256, new: U256) -> i64 {
    const CLEAR_REFUND: i64 = 4_800;
    let mut refund = 0i64;
    if current == new {
        return 0;
    }
    if current == original {
        if !original.is_zero() && new.is_zero() {
            refund += CLEAR_REFUND;
        }
    } else {
        if !original.is_zero() {
            if current.is_zero() {
                refund -= CLEAR_REFUND;
            }
            if new.is_zero() {
                refund += CLEAR_REFUND;
            }
        }
        if original == new {
            refund += if original.is_zero() {
                (SSTORE_SET_COST - WARM_SLOAD_COST) as i64
            } else {
                (SSTORE_RESET_COST - WARM_SLOAD_COST) as i64
            };
        }
    }
    refund
}

fn signed_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let (sign_a, mag_a) = to_signed(a);
    let (sign_b, mag_b) = to_signed(b);
    let quotient = mag_a / mag_b;
    let sign = if sign_a == sign_b { Sign::Positive } else { Sign::Negative };
    from_signed(sign, quotient)
}

fn signed_mod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let (sign_a, mag_a) = to_signed(a);
    let (_, mag_b) = to_signed(b);
    from_signed(sign_a, mag_a % mag_b)
}

fn addmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::ZERO;
    }
    a.add_mod(b, m)
}

fn mulmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::ZERO;
    }
    a.mul_mod(b, m)
}

fn sign_extend(size: U256, value: U256) -> U256 {
    if size >= U256::from(32u64) {
        return value;
    }
    let byte_index = size.byte(0) as u32;
    let bit_index = byte_index * 8 + 7;
    if value.bit(bit_index as usize) {
        let mask = (U256::from(1u64) << (bit_index + 1)) - U256::from(1u64);
        value | !mask
    } else {
        let mask = (U256::from(1u64) << (bit_index + 1)) - U256::from(1u64);
        value & mask
    }
}

fn byte_at(index: U256, value: U256) -> U256 {
    if index >= U256::from(32u64) {
        U256::ZERO
    } else {
        U256::from(value.byte(31 - index.byte(0) as usize))
    }
}

fn arithmetic_shift_right(shift: U256, value: U256) -> U256 {
    let negative = value.bit(255);
    let shift = clamp_shift(shift);
    if shift >= 256 {
        return if negative { U256::MAX } else { U256::ZERO };
    }
    let shifted = value >> shift;
    if !negative {
        return shifted;
    }
    let fill_mask = U256::MAX << (256 - shift);
    shifted | fill_mask
}

fn bool_to_u256(b: bool) -> U256 {
    if b {
        U256::from(1u64)
    } else {
        U256::ZERO
    }
}

fn as_usize(value: U256) -> usize {
    value.try_into().unwrap_or(usize::MAX)
}

fn as_u64(value: U256) -> u64 {
    value.try_into().unwrap_or(u64::MAX)
}

fn address_to_u256(address: Address) -> U256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_slice());
    U256::from_be_bytes(bytes)
}

fn u256_to_address(value: U256) -> Address {
    Address::from_slice(&value.to_be_bytes::<32>()[12..])
}

fn load_calldata_word(data: &[u8], offset: usize) -> U256 {
    let mut word = [0u8; 32];
    if offset < data.len() {
        let available = (data.len() - offset).min(32);
        word[..available].copy_from_slice(&data[offset..offset + available]);
    }
    U256::from_be_bytes(word)
}

fn copy_padded(data: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < data.len() {
        let available = (data.len() - offset).min(len);
        out[..available].copy_from_slice(&data[offset..offset + available]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_div_matches_two_complement_semantics() {
        let minus_one = U256::MAX;
        assert_eq!(signed_div(minus_one, U256::from(1u64)), minus_one);
    }

    #[test]
    fn sign_extend_of_positive_byte_is_a_no_op_past_32() {
        let value = U256::from(0x7fu64);
        assert_eq!(sign_extend(U256::from(31u64), value), value);
    }

    #[test]
    fn create_address_is_deterministic() {
        let sender = Address::repeat_byte(1);
        assert_eq!(create_address(sender, 0), create_address(sender, 0));
        assert_ne!(create_address(sender, 0), create_address(sender, 1));
    }

    #[test]
    fn create2_address_depends_on_salt() {
        let sender = Address::repeat_byte(1);
        let salt_a = B256::repeat_byte(2);
        let salt_b = B256::repeat_byte(3);
        assert_ne!(
            create2_address(sender, salt_a, &[0x60]),
            create2_address(sender, salt_b, &[0x60])
        );
    }

    #[test]
    fn sstore_set_cost_applies_to_a_fresh_zero_slot() {
        assert_eq!(sstore_cost(U256::ZERO, U256::ZERO, U256::from(1u64)), SSTORE_SET_COST);
    }

    #[test]
    fn sstore_no_op_is_cheap() {
        let v = U256::from(5u64);
        assert_eq!(sstore_cost(v, v, v), WARM_SLOAD_COST);
    }

    fn test_block_context(number: u64, ancestor_hashes: VecDeque<B256>) -> BlockContext {
        BlockContext {
            number,
            timestamp: 0,
            coinbase: Address::ZERO,
            gas_limit: 30_000_000,
            base_fee: 0,
            prev_randao: B256::ZERO,
            blob_base_fee: 0,
            ancestor_hashes,
        }
    }

    #[test]
    fn block_hash_returns_ancestor_within_window() {
        let hashes = VecDeque::from([B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)]);
        let ctx = test_block_context(10, hashes);
        assert_eq!(ctx.block_hash(9), B256::repeat_byte(3));
        assert_eq!(ctx.block_hash(7), B256::repeat_byte(1));
    }

    #[test]
    fn block_hash_is_zero_outside_the_256_window_or_at_or_after_current() {
        let hashes: VecDeque<B256> = (0..300).map(|i| B256::repeat_byte(i as u8)).collect();
        let ctx = test_block_context(400, hashes);
        assert_eq!(ctx.block_hash(400), B256::ZERO);
        assert_eq!(ctx.block_hash(401), B256::ZERO);
        assert_eq!(ctx.block_hash(400 - 257), B256::ZERO);
        assert_ne!(ctx.block_hash(400 - 1), B256::ZERO);
    }

    #[test]
    fn sstore_cold_reset_charges_the_full_cold_sload_surcharge() {
        let v = U256::from(5u64);
        let cost = sstore_cost(v, v, U256::from(6u64)) + COLD_SLOAD_COST;
        assert_eq!(cost, SSTORE_RESET_COST + COLD_SLOAD_COST);
        assert_eq!(cost, 5_000);
    }
}
