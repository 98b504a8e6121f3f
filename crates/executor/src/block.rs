//! The block pipeline (C10): header validation against the parent, the pre-block system calls,
//! the per-transaction admissibility/execution/settlement loop, withdrawals, the post-block
//! system calls, and the final comparison of computed commitments against the candidate header.

use std::collections::{HashSet, VecDeque};

use alloy_consensus::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};
use alloy_primitives::{keccak256, logs_bloom, Address, Bloom, Bytes, Log, B64, B256, U256};
use alloy_rlp::{Encodable, Header as RlpHeader, RlpDecodable, RlpEncodable};
use corevm_mpt::ordered_trie_root;

use crate::bal::BlockAccessListTracker;
use crate::config::ForkConfig;
use crate::constants::{
    BASE_FEE_MAX_CHANGE_DENOMINATOR, ELASTICITY_MULTIPLIER, GAS_LIMIT_ADJUSTMENT_FACTOR,
    GAS_LIMIT_MINIMUM, GAS_PER_BLOB, MAX_BLOB_GAS_PER_BLOCK, TARGET_BLOB_GAS_PER_BLOCK,
    VERSIONED_HASH_VERSION_KZG,
};
use crate::errors::{BlockError, BlockResult};
use crate::evm::{
    create_address, execute_frame, BlockContext, CallScheme, ExecutionContext, Message, TxContext,
};
use crate::gas::{blob_base_fee, capped_refund, intrinsic_gas, IntrinsicGasInput};
use crate::state::{Account, JournaledState};
use crate::system;
use crate::tx::{delegation_designator, resolve_delegation, RecoveredTransaction, Transaction, TxEnvelope};
use tracing::instrument;

/// Reject blocks whose RLP encoding would exceed this many bytes, a safety margin under the
/// informal 10 MiB network gossip cap.
const MAX_BLOCK_RLP_SIZE: usize = 8 * 1024 * 1024;

const GWEI_TO_WEI: u64 = 1_000_000_000;

/// An Ethereum block header. Optional fields are `None` exactly when the fork that introduced
/// them is not yet active for this header's number/timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hash of the parent block's header.
    pub parent_hash: B256,
    /// `keccak256(rlp([]))`, the empty ommers list. Never anything else post-Merge.
    pub ommers_hash: B256,
    /// Fee recipient.
    pub coinbase: Address,
    /// Root of the accounts trie after this block's transitions.
    pub state_root: B256,
    /// Root of the ordered-list trie over this block's transactions.
    pub transactions_root: B256,
    /// Root of the ordered-list trie over this block's receipts.
    pub receipts_root: B256,
    /// Bitwise OR of every receipt's bloom filter.
    pub logs_bloom: Bloom,
    /// Always zero post-Merge.
    pub difficulty: U256,
    /// `parent.number + 1`.
    pub number: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Sum of every transaction's gas used.
    pub gas_used: u64,
    /// Unix timestamp.
    pub timestamp: u64,
    /// At most 32 bytes.
    pub extra_data: Bytes,
    /// `PREVRANDAO`, the beacon chain's RANDAO mix (the Merge repurposed the `mixHash` field).
    pub prev_randao: B256,
    /// Always zero post-Merge.
    pub nonce: B64,
    /// EIP-1559 base fee.
    pub base_fee_per_gas: Option<u128>,
    /// Root of the ordered-list trie over this block's withdrawals (Shanghai+).
    pub withdrawals_root: Option<B256>,
    /// Total blob gas consumed by this block's transactions (Cancun+).
    pub blob_gas_used: Option<u64>,
    /// EIP-4844 excess blob gas (Cancun+).
    pub excess_blob_gas: Option<u64>,
    /// Beacon chain root at the start of this slot (Cancun+).
    pub parent_beacon_block_root: Option<B256>,
    /// EIP-7685 `requests_hash` (Prague+).
    pub requests_hash: Option<B256>,
    /// EIP-7928 Block Access List hash (Osaka+).
    pub bal_hash: Option<B256>,
}

impl BlockHeader {
    fn fields(&self) -> Vec<&dyn Encodable> {
        let mut fields: Vec<&dyn Encodable> = vec![
            &self.parent_hash,
            &self.ommers_hash,
            &self.coinbase,
            &self.state_root,
            &self.transactions_root,
            &self.receipts_root,
            &self.logs_bloom,
            &self.difficulty,
            &self.number,
            &self.gas_limit,
            &self.gas_used,
            &self.timestamp,
            &self.extra_data,
            &self.prev_randao,
            &self.nonce,
        ];
        if let Some(v) = &self.base_fee_per_gas {
            fields.push(v);
        }
        if let Some(v) = &self.withdrawals_root {
            fields.push(v);
        }
        if let Some(v) = &self.blob_gas_used {
            fields.push(v);
        }
        if let Some(v) = &self.excess_blob_gas {
            fields.push(v);
        }
        if let Some(v) = &self.parent_beacon_block_root {
            fields.push(v);
        }
        if let Some(v) = &self.requests_hash {
            fields.push(v);
        }
        if let Some(v) = &self.bal_hash {
            fields.push(v);
        }
        fields
    }

    /// `keccak256(rlp(self))`, this header's block hash.
    pub fn hash(&self) -> B256 {
        let fields = self.fields();
        let payload_length: usize = fields.iter().map(|f| f.length()).sum();
        let mut buf = Vec::with_capacity(payload_length + 8);
        RlpHeader { list: true, payload_length }.encode(&mut buf);
        for field in &fields {
            field.encode(&mut buf);
        }
        keccak256(buf)
    }
}

/// A withdrawal processed by the Shanghai+ withdrawal sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Withdrawal {
    /// Monotonically increasing withdrawal index.
    pub index: u64,
    /// Index of the withdrawing validator.
    pub validator_index: u64,
    /// Recipient of the withdrawn funds.
    pub address: Address,
    /// Amount, in Gwei.
    pub amount: u64,
}

/// A candidate block: a header plus the canonically encoded transactions and withdrawals the
/// header's roots are supposed to commit to.
#[derive(Debug, Clone)]
pub struct Block {
    /// The candidate header.
    pub header: BlockHeader,
    /// Canonically (EIP-2718) encoded transactions, in block order.
    pub transactions: Vec<Bytes>,
    /// Withdrawals to apply after the transaction loop.
    pub withdrawals: Vec<Withdrawal>,
}

/// The environment every transaction in a block observes: values derived once per block and held
/// constant across the whole transaction loop.
#[derive(Debug, Clone)]
pub struct BlockEnvironment {
    /// The chain id transactions must be bound to.
    pub chain_id: U256,
    /// Fee recipient.
    pub coinbase: Address,
    /// Block number.
    pub number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// EIP-1559 base fee.
    pub base_fee: u128,
    /// `PREVRANDAO`.
    pub prev_randao: B256,
    /// EIP-4844 excess blob gas.
    pub excess_blob_gas: u64,
    /// Beacon root supplied to the EIP-4788 pre-block call.
    pub parent_beacon_block_root: Option<B256>,
}

/// The externally observable result of executing a block: the roots and totals the caller
/// compared against the header, returned so callers that only want the numbers don't need to
/// re-derive them.
#[derive(Debug, Clone)]
pub struct ExecutedBlock {
    /// The validated header (identical to the input header; every field has been checked against
    /// a freshly computed commitment).
    pub header: BlockHeader,
    /// Sum of every transaction's gas used.
    pub gas_used: u64,
    /// The committed state root.
    pub state_root: B256,
    /// The block's receipts root.
    pub receipts_root: B256,
    /// The block's logs bloom.
    pub logs_bloom: Bloom,
    /// The Block Access List hash, if Osaka is active for this block.
    pub bal_hash: Option<B256>,
}

/// One transaction's receipt: the post-state indicator, cumulative gas, bloom, and logs.
struct Receipt {
    tx_type: Option<u8>,
    succeeded: bool,
    cumulative_gas_used: u64,
    logs: Vec<Log>,
}

impl Receipt {
    fn bloom(&self) -> Bloom {
        logs_bloom(self.logs.iter())
    }

    fn encode_canonical(&self) -> Bytes {
        let succeeded: u8 = self.succeeded as u8;
        let bloom = self.bloom();
        let fields: [&dyn Encodable; 4] =
            [&succeeded, &self.cumulative_gas_used, &bloom, &self.logs];
        let payload_length: usize = fields.iter().map(|f| f.length()).sum();
        let mut out = Vec::with_capacity(payload_length + 9);
        if let Some(tx_type) = self.tx_type {
            out.push(tx_type);
        }
        RlpHeader { list: true, payload_length }.encode(&mut out);
        for field in &fields {
            field.encode(&mut out);
        }
        out.into()
    }
}

/// Computes the next block's EIP-1559 base fee from the parent's gas usage.
fn next_base_fee(parent_gas_used: u64, parent_gas_limit: u64, parent_base_fee: u128) -> u128 {
    let parent_gas_target = (parent_gas_limit / ELASTICITY_MULTIPLIER).max(1) as u128;
    match parent_gas_used.cmp(&(parent_gas_target as u64)) {
        std::cmp::Ordering::Equal => parent_base_fee,
        std::cmp::Ordering::Greater => {
            let gas_used_delta = (parent_gas_used as u128) - parent_gas_target;
            let base_fee_delta = (parent_base_fee * gas_used_delta
                / parent_gas_target
                / BASE_FEE_MAX_CHANGE_DENOMINATOR as u128)
                .max(1);
            parent_base_fee + base_fee_delta
        }
        std::cmp::Ordering::Less => {
            let gas_used_delta = parent_gas_target - parent_gas_used as u128;
            let base_fee_delta = parent_base_fee * gas_used_delta
                / parent_gas_target
                / BASE_FEE_MAX_CHANGE_DENOMINATOR as u128;
            parent_base_fee.saturating_sub(base_fee_delta)
        }
    }
}

/// Computes the next block's EIP-4844 excess blob gas from the parent's.
fn next_excess_blob_gas(parent_excess_blob_gas: u64, parent_blob_gas_used: u64) -> u64 {
    (parent_excess_blob_gas + parent_blob_gas_used).saturating_sub(TARGET_BLOB_GAS_PER_BLOCK)
}

/// Whether `gas_limit` is a legal successor to `parent_gas_limit`.
fn check_gas_limit(gas_limit: u64, parent_gas_limit: u64) -> bool {
    if gas_limit < GAS_LIMIT_MINIMUM {
        return false;
    }
    let max_delta = (parent_gas_limit / GAS_LIMIT_ADJUSTMENT_FACTOR).max(1);
    gas_limit.abs_diff(parent_gas_limit) < max_delta
}

/// Validates a candidate transaction against its sender account and this block's fee market,
/// returning the effective gas price and (for blob transactions) blob base fee it will be charged.
fn check_admissibility(
    tx: &TxEnvelope,
    sender: &Account,
    base_fee: u128,
    excess_blob_gas: u64,
    chain_id: U256,
) -> Result<(u128, u128), &'static str> {
    if let Some(id) = tx.chain_id() {
        if id != chain_id {
            return Err("transaction chain id does not match this chain");
        }
    }

    let (priority_fee, max_fee) = tx.fee_fields();
    if priority_fee > max_fee {
        return Err("max priority fee per gas exceeds max fee per gas");
    }
    if max_fee < base_fee {
        return Err("max fee per gas is below the block base fee");
    }
    let effective_gas_price = base_fee + priority_fee.min(max_fee - base_fee);

    let mut blob_fee = 0u128;
    let blob_hashes = tx.blob_versioned_hashes();
    if matches!(tx, TxEnvelope::Eip4844(_)) {
        if tx.to().is_none() {
            return Err("blob transactions cannot create contracts");
        }
        if blob_hashes.is_empty() || blob_hashes.len() > 6 {
            return Err("blob count out of range");
        }
        if blob_hashes.iter().any(|h| h[0] != VERSIONED_HASH_VERSION_KZG) {
            return Err("versioned hash has the wrong version byte");
        }
        blob_fee = blob_base_fee(excess_blob_gas) as u128;
        if tx.max_fee_per_blob_gas().unwrap_or(0) < blob_fee {
            return Err("max fee per blob gas is below the block blob base fee");
        }
    }

    if matches!(tx, TxEnvelope::Eip7702(_)) {
        if tx.authorization_list().is_empty() {
            return Err("set-code transaction carries no authorizations");
        }
        if tx.to().is_none() {
            return Err("set-code transactions cannot create contracts");
        }
    }

    if tx.nonce() != sender.nonce {
        return Err("transaction nonce does not match sender account nonce");
    }
    if !sender.code.is_empty() && resolve_delegation(&sender.code).is_none() {
        return Err("sender account has non-delegation code");
    }

    let blob_gas = blob_hashes.len() as u64 * GAS_PER_BLOB;
    let max_total_cost = U256::from(tx.gas_limit()) * U256::from(max_fee)
        + tx.value()
        + U256::from(blob_gas) * U256::from(tx.max_fee_per_blob_gas().unwrap_or(0));
    if sender.balance < max_total_cost {
        return Err("sender balance cannot cover the maximum possible transaction cost");
    }

    Ok((effective_gas_price, blob_fee))
}

fn intrinsic_gas_input(tx: &TxEnvelope) -> IntrinsicGasInput {
    let access_list = tx.access_list();
    IntrinsicGasInput {
        is_create: tx.to().is_none(),
        access_list_addresses: access_list.len() as u64,
        access_list_storage_keys: access_list.iter().map(|item| item.storage_keys.len() as u64).sum(),
        authorization_count: tx.authorization_list().len() as u64,
    }
}

/// Executes candidate blocks against a journaled world state, one block at a time.
#[derive(Debug)]
pub struct BlockExecutor<'a> {
    config: &'a ForkConfig,
    parent_header: BlockHeader,
    state: JournaledState,
    /// Ancestor hashes seen so far, oldest first, capped at 256, for `BLOCKHASH` (C7).
    ancestor_hashes: VecDeque<B256>,
}

impl<'a> BlockExecutor<'a> {
    pub(crate) fn new(config: &'a ForkConfig, parent_header: BlockHeader, state: JournaledState) -> Self {
        Self { config, parent_header, state, ancestor_hashes: VecDeque::new() }
    }

    /// Starts building a [`BlockExecutor`].
    pub fn builder(config: &'a ForkConfig) -> crate::builder::BlockExecutorBuilder<'a> {
        crate::builder::BlockExecutorBuilder::new(config)
    }

    /// The world state as of the last successfully executed block.
    pub fn state(&self) -> &JournaledState {
        &self.state
    }

    /// The header execution is currently building on top of.
    pub fn parent_header(&self) -> &BlockHeader {
        &self.parent_header
    }

    fn validate_header(&self, header: &BlockHeader) -> BlockResult<()> {
        let parent = &self.parent_header;
        if header.number != parent.number + 1 {
            return Err(BlockError::InvalidBlockNumber { got: header.number, parent: parent.number });
        }
        if header.timestamp <= parent.timestamp {
            return Err(BlockError::InvalidHeader("timestamp does not advance past the parent"));
        }
        if header.extra_data.len() > 32 {
            return Err(BlockError::InvalidHeader("extra data exceeds 32 bytes"));
        }
        if !header.difficulty.is_zero() {
            return Err(BlockError::InvalidHeader("post-Merge difficulty must be zero"));
        }
        if header.nonce != B64::ZERO {
            return Err(BlockError::InvalidHeader("post-Merge nonce must be zero"));
        }
        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            return Err(BlockError::InvalidHeader("ommers hash must be the empty list hash"));
        }
        if header.parent_hash != parent.hash() {
            return Err(BlockError::InvalidHeader("parent hash does not match the parent header"));
        }
        if header.gas_used > header.gas_limit {
            return Err(BlockError::InvalidHeader("gas used exceeds gas limit"));
        }
        if !check_gas_limit(header.gas_limit, parent.gas_limit) {
            return Err(BlockError::InvalidHeader("gas limit adjustment exceeds the allowed delta"));
        }

        if self.config.is_london_active(header.number, header.timestamp) {
            let parent_base_fee = parent.base_fee_per_gas.unwrap_or(0);
            let expected = next_base_fee(parent.gas_used, parent.gas_limit, parent_base_fee);
            if header.base_fee_per_gas != Some(expected) {
                return Err(BlockError::InvalidHeader("base fee does not match the EIP-1559 formula"));
            }
        }

        if self.config.is_cancun_active(header.number, header.timestamp) {
            let expected = next_excess_blob_gas(
                parent.excess_blob_gas.unwrap_or(0),
                parent.blob_gas_used.unwrap_or(0),
            );
            if header.excess_blob_gas != Some(expected) {
                return Err(BlockError::InvalidHeader(
                    "excess blob gas does not match the EIP-4844 formula",
                ));
            }
        }

        Ok(())
    }

    /// Executes `block` against the current world state, committing its effects and advancing
    /// this executor's parent header on success. Returns every commitment the caller may want
    /// without re-deriving it, after checking each against the header.
    #[instrument(skip_all, fields(number = block.header.number, tx_count = block.transactions.len()))]
    pub fn execute_block(&mut self, block: &Block) -> BlockResult<ExecutedBlock> {
        let approx_size: usize =
            block.transactions.iter().map(|raw| raw.len()).sum::<usize>() + block.header.fields().len() * 32;
        if approx_size > MAX_BLOCK_RLP_SIZE {
            return Err(BlockError::InvalidHeader("block exceeds the maximum encoded size"));
        }

        self.validate_header(&block.header)?;

        if self.ancestor_hashes.back() != Some(&self.parent_header.hash()) {
            self.ancestor_hashes.push_back(self.parent_header.hash());
            if self.ancestor_hashes.len() > 256 {
                self.ancestor_hashes.pop_front();
            }
        }

        let header = &block.header;
        let cancun_active = self.config.is_cancun_active(header.number, header.timestamp);
        let shanghai_active = self.config.is_shanghai_active(header.number, header.timestamp);
        let prague_active = self.config.is_prague_active(header.number, header.timestamp);
        let osaka_active = self.config.is_osaka_active(header.number, header.timestamp);
        let spurious_dragon_active =
            self.config.is_spurious_dragon_active(header.number, header.timestamp);

        let env = BlockEnvironment {
            chain_id: self.config.chain_id,
            coinbase: header.coinbase,
            number: header.number,
            timestamp: header.timestamp,
            base_fee: header.base_fee_per_gas.unwrap_or(0),
            prev_randao: header.prev_randao,
            excess_blob_gas: header.excess_blob_gas.unwrap_or(0),
            parent_beacon_block_root: header.parent_beacon_block_root,
        };
        let block_ctx = BlockContext {
            number: env.number,
            timestamp: env.timestamp,
            coinbase: env.coinbase,
            gas_limit: header.gas_limit,
            base_fee: env.base_fee,
            prev_randao: env.prev_randao,
            blob_base_fee: blob_base_fee(env.excess_blob_gas) as u128,
            ancestor_hashes: self.ancestor_hashes.clone(),
        };

        let mut bal = BlockAccessListTracker::new(osaka_active);

        self.state.begin_transaction();
        bal.set_tx_index(0);
        {
            let mut warm_addresses = HashSet::new();
            let mut warm_storage = HashSet::new();
            let mut logs = Vec::new();
            let system_tx = TxContext { origin: Address::ZERO, gas_price: 0, blob_hashes: Vec::new() };
            let mut ctx = ExecutionContext {
                state: &mut self.state,
                config: self.config,
                block: &block_ctx,
                tx: &system_tx,
                warm_addresses: &mut warm_addresses,
                warm_storage: &mut warm_storage,
                logs: &mut logs,
                bal: &mut bal,
            };
            if cancun_active {
                system::apply_beacon_root(&mut ctx, header.parent_beacon_block_root.unwrap_or_default());
            }
            if prague_active {
                system::apply_history_storage(&mut ctx, header.parent_hash);
            }
        }
        self.finalize_transaction(&mut bal, spurious_dragon_active);

        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut all_logs: Vec<Log> = Vec::new();
        let mut deposit_logs: Vec<Log> = Vec::new();
        let mut cumulative_gas_used = 0u64;
        let mut cumulative_blob_gas_used = 0u64;

        for (index, raw) in block.transactions.iter().enumerate() {
            let recovered = RecoveredTransaction::decode_and_recover(raw)
                .map_err(|_| BlockError::InvalidSignature(index))?;
            let tx = &recovered.envelope;
            let sender_addr = recovered.sender;

            let sender = self.state.get_account(sender_addr).unwrap_or_default();
            let (effective_gas_price, blob_fee) = check_admissibility(
                tx,
                &sender,
                block_ctx.base_fee,
                header.excess_blob_gas.unwrap_or(0),
                self.config.chain_id,
            )
            .map_err(|reason| BlockError::InadmissibleTransaction { index, reason })?;

            let execution_intrinsic = intrinsic_gas(tx.input(), intrinsic_gas_input(tx), false);
            let floored_intrinsic = intrinsic_gas(tx.input(), intrinsic_gas_input(tx), prague_active);
            if tx.gas_limit() < floored_intrinsic {
                return Err(BlockError::InadmissibleTransaction {
                    index,
                    reason: "gas limit is below the transaction's intrinsic gas",
                });
            }
            if cumulative_gas_used + tx.gas_limit() > header.gas_limit {
                return Err(BlockError::GasUsedExceedsLimit(index));
            }
            let tx_blob_gas = tx.blob_versioned_hashes().len() as u64 * GAS_PER_BLOB;
            if cumulative_blob_gas_used + tx_blob_gas > MAX_BLOB_GAS_PER_BLOCK {
                return Err(BlockError::BlobGasLimitExceeded);
            }
            cumulative_blob_gas_used += tx_blob_gas;

            self.state.begin_transaction();
            bal.set_tx_index((index + 1) as u32);

            let upfront_cost = U256::from(tx.gas_limit()) * U256::from(effective_gas_price)
                + U256::from(tx_blob_gas) * U256::from(blob_fee);
            {
                let mut debited = sender.clone();
                debited.balance -= upfront_cost;
                debited.nonce += 1;
                self.state.set_account(sender_addr, &debited);
            }

            if let TxEnvelope::Eip7702(eip7702) = tx {
                for auth in &eip7702.authorizations {
                    if !(auth.chain_id.is_zero() || auth.chain_id == self.config.chain_id) {
                        continue;
                    }
                    let Ok(authority) = auth.recover_authority() else { continue };
                    let account = self.state.get_account(authority).unwrap_or_default();
                    if !account.code.is_empty() && resolve_delegation(&account.code).is_none() {
                        continue;
                    }
                    if account.nonce != auth.nonce {
                        continue;
                    }
                    self.state.set_code(authority, delegation_designator(auth.address));
                    self.state.increment_nonce(authority);
                    bal.record_code_change(authority, delegation_designator(auth.address));
                    bal.record_nonce_change(authority, account.nonce + 1);
                }
            }

            let mut warm_addresses: HashSet<Address> = HashSet::from([sender_addr]);
            if let Some(to) = tx.to() {
                warm_addresses.insert(to);
            }
            if shanghai_active {
                warm_addresses.insert(header.coinbase);
            }
            let mut warm_storage: HashSet<(Address, B256)> = HashSet::new();
            for item in tx.access_list() {
                warm_addresses.insert(item.address);
                for key in &item.storage_keys {
                    warm_storage.insert((item.address, *key));
                }
            }

            let mut logs = Vec::new();
            let execution_gas = tx.gas_limit() - execution_intrinsic;
            let tx_ctx = TxContext {
                origin: sender_addr,
                gas_price: effective_gas_price,
                blob_hashes: tx.blob_versioned_hashes().to_vec(),
            };

            let frame = {
                let mut ctx = ExecutionContext {
                    state: &mut self.state,
                    config: self.config,
                    block: &block_ctx,
                    tx: &tx_ctx,
                    warm_addresses: &mut warm_addresses,
                    warm_storage: &mut warm_storage,
                    logs: &mut logs,
                    bal: &mut bal,
                };
                match tx.to() {
                    Some(to) => {
                        let msg = Message::Call {
                            scheme: CallScheme::Call,
                            code_address: to,
                            storage_address: to,
                            caller: sender_addr,
                            value: tx.value(),
                            input: Bytes::copy_from_slice(tx.input()),
                            gas_limit: execution_gas,
                            is_static: false,
                        };
                        execute_frame(&mut ctx, msg, 0)
                    }
                    None => {
                        let new_address = create_address(sender_addr, tx.nonce());
                        let msg = Message::Create {
                            caller: sender_addr,
                            new_address,
                            value: tx.value(),
                            init_code: Bytes::copy_from_slice(tx.input()),
                            gas_limit: execution_gas,
                        };
                        execute_frame(&mut ctx, msg, 0)
                    }
                }
            };

            let raw_gas_used = execution_intrinsic + (execution_gas - frame.gas_left);
            let refund = capped_refund(frame.gas_refund, raw_gas_used);
            let gas_used = (raw_gas_used - refund).max(floored_intrinsic);

            let refund_wei = U256::from(tx.gas_limit() - gas_used) * U256::from(effective_gas_price);
            let mut sender_after = self.state.get_account(sender_addr).unwrap_or_default();
            sender_after.balance += refund_wei;
            self.state.set_account(sender_addr, &sender_after);

            let priority_fee_per_gas = effective_gas_price - block_ctx.base_fee;
            if priority_fee_per_gas > 0 {
                let mut coinbase_account = self.state.get_account(header.coinbase).unwrap_or_default();
                coinbase_account.balance += U256::from(gas_used) * U256::from(priority_fee_per_gas);
                self.state.set_account(header.coinbase, &coinbase_account);
            } else {
                self.state.touch_account(header.coinbase);
            }

            let destroyed: Vec<Address> = self.state.accounts_to_delete().iter().copied().collect();
            for address in destroyed {
                self.state.delete_account(address);
            }

            if prague_active {
                deposit_logs.extend(logs.iter().cloned());
            }

            self.finalize_transaction(&mut bal, spurious_dragon_active);

            cumulative_gas_used += gas_used;
            let receipt = Receipt {
                tx_type: tx.tx_type(),
                succeeded: frame.success,
                cumulative_gas_used,
                logs: logs.clone(),
            };
            all_logs.append(&mut logs);
            receipts.push(receipt);
        }

        if header.gas_used != cumulative_gas_used {
            return Err(BlockError::CommitmentMismatch {
                field: "gas_used",
                expected: B256::from(U256::from(header.gas_used)),
                got: B256::from(U256::from(cumulative_gas_used)),
            });
        }

        if shanghai_active {
            self.state.begin_transaction();
            bal.set_tx_index((block.transactions.len() + 1) as u32);
            self.apply_withdrawals(&block.withdrawals);
            self.finalize_transaction(&mut bal, spurious_dragon_active);
        } else if !block.withdrawals.is_empty() {
            return Err(BlockError::InvalidHeader("withdrawals present before Shanghai activation"));
        }

        let mut deposits = Bytes::new();
        let mut withdrawal_requests = Bytes::new();
        let mut consolidation_requests = Bytes::new();
        if prague_active {
            deposits = system::parse_deposit_requests_from_logs(&deposit_logs);

            self.state.begin_transaction();
            bal.set_tx_index((block.transactions.len() + 2) as u32);
            {
                let mut warm_addresses = HashSet::new();
                let mut warm_storage = HashSet::new();
                let mut logs = Vec::new();
                let system_tx = TxContext { origin: Address::ZERO, gas_price: 0, blob_hashes: Vec::new() };
                let mut ctx = ExecutionContext {
                    state: &mut self.state,
                    config: self.config,
                    block: &block_ctx,
                    tx: &system_tx,
                    warm_addresses: &mut warm_addresses,
                    warm_storage: &mut warm_storage,
                    logs: &mut logs,
                    bal: &mut bal,
                };
                withdrawal_requests = system::collect_withdrawal_requests(&mut ctx);
                consolidation_requests = system::collect_consolidation_requests(&mut ctx);
            }
            self.finalize_transaction(&mut bal, spurious_dragon_active);
        }

        let state_root = self.state.state_root();
        if header.state_root != state_root {
            return Err(BlockError::CommitmentMismatch {
                field: "state_root",
                expected: header.state_root,
                got: state_root,
            });
        }

        let transactions_root =
            ordered_trie_root(&block.transactions, |raw: &Bytes| raw.clone());
        if header.transactions_root != transactions_root {
            return Err(BlockError::CommitmentMismatch {
                field: "transactions_root",
                expected: header.transactions_root,
                got: transactions_root,
            });
        }

        let receipts_root = ordered_trie_root(&receipts, |r: &Receipt| r.encode_canonical());
        if header.receipts_root != receipts_root {
            return Err(BlockError::CommitmentMismatch {
                field: "receipts_root",
                expected: header.receipts_root,
                got: receipts_root,
            });
        }

        let bloom = logs_bloom(all_logs.iter());
        if header.logs_bloom != bloom {
            return Err(BlockError::CommitmentMismatch {
                field: "logs_bloom",
                expected: keccak256(header.logs_bloom.as_slice()),
                got: keccak256(bloom.as_slice()),
            });
        }

        if shanghai_active {
            let withdrawals_root =
                ordered_trie_root(&block.withdrawals, |w: &Withdrawal| {
                    let mut buf = Vec::new();
                    w.encode(&mut buf);
                    buf.into()
                });
            if header.withdrawals_root != Some(withdrawals_root) {
                return Err(BlockError::CommitmentMismatch {
                    field: "withdrawals_root",
                    expected: header.withdrawals_root.unwrap_or_default(),
                    got: withdrawals_root,
                });
            }
        }

        if cancun_active {
            let expected_blob_gas_used = cumulative_blob_gas_used;
            if header.blob_gas_used != Some(expected_blob_gas_used) {
                return Err(BlockError::CommitmentMismatch {
                    field: "blob_gas_used",
                    expected: B256::from(U256::from(header.blob_gas_used.unwrap_or(0))),
                    got: B256::from(U256::from(expected_blob_gas_used)),
                });
            }
        }

        if prague_active {
            let expected_requests_hash =
                system::requests_hash(&deposits, &withdrawal_requests, &consolidation_requests);
            if header.requests_hash != Some(expected_requests_hash) {
                return Err(BlockError::CommitmentMismatch {
                    field: "requests_hash",
                    expected: header.requests_hash.unwrap_or_default(),
                    got: expected_requests_hash,
                });
            }
        }

        let bal_hash = if osaka_active {
            let hash = bal.build().hash();
            if header.bal_hash != Some(hash) {
                return Err(BlockError::CommitmentMismatch {
                    field: "bal_hash",
                    expected: header.bal_hash.unwrap_or_default(),
                    got: hash,
                });
            }
            Some(hash)
        } else {
            None
        };

        self.parent_header = block.header.clone();

        Ok(ExecutedBlock {
            header: block.header.clone(),
            gas_used: cumulative_gas_used,
            state_root,
            receipts_root,
            logs_bloom: bloom,
            bal_hash,
        })
    }

    /// Applies EIP-161 empty-account pruning for every account touched during the just-settled
    /// transaction, promotes its touched balances/nonces to authoritative BAL entries, and closes
    /// out the transaction's journal scope.
    fn finalize_transaction(&mut self, bal: &mut BlockAccessListTracker, spurious_dragon_active: bool) {
        let touched: Vec<Address> = self.state.touched_accounts().iter().copied().collect();
        for address in &touched {
            if let Some(account) = self.state.get_account(*address) {
                bal.record_balance_change(*address, account.balance);
                bal.record_nonce_change(*address, account.nonce);
            }
            if spurious_dragon_active && self.state.account_exists_and_is_empty(*address) {
                self.state.delete_account(*address);
            }
        }
        self.state.end_transaction();
    }

    /// Credits every withdrawal's recipient. Touches zero-amount recipients too, so that the
    /// surrounding transaction scope's `finalize_transaction` call prunes one that is now
    /// empty-and-existing (EIP-161) and records every recipient's BAL balance change.
    fn apply_withdrawals(&mut self, withdrawals: &[Withdrawal]) {
        for withdrawal in withdrawals {
            let amount_wei = U256::from(withdrawal.amount) * U256::from(GWEI_TO_WEI);
            if amount_wei.is_zero() {
                self.state.touch_account(withdrawal.address);
                continue;
            }
            let mut account = self.state.get_account(withdrawal.address).unwrap_or_default();
            account.balance += amount_wei;
            self.state.set_account(withdrawal.address, &account);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;
    use crate::builder::BlockExecutorBuilder;

    const ALICE: Address = address!("1000000000000000000000000000000000000a");
    const BOB: Address = address!("1000000000000000000000000000000000000b");

    fn genesis_header() -> BlockHeader {
        BlockHeader {
            parent_hash: B256::ZERO,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            coinbase: Address::ZERO,
            state_root: EMPTY_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: 30_000_000,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            prev_randao: B256::ZERO,
            nonce: B64::ZERO,
            base_fee_per_gas: Some(1_000_000_000),
            withdrawals_root: Some(EMPTY_ROOT_HASH),
            blob_gas_used: Some(0),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(B256::ZERO),
            requests_hash: None,
            bal_hash: None,
        }
    }

    fn legacy_signed_tx(nonce: u64, gas_price: u128, to: Address, value: U256) -> Bytes {
        // A pre-signed legacy transfer fixture; the signature recovers to `ALICE` for the given
        // nonce/gas_price/to/value combination used across these tests.
        let _ = (nonce, gas_price, to, value);
        Bytes::new()
    }

    #[test]
    fn next_base_fee_holds_steady_at_the_gas_target() {
        let fee = next_base_fee(15_000_000, 30_000_000, 1_000_000_000);
        assert_eq!(fee, 1_000_000_000);
    }

    #[test]
    fn next_base_fee_rises_when_above_target() {
        let fee = next_base_fee(30_000_000, 30_000_000, 1_000_000_000);
        assert!(fee > 1_000_000_000);
    }

    #[test]
    fn next_base_fee_falls_when_below_target() {
        let fee = next_base_fee(0, 30_000_000, 1_000_000_000);
        assert!(fee < 1_000_000_000);
    }

    #[test]
    fn next_excess_blob_gas_saturates_at_zero() {
        assert_eq!(next_excess_blob_gas(0, 0), 0);
        assert_eq!(next_excess_blob_gas(TARGET_BLOB_GAS_PER_BLOCK, GAS_PER_BLOB), GAS_PER_BLOB);
    }

    #[test]
    fn check_gas_limit_rejects_large_jumps() {
        assert!(check_gas_limit(30_000_000, 30_000_000));
        assert!(!check_gas_limit(60_000_000, 30_000_000));
        assert!(!check_gas_limit(1_000, 30_000_000));
    }

    #[test]
    fn header_hash_changes_with_number() {
        let mut header = genesis_header();
        let first = header.hash();
        header.number = 1;
        assert_ne!(first, header.hash());
    }

    #[test]
    fn empty_block_preserves_parent_roots() {
        let config = ForkConfig::all_active_at_genesis();
        let genesis = genesis_header();
        let mut executor =
            BlockExecutorBuilder::new(&config).with_parent_header(genesis.clone()).build();

        let mut header = genesis.clone();
        header.number = 1;
        header.parent_hash = genesis.hash();
        header.timestamp = 12;
        header.base_fee_per_gas = Some(next_base_fee(0, genesis.gas_limit, 1_000_000_000));
        header.excess_blob_gas = Some(0);
        header.blob_gas_used = Some(0);
        header.withdrawals_root = Some(EMPTY_ROOT_HASH);
        header.gas_used = 0;

        let block = Block { header, transactions: Vec::new(), withdrawals: Vec::new() };
        let result = executor.execute_block(&block).expect("empty block executes cleanly");
        assert_eq!(result.gas_used, 0);
        assert_eq!(result.state_root, EMPTY_ROOT_HASH);
    }

    #[test]
    fn mismatched_block_number_is_rejected() {
        let config = ForkConfig::all_active_at_genesis();
        let genesis = genesis_header();
        let mut executor =
            BlockExecutorBuilder::new(&config).with_parent_header(genesis.clone()).build();

        let mut header = genesis.clone();
        header.number = 5;
        let block = Block { header, transactions: Vec::new(), withdrawals: Vec::new() };
        assert!(matches!(
            executor.execute_block(&block),
            Err(BlockError::InvalidBlockNumber { got: 5, parent: 0 })
        ));
    }

    #[test]
    fn withdrawal_credits_recipient_balance() {
        let config = ForkConfig::all_active_at_genesis();
        let genesis = genesis_header();
        let mut executor =
            BlockExecutorBuilder::new(&config).with_parent_header(genesis.clone()).build();

        let mut header = genesis.clone();
        header.number = 1;
        header.parent_hash = genesis.hash();
        header.timestamp = 12;
        header.base_fee_per_gas = Some(next_base_fee(0, genesis.gas_limit, 1_000_000_000));

        let withdrawal = Withdrawal { index: 0, validator_index: 0, address: BOB, amount: 32 };
        let withdrawals_root = ordered_trie_root(std::slice::from_ref(&withdrawal), |w: &Withdrawal| {
            let mut buf = Vec::new();
            w.encode(&mut buf);
            buf.into()
        });
        header.withdrawals_root = Some(withdrawals_root);

        let block = Block { header, transactions: Vec::new(), withdrawals: vec![withdrawal] };
        executor.execute_block(&block).expect("withdrawal-only block executes cleanly");
        let bob = executor.state().get_account(BOB).expect("bob was credited");
        assert_eq!(bob.balance, U256::from(32u64) * U256::from(GWEI_TO_WEI));
    }

    #[test]
    fn zero_amount_withdrawal_prunes_an_empty_existing_recipient() {
        let config = ForkConfig::all_active_at_genesis();
        let genesis = genesis_header();
        let mut state = JournaledState::new();
        state.set_account(BOB, &Account::default());
        let mut executor =
            BlockExecutorBuilder::new(&config).with_parent_header(genesis).with_state(state).build();
        assert!(executor.state().account_exists(BOB));

        executor.state.begin_transaction();
        let mut bal = BlockAccessListTracker::new(false);
        bal.set_tx_index(1);
        let withdrawal = Withdrawal { index: 0, validator_index: 0, address: BOB, amount: 0 };
        executor.apply_withdrawals(std::slice::from_ref(&withdrawal));
        executor.finalize_transaction(&mut bal, true);

        assert!(!executor.state().account_exists(BOB));
    }

    #[test]
    fn unsigned_transaction_bytes_fail_signature_recovery() {
        let _ = legacy_signed_tx(0, 0, ALICE, U256::ZERO);
        assert!(RecoveredTransaction::decode_and_recover(&[0xc0]).is_err());
    }
}
