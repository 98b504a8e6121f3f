//! The builder pattern for [`BlockExecutor`].

use crate::block::BlockHeader;
use crate::config::ForkConfig;
use crate::state::JournaledState;

/// Builds a [`BlockExecutor`] from a fork schedule, an optional parent header (defaulting to an
/// empty genesis), and an optional starting world state (defaulting to an empty one).
#[derive(Debug)]
pub struct BlockExecutorBuilder<'a> {
    config: &'a ForkConfig,
    parent_header: Option<BlockHeader>,
    state: JournaledState,
}

impl<'a> BlockExecutorBuilder<'a> {
    /// Instantiates a new builder with the given fork schedule.
    pub fn new(config: &'a ForkConfig) -> Self {
        Self { config, parent_header: None, state: JournaledState::new() }
    }

    /// Sets the header execution begins on top of.
    pub fn with_parent_header(mut self, parent_header: BlockHeader) -> Self {
        self.parent_header = Some(parent_header);
        self
    }

    /// Sets the world state execution begins on top of. Defaults to an empty state.
    pub fn with_state(mut self, state: JournaledState) -> Self {
        self.state = state;
        self
    }

    /// Builds the [`BlockExecutor`] from the builder's configuration.
    pub fn build(self) -> crate::block::BlockExecutor<'a> {
        let parent_header = self.parent_header.unwrap_or_else(empty_genesis_header);
        crate::block::BlockExecutor::new(self.config, parent_header, self.state)
    }
}

fn empty_genesis_header() -> BlockHeader {
    use alloy_consensus::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};
    use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};

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
        base_fee_per_gas: None,
        withdrawals_root: None,
        blob_gas_used: None,
        excess_blob_gas: None,
        parent_beacon_block_root: None,
        requests_hash: None,
        bal_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_parent_header_uses_empty_genesis() {
        let config = ForkConfig::mainnet();
        let executor = BlockExecutorBuilder::new(&config).build();
        assert_eq!(executor.parent_header().number, 0);
    }

    #[test]
    fn build_with_explicit_parent_header_keeps_it() {
        let config = ForkConfig::mainnet();
        let mut header = empty_genesis_header();
        header.number = 42;
        let executor = BlockExecutorBuilder::new(&config).with_parent_header(header).build();
        assert_eq!(executor.parent_header().number, 42);
    }
}
