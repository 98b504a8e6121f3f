//! Fork activation schedule, replacing the OP Stack's `RollupConfig` with the Ethereum L1
//! hardfork schedule this engine needs to decide EIP applicability.

use alloy_primitives::U256;

/// A hardfork activation point: either a block number (pre-Merge forks) or a unix timestamp
/// (Merge and later), matching the convention real networks use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Activates at or after the given block number.
    Block(u64),
    /// Activates at or after the given unix timestamp.
    Timestamp(u64),
    /// Never activates.
    Never,
}

impl Activation {
    /// Whether this fork is active given the candidate block's number and timestamp.
    pub const fn is_active(&self, block_number: u64, timestamp: u64) -> bool {
        match self {
            Self::Block(b) => block_number >= *b,
            Self::Timestamp(t) => timestamp >= *t,
            Self::Never => false,
        }
    }
}

/// The chain's hardfork activation schedule.
///
/// Threaded through the pipeline and interpreter by reference, never as a global, mirroring the
/// `RollupConfig` usage this crate's architecture is descended from.
#[derive(Debug, Clone)]
pub struct ForkConfig {
    /// The EIP-155 chain id.
    pub chain_id: U256,
    /// Homestead activation (difficulty bomb, `DELEGATECALL`).
    pub homestead: Activation,
    /// Spurious Dragon activation (EIP-155, EIP-170 code size cap).
    pub spurious_dragon: Activation,
    /// Byzantium activation (`REVERT`, `STATICCALL`, `RETURNDATA*`).
    pub byzantium: Activation,
    /// Constantinople activation (`CREATE2`, bitwise shifts, `EXTCODEHASH`).
    pub constantinople: Activation,
    /// Istanbul activation (EIP-2200 repriced `SSTORE`, `CHAINID`, `SELFBALANCE`).
    pub istanbul: Activation,
    /// Berlin activation (EIP-2929 cold/warm access lists, EIP-2930 access list transactions).
    pub berlin: Activation,
    /// London activation (EIP-1559 fee market, EIP-3529 refund cap).
    pub london: Activation,
    /// The Merge. Modeled as a plain activation point since this in-memory engine has no
    /// total-difficulty concept; treat as always-active for any block this engine executes.
    pub paris: Activation,
    /// Shanghai activation (withdrawals, `PUSH0`, EIP-3860 init code metering).
    pub shanghai: Activation,
    /// Cancun activation (EIP-4844 blobs, EIP-1153 transient storage, EIP-4788 beacon roots).
    pub cancun: Activation,
    /// Prague activation (EIP-7702 set-code transactions, EIP-7623 calldata floor, EIP-7685
    /// requests, EIP-2935 historical block hashes).
    pub prague: Activation,
    /// Osaka activation (EIP-7928 Block Access Lists).
    pub osaka: Activation,
}

macro_rules! fork_query {
    ($name:ident, $field:ident) => {
        /// Whether this fork is active for the given block number/timestamp pair.
        pub const fn $name(&self, block_number: u64, timestamp: u64) -> bool {
            self.$field.is_active(block_number, timestamp)
        }
    };
}

impl ForkConfig {
    fork_query!(is_homestead_active, homestead);
    fork_query!(is_spurious_dragon_active, spurious_dragon);
    fork_query!(is_byzantium_active, byzantium);
    fork_query!(is_constantinople_active, constantinople);
    fork_query!(is_istanbul_active, istanbul);
    fork_query!(is_berlin_active, berlin);
    fork_query!(is_london_active, london);
    fork_query!(is_paris_active, paris);
    fork_query!(is_shanghai_active, shanghai);
    fork_query!(is_cancun_active, cancun);
    fork_query!(is_prague_active, prague);
    fork_query!(is_osaka_active, osaka);

    /// Ethereum mainnet's canonical activation schedule.
    pub fn mainnet() -> Self {
        Self {
            chain_id: U256::from(1u64),
            homestead: Activation::Block(1_150_000),
            spurious_dragon: Activation::Block(2_675_000),
            byzantium: Activation::Block(4_370_000),
            constantinople: Activation::Block(7_280_000),
            istanbul: Activation::Block(9_069_000),
            berlin: Activation::Block(12_244_000),
            london: Activation::Block(12_965_000),
            paris: Activation::Block(15_537_394),
            shanghai: Activation::Timestamp(1_681_338_455),
            cancun: Activation::Timestamp(1_710_338_135),
            prague: Activation::Timestamp(1_746_612_311),
            osaka: Activation::Never,
        }
    }

    /// A config with every fork active from genesis, used pervasively by tests that only care
    /// about the latest ruleset.
    pub fn all_active_at_genesis() -> Self {
        Self {
            chain_id: U256::from(1u64),
            homestead: Activation::Block(0),
            spurious_dragon: Activation::Block(0),
            byzantium: Activation::Block(0),
            constantinople: Activation::Block(0),
            istanbul: Activation::Block(0),
            berlin: Activation::Block(0),
            london: Activation::Block(0),
            paris: Activation::Block(0),
            shanghai: Activation::Timestamp(0),
            cancun: Activation::Timestamp(0),
            prague: Activation::Timestamp(0),
            osaka: Activation::Timestamp(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_london_is_active_after_the_merge() {
        let config = ForkConfig::mainnet();
        assert!(config.is_london_active(15_537_394, 0));
        assert!(!config.is_london_active(12_964_999, 0));
    }

    #[test]
    fn all_active_at_genesis_activates_every_fork_at_zero() {
        let config = ForkConfig::all_active_at_genesis();
        assert!(config.is_osaka_active(0, 0));
        assert!(config.is_prague_active(0, 0));
    }

    #[test]
    fn never_activation_is_never_active() {
        let config = ForkConfig::mainnet();
        assert!(!config.is_osaka_active(u64::MAX, u64::MAX));
    }
}
