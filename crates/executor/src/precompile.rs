//! Precompile dispatch (C9): this engine owns dispatch-by-address and gas metering; the
//! underlying curve arithmetic, hashing, and KZG verification are delegated to `revm-precompile`,
//! the named out-of-scope primitive.

use alloy_primitives::{Address, Bytes};
use revm_precompile::{PrecompileErrors, Precompiles};

use crate::config::ForkConfig;
use crate::errors::FrameError;

/// Addresses `0x01..=0x11` are reserved for precompiled contracts.
pub fn is_precompile_address(address: &Address) -> bool {
    let bytes = address.as_slice();
    bytes[..19].iter().all(|b| *b == 0) && (1..=0x11).contains(&bytes[19])
}

/// Selects the `revm-precompile` table matching the fork active at `(block_number, timestamp)`.
///
/// Dispatch-by-address and gas accounting stay in this crate; only the per-precompile byte-level
/// computation is delegated to the table returned here.
fn precompiles_for(config: &ForkConfig, block_number: u64, timestamp: u64) -> &'static Precompiles {
    if config.is_prague_active(block_number, timestamp) {
        Precompiles::prague()
    } else if config.is_cancun_active(block_number, timestamp) {
        Precompiles::cancun()
    } else if config.is_berlin_active(block_number, timestamp) {
        Precompiles::berlin()
    } else if config.is_istanbul_active(block_number, timestamp) {
        Precompiles::istanbul()
    } else if config.is_byzantium_active(block_number, timestamp) {
        Precompiles::byzantium()
    } else {
        Precompiles::homestead()
    }
}

/// Invokes the precompile at `address` with `input`, metered against `gas_limit`.
///
/// Returns `(gas_used, output)` on success. A malformed input or insufficient gas consumes all of
/// `gas_limit` and surfaces as [`FrameError::InvalidParameter`] or [`FrameError::OutOfGas`],
/// matching the "consumes all gas on invalid input" rule in the component design.
pub fn call_precompile(
    config: &ForkConfig,
    block_number: u64,
    timestamp: u64,
    address: Address,
    input: &[u8],
    gas_limit: u64,
) -> Result<(u64, Bytes), FrameError> {
    let table = precompiles_for(config, block_number, timestamp);
    let Some(precompile) = table.get(&address) else {
        return Err(FrameError::InvalidParameter);
    };

    match precompile(input, gas_limit) {
        Ok(output) => Ok((output.gas_used, output.bytes)),
        Err(PrecompileErrors::Error(_)) => Err(FrameError::InvalidParameter),
        Err(PrecompileErrors::Fatal { .. }) => Err(FrameError::InvalidParameter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn ecrecover_address_is_a_precompile() {
        assert!(is_precompile_address(&address!("0000000000000000000000000000000000000001")));
    }

    #[test]
    fn zero_address_is_not_a_precompile() {
        assert!(!is_precompile_address(&Address::ZERO));
    }

    #[test]
    fn address_past_0x11_is_not_a_precompile_pre_prague() {
        assert!(!is_precompile_address(&address!("00000000000000000000000000000000000012")));
    }
}
