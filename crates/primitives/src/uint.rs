//! Arbitrary-precision `Uint` and the handful of numeric helpers built on top of it.

use alloy_primitives::U256;
use num_bigint::BigUint;

/// An unbounded non-negative integer, used where the reference spec's `Uint` type would overflow
/// a fixed-width accumulator (the blob base-fee Taylor series, whose intermediate `numerator`
/// term is allowed to grow without bound between divisions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uint(BigUint);

impl Uint {
    /// Constructs a [`Uint`] from a `u64`.
    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    /// Converts to a `u64`, saturating at `u64::MAX` if the value doesn't fit.
    pub fn to_u64_saturating(&self) -> u64 {
        self.0.iter_u64_digits().next().map_or(0, |lo| {
            if self.0.iter_u64_digits().count() > 1 {
                u64::MAX
            } else {
                lo
            }
        })
    }
}

/// Rounds `size` up to the nearest multiple of 32.
///
/// Used to convert a byte length into a 32-byte word count for memory-expansion gas and
/// init-code gas accounting.
pub const fn ceil32(size: u64) -> u64 {
    match size % 32 {
        0 => size,
        r => size + (32 - r),
    }
}

/// Approximates `factor * e^(numerator / denominator)` using the Taylor series truncated at the
/// point where successive terms no longer move the accumulator, exactly as EIP-4844's
/// `fake_exponential` (renamed `taylor_exponential` in the reference spec) defines it.
///
/// This backs both the blob base fee (`taylor_exponential(1, excess_blob_gas, 5_007_716)`) and,
/// historically, could back other EIP-1559-style fee curves; it is kept generic over the three
/// parameters rather than hardcoded to blob gas.
pub fn taylor_exponential(factor: u64, numerator: u64, denominator: u64) -> u64 {
    assert!(denominator != 0, "taylor_exponential: denominator must be non-zero");

    let denominator = BigUint::from(denominator);
    let mut i = BigUint::from(1u64);
    let mut output = BigUint::from(0u64);
    let mut numerator_accum = BigUint::from(factor) * &denominator;

    while numerator_accum > BigUint::from(0u64) {
        output += &numerator_accum;
        numerator_accum = (&numerator_accum * BigUint::from(numerator)) / (&denominator * &i);
        i += BigUint::from(1u64);
    }

    let result = output / denominator;
    // The series is bounded well below u64::MAX for any realistic excess-blob-gas input; a
    // saturating cast keeps this function infallible for callers.
    result.iter_u64_digits().next().unwrap_or(0)
}

/// Clamps a `U256` shift amount to the bit width of the value being shifted, matching the EVM's
/// `SHL`/`SHR`/`SAR` semantics where a shift amount `>= 256` yields either `0` or `u256::MAX`
/// (for `SAR` of a negative value) rather than panicking or wrapping.
pub fn clamp_shift(shift: U256) -> u32 {
    if shift > U256::from(256u64) {
        256
    } else {
        shift.to::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil32_rounds_up() {
        assert_eq!(ceil32(0), 0);
        assert_eq!(ceil32(1), 32);
        assert_eq!(ceil32(32), 32);
        assert_eq!(ceil32(33), 64);
    }

    #[test]
    fn taylor_exponential_at_zero_excess_is_factor() {
        assert_eq!(taylor_exponential(1, 0, 5_007_716), 1);
    }

    #[test]
    fn taylor_exponential_increases_with_numerator() {
        let low = taylor_exponential(1, 1_000_000, 5_007_716);
        let high = taylor_exponential(1, 2_000_000, 5_007_716);
        assert!(high >= low);
    }

    #[test]
    fn clamp_shift_saturates_at_256() {
        assert_eq!(clamp_shift(U256::from(300u64)), 256);
        assert_eq!(clamp_shift(U256::from(4u64)), 4);
    }
}
