//! Two's-complement signed interpretation of [`U256`], used by `SDIV`, `SMOD`, `SLT`, `SGT` and
//! `SAR`.

use alloy_primitives::U256;
use std::cmp::Ordering;

/// The sign of a [`U256`] interpreted as a two's-complement 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// The value's most significant bit is unset; it is non-negative.
    Positive,
    /// The value's most significant bit is set; it is negative.
    Negative,
}

/// Splits `value` into its sign and two's-complement magnitude.
///
/// `-U256::from(1)` (i.e. `U256::MAX`) maps to `(Sign::Negative, 1)`.
pub fn to_signed(value: U256) -> (Sign, U256) {
    if value.bit(255) {
        (Sign::Negative, twos_complement(value))
    } else {
        (Sign::Positive, value)
    }
}

/// Reconstructs a two's-complement `U256` from a sign and an unsigned magnitude.
pub fn from_signed(sign: Sign, magnitude: U256) -> U256 {
    match sign {
        Sign::Positive => magnitude,
        Sign::Negative => twos_complement(magnitude),
    }
}

/// Negates `value` as a two's-complement 256-bit integer: `!value + 1`.
fn twos_complement(value: U256) -> U256 {
    (!value).wrapping_add(U256::from(1u64))
}

/// Signed comparison of two [`U256`] values interpreted as two's-complement integers, as used by
/// `SLT`/`SGT`.
pub fn signed_cmp(a: U256, b: U256) -> Ordering {
    let a_neg = a.bit(255);
    let b_neg = b.bit(255);
    match (a_neg, b_neg) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minus_one_round_trips() {
        let minus_one = U256::MAX;
        let (sign, mag) = to_signed(minus_one);
        assert_eq!(sign, Sign::Negative);
        assert_eq!(mag, U256::from(1u64));
        assert_eq!(from_signed(sign, mag), minus_one);
    }

    #[test]
    fn positive_round_trips() {
        let v = U256::from(42u64);
        let (sign, mag) = to_signed(v);
        assert_eq!(sign, Sign::Positive);
        assert_eq!(mag, v);
        assert_eq!(from_signed(sign, mag), v);
    }

    #[test]
    fn signed_cmp_orders_negative_below_positive() {
        assert_eq!(signed_cmp(U256::MAX, U256::from(1u64)), Ordering::Less);
    }
}
