//! Numeric conversions used outside the exact integer math.

use alloy::primitives::U256;

/// 2^64 as f64
const TWO_POW_64: f64 = 18446744073709551616.0;

/// Convert U256 to f64, rounding to the nearest representable value.
///
/// Only suitable for estimates (gas, logging); never feed the result back
/// into pricing.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * TWO_POW_64 + *limb as f64)
}

/// Convert a Q128.128 value to f64.
pub fn x128_to_f64(value: U256) -> f64 {
    u256_to_f64(value) / (TWO_POW_64 * TWO_POW_64)
}
