//! Representable sqrt ratios.
//!
//! On chain a sqrt ratio is stored as a 96-bit float: the top two bits select
//! one of four windows and the remaining 94 bits are the mantissa. A Q128.128
//! value is representable when it is below 2^192 and has no bits set below
//! the shift of its window.

use alloy::primitives::{aliases::U96, U256};

/// Bits of mantissa in the compact form.
const MANTISSA_BITS: usize = 94;

/// Upper bound (exclusive) of any representable ratio.
pub const RATIO_CEILING: U256 = U256::from_limbs([0, 0, 0, 1]);

fn window_shift(value: U256) -> usize {
    match value.bit_len() {
        0..=96 => 2,
        97..=128 => 34,
        129..=160 => 66,
        _ => 98,
    }
}

/// Rounds `value` to the nearest representable ratio in the given direction.
///
/// Returns `None` if the rounded value does not fit the compact form.
pub fn round_to_representable(value: U256, round_up: bool) -> Option<U256> {
    let value = if round_up {
        value.checked_add((U256::from(1u64) << window_shift(value)) - U256::from(1u64))?
    } else {
        value
    };

    let shift = window_shift(value);
    let rounded = (value >> shift) << shift;
    (rounded < RATIO_CEILING).then_some(rounded)
}

/// Whether `value` survives a compact round trip unchanged.
pub fn is_representable(value: U256) -> bool {
    round_to_representable(value, false) == Some(value)
}

/// Expands a compact 96-bit ratio into Q128.128.
pub fn compact_to_fixed(compact: U96) -> U256 {
    let compact = U256::from(compact);
    let window = (compact >> MANTISSA_BITS).to::<usize>();
    let mantissa = compact & ((U256::from(1u64) << MANTISSA_BITS) - U256::from(1u64));
    mantissa << (2 + 32 * window)
}

/// Packs a representable Q128.128 ratio into its compact form.
pub fn fixed_to_compact(value: U256) -> Option<U96> {
    if !is_representable(value) {
        return None;
    }

    let shift = window_shift(value);
    let window = U256::from((shift - 2) / 32) << MANTISSA_BITS;
    Some(U96::from(window | (value >> shift)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick::{tick_to_sqrt_ratio, MAX_SQRT_RATIO, MIN_SQRT_RATIO};

    #[test]
    fn test_round_down_truncates_window() {
        // 2^128 + 1 sits in the 66-bit window; the low bit is dropped
        let v = (U256::from(1u64) << 128) + U256::from(1u64);
        assert_eq!(round_to_representable(v, false), Some(U256::from(1u64) << 128));
    }

    #[test]
    fn test_round_up_moves_to_next_step() {
        let v = (U256::from(1u64) << 128) + U256::from(1u64);
        let expected = (U256::from(1u64) << 128) + (U256::from(1u64) << 66);
        assert_eq!(round_to_representable(v, true), Some(expected));
    }

    #[test]
    fn test_round_up_past_ceiling_fails() {
        assert_eq!(round_to_representable(RATIO_CEILING - U256::from(1u64), true), None);
        assert_eq!(round_to_representable(RATIO_CEILING, false), None);
    }

    #[test]
    fn test_compact_conversion_of_bounds() {
        for ratio in [MIN_SQRT_RATIO, MAX_SQRT_RATIO, U256::from(1u64) << 128] {
            let compact = fixed_to_compact(ratio).unwrap();
            assert_eq!(compact_to_fixed(compact), ratio);
        }
    }

    #[test]
    fn test_tick_ratios_are_representable() {
        for tick in [-1_000_000, -1, 0, 1, 100, 1_000_000] {
            assert!(is_representable(tick_to_sqrt_ratio(tick).unwrap()));
        }
    }

    #[test]
    fn test_unrepresentable_has_no_compact_form() {
        let v = (U256::from(1u64) << 128) + U256::from(1u64);
        assert_eq!(fixed_to_compact(v), None);
    }
}
