//! 256-bit helpers shared by the price and amount formulas.

use alloy::primitives::{U256, U512};

/// 2^128, the unit of a Q128.128 value.
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// `a * b / denom` with a 512-bit intermediate product.
///
/// Returns `None` when `denom` is zero or the quotient does not fit in 256 bits.
pub fn mul_div(a: U256, b: U256, denom: U256, round_up: bool) -> Option<U256> {
    if denom.is_zero() {
        return None;
    }

    let product = widen(a) * widen(b);
    let denom = widen(denom);
    let mut quotient = product / denom;
    if round_up && !(product % denom).is_zero() {
        quotient += U512::from(1u64);
    }

    narrow(quotient)
}

/// Ceiling division. Panics on a zero divisor, like `/`.
pub fn div_round_up(a: U256, b: U256) -> U256 {
    let quotient = a / b;
    if (a % b).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u64)
    }
}

/// Floor of the square root.
pub fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::ZERO;
    }

    // 2^ceil(bits / 2) is never below the root, so Newton descends monotonically.
    let mut x = U256::from(1u64) << n.bit_len().div_ceil(2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

fn widen(v: U256) -> U512 {
    U512::from_limbs_slice(v.as_limbs())
}

fn narrow(v: U512) -> Option<U256> {
    let limbs = v.as_limbs();
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return None;
    }
    Some(U256::from_limbs_slice(&limbs[..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_uses_wide_intermediate() {
        // (2^200 * 2^100) / 2^150 overflows 256 bits before the division
        let a = U256::from(1u64) << 200;
        let b = U256::from(1u64) << 100;
        let d = U256::from(1u64) << 150;
        assert_eq!(mul_div(a, b, d, false), Some(U256::from(1u64) << 150));
    }

    #[test]
    fn test_mul_div_rounding() {
        let seven = U256::from(7u64);
        let two = U256::from(2u64);
        assert_eq!(mul_div(seven, U256::from(1u64), two, false), Some(U256::from(3u64)));
        assert_eq!(mul_div(seven, U256::from(1u64), two, true), Some(U256::from(4u64)));
    }

    #[test]
    fn test_mul_div_overflow_and_zero_denominator() {
        assert_eq!(mul_div(U256::MAX, U256::MAX, U256::from(1u64), false), None);
        assert_eq!(mul_div(U256::MAX, U256::MAX, U256::ZERO, false), None);
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(U256::ZERO), U256::ZERO);
        assert_eq!(isqrt(U256::from(1u64)), U256::from(1u64));
        assert_eq!(isqrt(U256::from(15u64)), U256::from(3u64));
        assert_eq!(isqrt(U256::from(16u64)), U256::from(4u64));
        assert_eq!(isqrt(Q128), U256::from(1u64) << 64);
        assert_eq!(isqrt(U256::MAX), U256::from(u128::MAX));
    }

    #[test]
    fn test_div_round_up() {
        assert_eq!(div_round_up(U256::from(10u64), U256::from(5u64)), U256::from(2u64));
        assert_eq!(div_round_up(U256::from(11u64), U256::from(5u64)), U256::from(3u64));
    }
}
