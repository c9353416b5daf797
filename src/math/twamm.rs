//! Price evolution under continuous two-sided order flow.
//!
//! Sale rates are token amounts per second in 32-bit fixed point.

use alloy::primitives::{I256, U256};

use super::{
    exp2::{exp2, EXP2_CEILING},
    fee::compute_fee,
    sqrt_ratio::round_to_representable,
    uint::{isqrt, mul_div, Q128},
};

/// floor(log2(e) * 2^33); scales `sale_rate * time / liquidity` into a
/// 64.64 base-2 exponent.
const LOG2_E_X33: u64 = 12_392_656_037;

/// Amount sold by an order at `sale_rate` over `duration` seconds.
pub fn compute_amount_from_sale_rate(sale_rate: u128, duration: u32, round_up: bool) -> u128 {
    let mut amount: U256 = U256::from(sale_rate) * U256::from(duration);
    if round_up {
        amount += U256::from(u32::MAX);
    }
    // sale_rate < 2^128 and duration < 2^32
    (amount >> 32usize).to::<u128>()
}

/// sqrt(sale_rate1 / sale_rate0) in Q128.128, the price both order streams
/// converge to. `None` if `sale_rate0` is zero.
pub fn compute_sqrt_sale_ratio(sale_rate0: u128, sale_rate1: u128) -> Option<U256> {
    if sale_rate0 == 0 {
        return None;
    }

    let sale_ratio: U256 = (U256::from(sale_rate1) << 128) / U256::from(sale_rate0);

    // Keep as many bits as possible under the square root.
    let sqrt = if sale_ratio.bit_len() <= 128 {
        isqrt(sale_ratio << 128)
    } else if sale_ratio.bit_len() <= 192 {
        isqrt(sale_ratio << 64) << 32
    } else {
        isqrt(sale_ratio << 16) << 56
    };
    Some(sqrt)
}

/// `(sqrt_sale_ratio - sqrt_ratio) / (sqrt_sale_ratio + sqrt_ratio)` in signed X128.
///
/// `None` if the sum of the two ratios does not fit 256 bits.
pub fn compute_c(sqrt_ratio: U256, sqrt_sale_ratio: U256) -> Option<I256> {
    if sqrt_ratio == sqrt_sale_ratio {
        return Some(I256::ZERO);
    }

    let (difference, negative) = if sqrt_sale_ratio > sqrt_ratio {
        (sqrt_sale_ratio - sqrt_ratio, false)
    } else {
        (sqrt_ratio - sqrt_sale_ratio, true)
    };

    let sum = sqrt_sale_ratio.checked_add(sqrt_ratio)?;
    // difference < sum, so the quotient is below 2^128
    let magnitude = I256::from_raw(mul_div(difference, Q128, sum, false)?);
    Some(if negative { -magnitude } else { magnitude })
}

/// Sqrt ratio after `time_elapsed` seconds of both sale rates trading against
/// `liquidity` starting from `sqrt_ratio`.
///
/// Both sale rates must be non-zero. Returns `None` if they are not or the
/// result cannot be represented.
pub fn calculate_next_sqrt_ratio(
    sqrt_ratio: U256,
    liquidity: u128,
    sale_rate0: u128,
    sale_rate1: u128,
    time_elapsed: u32,
    fee: u64,
) -> Option<U256> {
    if sale_rate1 == 0 {
        return None;
    }
    let sqrt_sale_ratio = compute_sqrt_sale_ratio(sale_rate0, sale_rate1)?;
    let round_up = sqrt_ratio > sqrt_sale_ratio;

    let c = compute_c(sqrt_ratio, sqrt_sale_ratio)?;
    if c.is_zero() || liquidity == 0 {
        return round_to_representable(sqrt_sale_ratio, round_up);
    }

    let sqrt_sale_rate = isqrt(U256::from(sale_rate0) * U256::from(sale_rate1)).to::<u128>();
    let sqrt_sale_rate = sqrt_sale_rate - compute_fee(sqrt_sale_rate, fee);

    let exponent = U256::from(sqrt_sale_rate) * U256::from(time_elapsed) * U256::from(LOG2_E_X33)
        / U256::from(liquidity);
    if exponent >= U256::from(EXP2_CEILING) {
        return round_to_representable(sqrt_sale_ratio, round_up);
    }

    let e = I256::from_raw(U256::from(exp2(exponent.to::<u128>())?) << 64);
    let numerator = (e - c).unsigned_abs();
    let denominator = (e + c).unsigned_abs();

    let next = mul_div(sqrt_sale_ratio, numerator, denominator, false)?;
    // Never overshoot the sale ratio.
    let next = if round_up {
        next.max(sqrt_sale_ratio)
    } else {
        next.min(sqrt_sale_ratio)
    };

    round_to_representable(next, round_up)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE0: u128 = 10 << 32;
    const RATE1: u128 = 20 << 32;
    const LIQUIDITY: u128 = 1_000_000_000_000_000_000;

    fn ratio(value: &str) -> U256 {
        value.parse().unwrap()
    }

    #[test]
    fn test_amount_from_sale_rate() {
        assert_eq!(compute_amount_from_sale_rate(RATE0, 60, false), 600);
        assert_eq!(compute_amount_from_sale_rate(1, 1, false), 0);
        assert_eq!(compute_amount_from_sale_rate(1, 1, true), 1);
    }

    #[test]
    fn test_sqrt_sale_ratio() {
        assert_eq!(compute_sqrt_sale_ratio(1, 1), Some(Q128));
        assert_eq!(
            compute_sqrt_sale_ratio(RATE0, RATE1),
            Some(ratio("481231938336009023090067544951314448384"))
        );
        assert_eq!(
            compute_sqrt_sale_ratio(1, 1 << 100),
            Some(ratio("383123885216472214589586756787577295904684780545900544"))
        );
        assert_eq!(
            compute_sqrt_sale_ratio(1, 1 << 111),
            Some(ratio("17338207825350653962262404655072382476642578229123612672"))
        );
        assert_eq!(compute_sqrt_sale_ratio(0, 1), None);
    }

    #[test]
    fn test_compute_c_sign() {
        let magnitude = I256::from_raw(ratio("113427455640312821154458202477256070485"));
        assert_eq!(compute_c(Q128, Q128 * U256::from(2u64)), Some(magnitude));
        assert_eq!(compute_c(Q128 * U256::from(2u64), Q128), Some(-magnitude));
        assert_eq!(compute_c(Q128, Q128), Some(I256::ZERO));
    }

    #[test]
    fn test_compute_c_overflow_is_none() {
        assert_eq!(compute_c(U256::MAX, U256::from(1u8)), None);
        assert_eq!(compute_c(U256::from(1u8), U256::MAX), None);
    }

    #[test]
    fn test_next_sqrt_ratio_moves_toward_sale_ratio() {
        let next = calculate_next_sqrt_ratio(Q128, LIQUIDITY, RATE0, RATE1, 3600, 0).unwrap();
        assert_eq!(next, ratio("340282366920950713577179076470805364736"));

        let one_percent = ((1u128 << 64) / 100) as u64;
        let next =
            calculate_next_sqrt_ratio(Q128, LIQUIDITY, RATE0, RATE1, 3600, one_percent).unwrap();
        assert_eq!(next, ratio("340282366920950591090798427039382634496"));
    }

    #[test]
    fn test_next_sqrt_ratio_low_liquidity() {
        let next = calculate_next_sqrt_ratio(Q128, 1_000_000, RATE0, RATE1, 3600, 0).unwrap();
        assert_eq!(next, ratio("352096999285563183142322771121204625408"));
    }

    #[test]
    fn test_next_sqrt_ratio_without_liquidity_is_sale_ratio() {
        let next = calculate_next_sqrt_ratio(Q128, 0, RATE0, RATE1, 3600, 0).unwrap();
        assert_eq!(next, ratio("481231938336009023077170621664601309184"));
    }

    #[test]
    fn test_next_sqrt_ratio_from_above() {
        let start = Q128 * U256::from(2u64);
        let next = calculate_next_sqrt_ratio(start, LIQUIDITY, RATE0, RATE0, 3600, 0).unwrap();
        assert_eq!(next, ratio("680564733841840176511548831451586756608"));
    }
}
