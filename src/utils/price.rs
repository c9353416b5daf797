//! Human-readable prices from Q128.128 square-root ratios.

use alloy::primitives::U256;

use super::conversion::x128_to_f64;

/// Price of token0 in units of token1, adjusted for token decimals.
///
/// `None` for a zero ratio or when the result is not finite.
pub fn sqrt_ratio_to_price(sqrt_ratio: U256, token0_decimals: u8, token1_decimals: u8) -> Option<f64> {
    if sqrt_ratio.is_zero() {
        return None;
    }

    let sqrt_price = x128_to_f64(sqrt_ratio);
    let raw_price = sqrt_price * sqrt_price;
    let adjusted = raw_price * 10f64.powi(token0_decimals as i32 - token1_decimals as i32);

    if adjusted.is_finite() && adjusted > 0.0 {
        Some(adjusted)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_price() {
        let one = U256::from(1u8) << 128;
        assert_eq!(sqrt_ratio_to_price(one, 18, 18), Some(1.0));
        assert_eq!(sqrt_ratio_to_price(U256::ZERO, 18, 18), None);
    }

    #[test]
    fn test_decimal_adjustment() {
        // sqrt ratio 2 means 4 raw units of token1 per raw unit of token0.
        let two = U256::from(1u8) << 129;
        let price = sqrt_ratio_to_price(two, 18, 6).unwrap();
        assert!((price - 4e12).abs() / 4e12 < 1e-12);
    }
}
