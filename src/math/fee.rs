//! Swap fees are 0.64 fixed-point fractions of the input amount.

use alloy::primitives::U256;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FeeError {
    #[error("amount before fee does not fit in 128 bits")]
    AmountBeforeFeeOverflow,
}

/// Fee charged on `amount`, rounded up.
pub fn compute_fee(amount: u128, fee: u64) -> u128 {
    let scaled: U256 = U256::from(amount) * U256::from(fee) + U256::from(u64::MAX);
    // amount * fee < 2^192, so the shifted value fits in 128 bits
    (scaled >> 64usize).to::<u128>()
}

/// Gross amount that leaves `after_fee` once the fee is taken, rounded up.
pub fn amount_before_fee(after_fee: u128, fee: u64) -> Result<u128, FeeError> {
    let numerator: U256 = U256::from(after_fee) << 64;
    let denominator: U256 = U256::from(u128::from(u64::MAX) + 1 - u128::from(fee));

    let quotient = numerator / denominator;
    let result = if (numerator % denominator).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u64)
    };

    u128::try_from(result).map_err(|_| FeeError::AmountBeforeFeeOverflow)
}
