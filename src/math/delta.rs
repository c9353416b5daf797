//! Liquidity-weighted token amounts between two sqrt ratios, and the inverse
//! price-impact functions.

use alloy::primitives::U256;
use thiserror::Error;

use super::{
    sqrt_ratio::round_to_representable,
    uint::{div_round_up, mul_div},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AmountDeltaError {
    #[error("intermediate product overflows 256 bits")]
    OverflowU256,
    #[error("amount does not fit in 128 bits")]
    OverflowU128,
}

fn sort(a: U256, b: U256) -> (U256, U256) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn to_u128(value: U256) -> Result<u128, AmountDeltaError> {
    u128::try_from(value).map_err(|_| AmountDeltaError::OverflowU128)
}

/// Amount of token0 covering the move between the two ratios at `liquidity`.
///
/// `liquidity * 2^128 * (upper - lower) / upper / lower`
pub fn amount0_delta(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    liquidity: U256,
    round_up: bool,
) -> Result<u128, AmountDeltaError> {
    let (lower, upper) = sort(sqrt_ratio_a, sqrt_ratio_b);
    if liquidity.is_zero() || lower == upper {
        return Ok(0);
    }
    if liquidity.bit_len() > 128 || lower.is_zero() {
        return Err(AmountDeltaError::OverflowU256);
    }

    let scaled = liquidity << 128;
    let partial = mul_div(scaled, upper - lower, upper, round_up)
        .ok_or(AmountDeltaError::OverflowU256)?;
    let amount = if round_up {
        div_round_up(partial, lower)
    } else {
        partial / lower
    };

    to_u128(amount)
}

/// Amount of token1 covering the move between the two ratios at `liquidity`.
///
/// `liquidity * (upper - lower) / 2^128`
pub fn amount1_delta(
    sqrt_ratio_a: U256,
    sqrt_ratio_b: U256,
    liquidity: U256,
    round_up: bool,
) -> Result<u128, AmountDeltaError> {
    let (lower, upper) = sort(sqrt_ratio_a, sqrt_ratio_b);
    if liquidity.is_zero() || lower == upper {
        return Ok(0);
    }

    let product = (upper - lower)
        .checked_mul(liquidity)
        .ok_or(AmountDeltaError::OverflowU256)?;
    let mut amount = product >> 128;
    if round_up && !(product & U256::from(u128::MAX)).is_zero() {
        amount += U256::from(1u64);
    }

    to_u128(amount)
}

/// Sqrt ratio after `amount` of token0 enters (positive) or leaves (negative)
/// the pool. Rounds up.
///
/// `None` when the move cannot be represented; the caller should then treat
/// the step as bounded by its price limit.
pub fn next_sqrt_ratio_from_amount0(
    sqrt_ratio: U256,
    liquidity: u128,
    amount: i128,
) -> Option<U256> {
    if amount == 0 {
        return Some(sqrt_ratio);
    }
    if sqrt_ratio.is_zero() {
        return None;
    }

    let scaled = U256::from(liquidity) << 128;
    let magnitude = U256::from(amount.unsigned_abs());

    let next = if amount < 0 {
        let product = sqrt_ratio.checked_mul(magnitude)?;
        if product >= scaled {
            return None;
        }
        mul_div(scaled, sqrt_ratio, scaled - product, true)?
    } else {
        let denominator = div_round_up(scaled, sqrt_ratio).checked_add(magnitude)?;
        div_round_up(scaled, denominator)
    };

    round_to_representable(next, true)
}

/// Sqrt ratio after `amount` of token1 enters (positive) or leaves (negative)
/// the pool. Rounds down.
pub fn next_sqrt_ratio_from_amount1(
    sqrt_ratio: U256,
    liquidity: u128,
    amount: i128,
) -> Option<U256> {
    if amount == 0 {
        return Some(sqrt_ratio);
    }
    if liquidity == 0 {
        return None;
    }

    let shifted: U256 = U256::from(amount.unsigned_abs()) << 128;
    let liquidity: U256 = U256::from(liquidity);
    let quotient = shifted / liquidity;

    let next = if amount < 0 {
        if quotient >= sqrt_ratio {
            return None;
        }
        let remainder_adjust = if (shifted % liquidity).is_zero() { 0u64 } else { 1 };
        let next = sqrt_ratio - quotient - U256::from(remainder_adjust);
        if next.is_zero() {
            return None;
        }
        next
    } else {
        sqrt_ratio.checked_add(quotient)?
    };

    round_to_representable(next, false)
}
