//! A single swap step over a range of constant liquidity.

use alloy::primitives::U256;
use thiserror::Error;

use super::{
    delta::{
        amount0_delta, amount1_delta, next_sqrt_ratio_from_amount0, next_sqrt_ratio_from_amount1,
        AmountDeltaError,
    },
    fee::{amount_before_fee, compute_fee, FeeError},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SwapStepError {
    #[error("sqrt ratio limit is on the wrong side of the current price")]
    WrongLimitDirection,
    #[error(transparent)]
    AmountDelta(#[from] AmountDeltaError),
    #[error(transparent)]
    Fee(#[from] FeeError),
    #[error("step amount does not fit in a signed 128-bit value")]
    SignedOverflow,
}

/// Result of [`compute_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    /// Portion of the specified amount used by this step, same sign as the input.
    pub consumed_amount: i128,
    /// Output for exact input, required input for exact output.
    pub calculated_amount: u128,
    pub sqrt_ratio_next: U256,
    pub fee_amount: u128,
}

impl SwapStep {
    fn noop(sqrt_ratio: U256) -> Self {
        Self {
            consumed_amount: 0,
            calculated_amount: 0,
            sqrt_ratio_next: sqrt_ratio,
            fee_amount: 0,
        }
    }
}

/// Selling token0 or buying token1 lowers the price; the opposite raises it.
pub fn is_price_increasing(amount: i128, is_token1: bool) -> bool {
    (amount < 0) != is_token1
}

fn signed(value: u128) -> Result<i128, SwapStepError> {
    i128::try_from(value).map_err(|_| SwapStepError::SignedOverflow)
}

/// Simulates a swap of `amount` of the specified token against `liquidity`,
/// moving the price from `sqrt_ratio` no further than `sqrt_ratio_limit`.
///
/// A positive amount is an exact input, a negative amount an exact output.
/// The fee is taken from the input before price impact is computed.
pub fn compute_step(
    sqrt_ratio: U256,
    liquidity: u128,
    sqrt_ratio_limit: U256,
    amount: i128,
    is_token1: bool,
    fee: u64,
) -> Result<SwapStep, SwapStepError> {
    if amount == 0 || sqrt_ratio == sqrt_ratio_limit {
        return Ok(SwapStep::noop(sqrt_ratio));
    }

    let increasing = is_price_increasing(amount, is_token1);
    if (sqrt_ratio_limit > sqrt_ratio) != increasing {
        return Err(SwapStepError::WrongLimitDirection);
    }

    if liquidity == 0 {
        return Ok(SwapStep::noop(sqrt_ratio_limit));
    }

    let exact_output = amount < 0;
    let price_impact_amount = if exact_output {
        amount
    } else {
        amount - signed(compute_fee(amount.unsigned_abs(), fee))?
    };

    let next = if is_token1 {
        next_sqrt_ratio_from_amount1(sqrt_ratio, liquidity, price_impact_amount)
    } else {
        next_sqrt_ratio_from_amount0(sqrt_ratio, liquidity, price_impact_amount)
    };

    let liquidity = U256::from(liquidity);

    let limited = match next {
        None => true,
        Some(next) if increasing => next > sqrt_ratio_limit,
        Some(next) => next < sqrt_ratio_limit,
    };

    let next = match next {
        Some(next) if !limited => next,
        _ => {
            let (specified, calculated) = if is_token1 {
                (
                    amount1_delta(sqrt_ratio_limit, sqrt_ratio, liquidity, !exact_output)?,
                    amount0_delta(sqrt_ratio_limit, sqrt_ratio, liquidity, exact_output)?,
                )
            } else {
                (
                    amount0_delta(sqrt_ratio_limit, sqrt_ratio, liquidity, !exact_output)?,
                    amount1_delta(sqrt_ratio_limit, sqrt_ratio, liquidity, exact_output)?,
                )
            };

            return if exact_output {
                let before_fee = amount_before_fee(calculated, fee)?;
                Ok(SwapStep {
                    consumed_amount: -signed(specified)?,
                    calculated_amount: before_fee,
                    sqrt_ratio_next: sqrt_ratio_limit,
                    fee_amount: before_fee - calculated,
                })
            } else {
                let before_fee = amount_before_fee(specified, fee)?;
                Ok(SwapStep {
                    consumed_amount: signed(before_fee)?,
                    calculated_amount: calculated,
                    sqrt_ratio_next: sqrt_ratio_limit,
                    fee_amount: before_fee - specified,
                })
            };
        },
    };

    // Too small to move the price: the whole amount is kept as fee.
    if next == sqrt_ratio {
        return Ok(SwapStep {
            consumed_amount: amount,
            calculated_amount: 0,
            sqrt_ratio_next: sqrt_ratio,
            fee_amount: amount.unsigned_abs(),
        });
    }

    let calculated = if is_token1 {
        amount0_delta(next, sqrt_ratio, liquidity, exact_output)?
    } else {
        amount1_delta(next, sqrt_ratio, liquidity, exact_output)?
    };

    if exact_output {
        let before_fee = amount_before_fee(calculated, fee)?;
        Ok(SwapStep {
            consumed_amount: amount,
            calculated_amount: before_fee,
            sqrt_ratio_next: next,
            fee_amount: before_fee - calculated,
        })
    } else {
        Ok(SwapStep {
            consumed_amount: amount,
            calculated_amount: calculated,
            sqrt_ratio_next: next,
            fee_amount: (amount - price_impact_amount).unsigned_abs(),
        })
    }
}
