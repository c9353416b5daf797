//! Fixed-point math for concentrated liquidity pools.
//!
//! - [`tick`] - tick to sqrt ratio conversion
//! - [`sqrt_ratio`] - compact 96-bit price representation
//! - [`delta`] - token amounts between prices and inverse price impact
//! - [`fee`] - 0.64 fee fractions
//! - [`swap`] - a single constant-liquidity swap step
//! - [`exp2`] / [`twamm`] - price evolution under streaming orders
//!
//! All prices are Q128.128 sqrt ratios held in [`U256`](alloy::primitives::U256).
//! Overflow is always reported, never wrapped.

pub mod delta;
pub mod exp2;
pub mod fee;
pub mod sqrt_ratio;
pub mod swap;
pub mod tick;
pub mod twamm;
pub mod uint;

pub use delta::{
    amount0_delta, amount1_delta, next_sqrt_ratio_from_amount0, next_sqrt_ratio_from_amount1,
    AmountDeltaError,
};
pub use fee::{amount_before_fee, compute_fee, FeeError};
pub use sqrt_ratio::{compact_to_fixed, fixed_to_compact, round_to_representable};
pub use swap::{compute_step, is_price_increasing, SwapStep, SwapStepError};
pub use tick::{tick_to_sqrt_ratio, TickError, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK};
pub use twamm::{calculate_next_sqrt_ratio, compute_amount_from_sale_rate};
