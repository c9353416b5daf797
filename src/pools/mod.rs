//! Ekubo pools: state, log transitions and quoting.
//!
//! Every pool kind is an [`EventSubscriber`](crate::subscriber::EventSubscriber)
//! wrapped in a [`StatefulSubscriber`]. [`EkuboPool`] closes over the kinds so
//! the registry can drive them uniformly.

mod base;
mod full_range;
mod key;
mod oracle;
mod registry;
mod twamm;

use std::sync::Arc;

use alloy::primitives::{Address, Log, U256};

use crate::{
    error::{PricingError, QuoteError, SubscriberError},
    math::{is_price_increasing, MAX_SQRT_RATIO, MIN_SQRT_RATIO},
    multicall::MulticallExecutor,
    subscriber::{BlockHeader, StatefulSubscriber},
    utils::{sqrt_ratio_to_price, u256_to_f64},
};

pub use base::{BasePool, BasePoolState};
pub use full_range::{FullRangePool, FullRangePoolState};
pub use key::{Extensions, PoolConfig, PoolKey, PoolKind};
pub use oracle::OraclePool;
pub use registry::{BlockOutcome, PoolRegistry, RankedQuote};
pub use twamm::{
    CoreLens, SaleRateDelta, SaleRateState, SaleRatesLens, SaleRatesSubscriber, TwammPool,
    TwammPoolState,
};

/// Gas of a swap in a pool with initialized ticks, before any tick is crossed.
pub const BASE_GAS_COST: u32 = 90_000;
pub const GAS_COST_PER_INITIALIZED_TICK_CROSSED: u32 = 20_000;
pub const GAS_COST_PER_TICK_SPACING_CROSSED: u32 = 4_000;
pub const FULL_RANGE_GAS_COST: u32 = 80_000;
/// Writing a price observation.
pub const ORACLE_GAS_SURCHARGE: u32 = 15_000;
pub const VIRTUAL_ORDERS_EXECUTED_GAS_COST: u32 = 25_000;
pub const GAS_COST_PER_SALE_RATE_DELTA_CROSSED: u32 = 20_000;

/// ln(sqrt(1.000001)): one tick in log sqrt-ratio space.
const LOG_BASE_SQRT_TICK_SIZE: f64 = 4.999_997_500_588_806e-7;

/// Contract addresses of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub core: Address,
    pub quote_data_fetcher: Address,
    pub twamm_data_fetcher: Address,
    pub extensions: Extensions,
    /// Tick spacings fetched on each side of the active tick on a cold read.
    pub min_tick_spacings: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quote {
    pub consumed_amount: i128,
    pub calculated_amount: i128,
    pub gas_consumed: u32,
    /// Average uncrossed tick spacings per initialized tick crossed.
    pub skip_ahead: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Positive for exact input, negative for exact output.
    pub amount: i128,
    pub token: Address,
    pub sqrt_ratio_limit: Option<U256>,
    /// Time virtual orders are executed up to. Defaults to now.
    pub timestamp: Option<u64>,
}

impl QuoteRequest {
    pub fn new(amount: i128, token: Address) -> Self {
        Self {
            amount,
            token,
            sqrt_ratio_limit: None,
            timestamp: None,
        }
    }

    pub fn with_sqrt_ratio_limit(mut self, limit: U256) -> Self {
        self.sqrt_ratio_limit = Some(limit);
        self
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Whether `token` is token1 of the pool.
pub(crate) fn is_token1(key: &PoolKey, token: Address) -> Result<bool, QuoteError> {
    if token == key.token1 {
        Ok(true)
    } else if token == key.token0 {
        Ok(false)
    } else {
        Err(QuoteError::InvalidToken(token))
    }
}

/// The caller's limit, checked against the swap direction, or the extreme
/// price in that direction.
pub(crate) fn resolve_sqrt_ratio_limit(
    limit: Option<U256>,
    sqrt_ratio: U256,
    amount: i128,
    is_token1: bool,
) -> Result<U256, PricingError> {
    let increasing = is_price_increasing(amount, is_token1);
    let Some(limit) = limit else {
        return Ok(if increasing { MAX_SQRT_RATIO } else { MIN_SQRT_RATIO });
    };

    let wrong_side = if increasing { limit < sqrt_ratio } else { limit > sqrt_ratio };
    if wrong_side || limit < MIN_SQRT_RATIO || limit > MAX_SQRT_RATIO {
        return Err(PricingError::InvalidSqrtRatioLimit(limit));
    }
    Ok(limit)
}

pub(crate) fn to_signed(amount: u128) -> Result<i128, PricingError> {
    i128::try_from(amount).map_err(|_| PricingError::AmountOverflow)
}

/// Tick spacings between two prices, estimated from their log distance.
pub fn approximate_number_of_tick_spacings_crossed(
    sqrt_ratio_start: U256,
    sqrt_ratio_end: U256,
    tick_spacing: u32,
) -> u32 {
    if tick_spacing == 0 || sqrt_ratio_start.is_zero() || sqrt_ratio_end.is_zero() {
        return 0;
    }
    let ratio = u256_to_f64(sqrt_ratio_start) / u256_to_f64(sqrt_ratio_end);
    let ticks_crossed = (ratio.ln().abs() / LOG_BASE_SQRT_TICK_SIZE) as u32;
    ticks_crossed / tick_spacing
}

macro_rules! dispatch {
    ($pool:expr, $sub:ident => $body:expr) => {
        match $pool {
            EkuboPool::Base($sub) => $body,
            EkuboPool::FullRange($sub) => $body,
            EkuboPool::Oracle($sub) => $body,
            EkuboPool::Twamm($sub) => $body,
        }
    };
}

/// A tracked pool of any kind.
pub enum EkuboPool {
    Base(StatefulSubscriber<BasePool>),
    FullRange(StatefulSubscriber<FullRangePool>),
    Oracle(StatefulSubscriber<OraclePool>),
    Twamm(StatefulSubscriber<TwammPool>),
}

impl EkuboPool {
    pub fn new(
        key: PoolKey,
        deployment: &Deployment,
        executor: Arc<dyn MulticallExecutor>,
        retention_blocks: u64,
    ) -> Self {
        match PoolKind::of(&key, &deployment.extensions) {
            PoolKind::Base => Self::Base(StatefulSubscriber::new(
                BasePool::new(key, deployment),
                executor,
                retention_blocks,
            )),
            PoolKind::FullRange => Self::FullRange(StatefulSubscriber::new(
                FullRangePool::new(key, deployment),
                executor,
                retention_blocks,
            )),
            PoolKind::Oracle => Self::Oracle(StatefulSubscriber::new(
                OraclePool::new(key, deployment),
                executor,
                retention_blocks,
            )),
            PoolKind::Twamm => Self::Twamm(StatefulSubscriber::new(
                TwammPool::new(key, deployment),
                executor,
                retention_blocks,
            )),
        }
    }

    pub fn key(&self) -> &PoolKey {
        dispatch!(self, sub => sub.inner().key())
    }

    pub fn kind(&self) -> PoolKind {
        match self {
            Self::Base(_) => PoolKind::Base,
            Self::FullRange(_) => PoolKind::FullRange,
            Self::Oracle(_) => PoolKind::Oracle,
            Self::Twamm(_) => PoolKind::Twamm,
        }
    }

    pub fn addresses_subscribed(&self) -> Vec<Address> {
        dispatch!(self, sub => sub.addresses_subscribed())
    }

    pub fn last_block(&self) -> Option<u64> {
        dispatch!(self, sub => sub.last_block())
    }

    pub fn apply_block(&self, logs: &[Log], header: &BlockHeader) -> Result<bool, SubscriberError> {
        dispatch!(self, sub => sub.apply_block(logs, header))
    }

    pub fn advance_to(&self, block: u64) {
        dispatch!(self, sub => sub.advance_to(block))
    }

    pub fn restart(&self, from_block: u64) {
        dispatch!(self, sub => sub.restart(from_block))
    }

    /// Makes sure a state exists at `block`, regenerating it if needed.
    pub async fn ensure_state(&self, block: u64) -> Result<(), SubscriberError> {
        dispatch!(self, sub => sub.get_or_generate_state(block).await.map(|_| ()))
    }

    /// Pool price at `block` in raw token1 units per raw token0 unit.
    pub fn spot_price(&self, block: u64) -> Option<f64> {
        let sqrt_ratio = match self {
            Self::Base(sub) => sub.get_state(block)?.sqrt_ratio,
            Self::FullRange(sub) => sub.get_state(block)?.sqrt_ratio,
            Self::Oracle(sub) => sub.get_state(block)?.sqrt_ratio,
            Self::Twamm(sub) => sub.get_state(block)?.full_range.sqrt_ratio,
        };
        sqrt_ratio_to_price(sqrt_ratio, 0, 0)
    }

    /// Quotes against the cached state at `block`.
    pub fn quote(&self, request: &QuoteRequest, block: u64) -> Result<Quote, QuoteError> {
        dispatch!(self, sub => {
            let state = sub.get_state(block).ok_or(QuoteError::NotReady(block))?;
            sub.inner().quote(&state, request)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_to_sqrt_ratio;

    #[test]
    fn test_resolve_sqrt_ratio_limit() {
        let price = tick_to_sqrt_ratio(0).unwrap();
        assert_eq!(
            resolve_sqrt_ratio_limit(None, price, 10, true),
            Ok(MAX_SQRT_RATIO)
        );
        assert_eq!(
            resolve_sqrt_ratio_limit(None, price, 10, false),
            Ok(MIN_SQRT_RATIO)
        );

        let above = tick_to_sqrt_ratio(10).unwrap();
        assert_eq!(
            resolve_sqrt_ratio_limit(Some(above), price, 10, true),
            Ok(above)
        );
        assert_eq!(
            resolve_sqrt_ratio_limit(Some(above), price, 10, false),
            Err(PricingError::InvalidSqrtRatioLimit(above))
        );
        assert!(resolve_sqrt_ratio_limit(Some(MAX_SQRT_RATIO + U256::from(1)), price, 10, true).is_err());
    }

    #[test]
    fn test_approximate_tick_spacings_crossed() {
        let start = tick_to_sqrt_ratio(0).unwrap();
        let end = tick_to_sqrt_ratio(10_000).unwrap();
        assert_eq!(approximate_number_of_tick_spacings_crossed(start, start, 100), 0);
        assert_eq!(approximate_number_of_tick_spacings_crossed(start, end, 0), 0);

        let crossed = approximate_number_of_tick_spacings_crossed(start, end, 100);
        assert!((99..=100).contains(&crossed));
        assert_eq!(
            approximate_number_of_tick_spacings_crossed(end, start, 100),
            crossed
        );
    }
}
