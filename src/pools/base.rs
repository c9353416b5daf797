use alloy::{
    primitives::{Address, Bytes, Log, U256},
    sol_types::SolCall,
};
use log::warn;

use super::{
    approximate_number_of_tick_spacings_crossed, is_token1, resolve_sqrt_ratio_limit, to_signed,
    Deployment, PoolKey, Quote, QuoteRequest, BASE_GAS_COST, GAS_COST_PER_INITIALIZED_TICK_CROSSED,
    GAS_COST_PER_TICK_SPACING_CROSSED,
};
use crate::{
    abis::IQuoteDataFetcher,
    error::{PricingError, QuoteError, SubscriberError},
    events::{parse_core_log, EkuboEvent},
    ledger::{Tick, TickLedger},
    math::{compact_to_fixed, compute_step, is_price_increasing, tick_to_sqrt_ratio},
    multicall::Call,
    subscriber::{expect_outputs, BlockHeader, EventSubscriber},
};

/// Concentrated liquidity pool state.
///
/// `liquidity` equals the ledger's running sum at its active index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasePoolState {
    pub sqrt_ratio: U256,
    pub liquidity: u128,
    pub active_tick: i32,
    pub ledger: TickLedger,
}

#[derive(Debug, Clone)]
pub struct BasePool {
    key: PoolKey,
    core: Address,
    quote_data_fetcher: Address,
    min_tick_spacings: u32,
}

impl BasePool {
    pub fn new(key: PoolKey, deployment: &Deployment) -> Self {
        Self {
            key,
            core: deployment.core,
            quote_data_fetcher: deployment.quote_data_fetcher,
            min_tick_spacings: deployment.min_tick_spacings,
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Walks the initialized ticks from the active one until the amount is
    /// used up or the price limit is reached.
    pub fn quote(&self, state: &BasePoolState, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let is_token1 = is_token1(&self.key, request.token)?;
        let amount = request.amount;
        if amount == 0 {
            return Ok(Quote::default());
        }

        let increasing = is_price_increasing(amount, is_token1);
        let sqrt_ratio_limit =
            resolve_sqrt_ratio_limit(request.sqrt_ratio_limit, state.sqrt_ratio, amount, is_token1)?;

        let ticks = state.ledger.ticks();
        let mut sqrt_ratio = state.sqrt_ratio;
        let mut liquidity = state.liquidity;
        let mut active_tick_index = state.ledger.active_tick_index();
        let mut calculated_amount: u128 = 0;
        let mut amount_remaining = amount;
        let mut initialized_ticks_crossed: u32 = 0;

        while amount_remaining != 0 && sqrt_ratio != sqrt_ratio_limit {
            let next_index = if increasing {
                Some(active_tick_index.map_or(0, |index| index + 1))
            } else {
                active_tick_index
            };
            let next_tick = match next_index.and_then(|index| ticks.get(index).map(|t| (index, *t))) {
                Some((index, tick)) => Some((
                    index,
                    tick,
                    tick_to_sqrt_ratio(tick.number).map_err(PricingError::from)?,
                )),
                None => None,
            };

            let step_sqrt_ratio_limit = next_tick.map_or(sqrt_ratio_limit, |(_, _, next_ratio)| {
                if (next_ratio < sqrt_ratio_limit) == increasing {
                    next_ratio
                } else {
                    sqrt_ratio_limit
                }
            });

            let step = compute_step(
                sqrt_ratio,
                liquidity,
                step_sqrt_ratio_limit,
                amount_remaining,
                is_token1,
                self.key.config.fee,
            )
            .map_err(PricingError::from)?;

            amount_remaining -= step.consumed_amount;
            calculated_amount = calculated_amount
                .checked_add(step.calculated_amount)
                .ok_or(PricingError::AmountOverflow)?;
            sqrt_ratio = step.sqrt_ratio_next;

            match next_tick {
                Some((index, tick, tick_sqrt_ratio)) => {
                    if sqrt_ratio == tick_sqrt_ratio {
                        active_tick_index = if increasing { Some(index) } else { index.checked_sub(1) };
                        initialized_ticks_crossed += 1;

                        let delta = tick.liquidity_delta.unsigned_abs();
                        liquidity = if (tick.liquidity_delta > 0) == increasing {
                            liquidity.checked_add(delta)
                        } else {
                            liquidity.checked_sub(delta)
                        }
                        .ok_or(PricingError::LiquidityOverflow(tick.number))?;
                    }
                },
                None => {
                    active_tick_index = if increasing { ticks.len().checked_sub(1) } else { None };
                },
            }
        }

        let tick_spacings_crossed = approximate_number_of_tick_spacings_crossed(
            state.sqrt_ratio,
            sqrt_ratio,
            self.key.config.tick_spacing,
        );
        let skip_ahead = if initialized_ticks_crossed == 0 {
            0
        } else {
            tick_spacings_crossed / initialized_ticks_crossed
        };

        Ok(Quote {
            consumed_amount: amount - amount_remaining,
            calculated_amount: to_signed(calculated_amount)?,
            gas_consumed: BASE_GAS_COST
                .saturating_add(initialized_ticks_crossed.saturating_mul(GAS_COST_PER_INITIALIZED_TICK_CROSSED))
                .saturating_add(tick_spacings_crossed.saturating_mul(GAS_COST_PER_TICK_SPACING_CROSSED)),
            skip_ahead,
        })
    }

    fn apply_position_update(
        &self,
        state: &BasePoolState,
        lower: i32,
        upper: i32,
        liquidity_delta: i128,
    ) -> Option<BasePoolState> {
        let mut next = state.clone();
        let updated = next
            .ledger
            .update_tick(lower, liquidity_delta, false, false, state.active_tick)
            .and_then(|()| {
                next.ledger
                    .update_tick(upper, liquidity_delta, true, false, state.active_tick)
            });
        if let Err(e) = updated {
            warn!("Failed to apply position update to pool {}: {}", self.key.id(), e);
            return None;
        }

        if lower <= state.active_tick && state.active_tick < upper {
            let Some(liquidity) = state.liquidity.checked_add_signed(liquidity_delta) else {
                warn!(
                    "Liquidity delta {} overflows liquidity {} of pool {}",
                    liquidity_delta,
                    state.liquidity,
                    self.key.id()
                );
                return None;
            };
            next.liquidity = liquidity;
        }

        Some(next)
    }
}

impl EventSubscriber for BasePool {
    type State = BasePoolState;

    fn addresses_subscribed(&self) -> Vec<Address> {
        vec![self.core]
    }

    fn process_log(
        &self,
        state: &BasePoolState,
        log: &Log,
        _header: &BlockHeader,
    ) -> Option<BasePoolState> {
        let pool_id = self.key.id();
        match parse_core_log(log, self.core)? {
            EkuboEvent::Swapped(event) => {
                assert_eq!(event.pool_id, pool_id, "Swapped routed to the wrong pool");
                let mut next = state.clone();
                next.sqrt_ratio = event.sqrt_ratio_after;
                next.liquidity = event.liquidity_after;
                next.active_tick = event.tick_after;
                next.ledger.set_active_tick(event.tick_after);
                Some(next)
            },
            EkuboEvent::PositionUpdated(event) => {
                assert_eq!(event.poolId, pool_id, "PositionUpdated routed to the wrong pool");
                let delta = event.params.liquidityDelta;
                if delta == 0 {
                    return None;
                }
                let bounds = &event.params.bounds;
                self.apply_position_update(state, bounds.lower, bounds.upper, delta)
            },
            _ => None,
        }
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        let call = IQuoteDataFetcher::getQuoteDataCall {
            poolKeys: vec![self.key.to_abi()],
            minTickSpacings: self.min_tick_spacings,
        };
        vec![Call::new(self.quote_data_fetcher, call.abi_encode())]
    }

    fn generate_state(&self, outputs: &[Bytes], _block: u64) -> Result<BasePoolState, SubscriberError> {
        expect_outputs(outputs, 1)?;
        let data = IQuoteDataFetcher::getQuoteDataCall::abi_decode_returns(&outputs[0])?;
        let data = data
            .first()
            .ok_or_else(|| SubscriberError::InvalidState("empty quote data".to_string()))?;

        let ticks = data
            .ticks
            .iter()
            .map(|t| Tick::new(t.number, t.liquidityDelta))
            .collect();
        let mut ledger = TickLedger::new(ticks, data.tick, (data.minTick, data.maxTick));
        ledger.add_liquidity_cutoffs(data.tick, data.liquidity)?;

        Ok(BasePoolState {
            sqrt_ratio: compact_to_fixed(data.sqrtRatio),
            liquidity: data.liquidity,
            active_tick: data.tick,
            ledger,
        })
    }
}
