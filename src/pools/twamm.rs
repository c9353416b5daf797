//! TWAMM pools: a full range pool plus continuously executing sell orders.
//!
//! The state is composed of two independently maintained parts. The full
//! range part follows core `Swapped`/`PositionUpdated` logs, the sale rate
//! part follows the extension's `VirtualOrdersExecuted`/`OrderUpdated` logs.

use alloy::{
    primitives::{Address, Bytes, Log},
    sol_types::SolCall,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{
    full_range::FullRangePoolState, is_token1, to_signed, Deployment, FullRangePool, PoolKey, Quote,
    QuoteRequest, GAS_COST_PER_SALE_RATE_DELTA_CROSSED, VIRTUAL_ORDERS_EXECUTED_GAS_COST,
};
use crate::{
    abis::ITwammDataFetcher,
    error::{PricingError, QuoteError, SubscriberError},
    events::{parse_twamm_log, EkuboEvent},
    math::{calculate_next_sqrt_ratio, compute_amount_from_sale_rate, MAX_SQRT_RATIO, MIN_SQRT_RATIO},
    multicall::Call,
    subscriber::{expect_outputs, BlockHeader, ComposedSubscriber, EventSubscriber, Focused},
};

/// Sale rate change scheduled at `time`, from orders starting or ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleRateDelta {
    pub time: u64,
    pub sale_rate_delta0: i128,
    pub sale_rate_delta1: i128,
}

/// Sale rates in effect since `last_execution_time`, plus the pending
/// changes, sorted by time and all later than `last_execution_time`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaleRateState {
    pub token0_sale_rate: u128,
    pub token1_sale_rate: u128,
    pub last_execution_time: u64,
    pub virtual_order_deltas: Vec<SaleRateDelta>,
}

impl SaleRateState {
    /// Adds `delta` to the entry at `time`, inserting or removing it as needed.
    fn accumulate(&mut self, time: u64, delta0: i128, delta1: i128) -> Option<()> {
        let index = self.virtual_order_deltas.partition_point(|d| d.time < time);
        match self.virtual_order_deltas.get_mut(index) {
            Some(entry) if entry.time == time => {
                entry.sale_rate_delta0 = entry.sale_rate_delta0.checked_add(delta0)?;
                entry.sale_rate_delta1 = entry.sale_rate_delta1.checked_add(delta1)?;
                if entry.sale_rate_delta0 == 0 && entry.sale_rate_delta1 == 0 {
                    self.virtual_order_deltas.remove(index);
                }
            },
            _ => self.virtual_order_deltas.insert(
                index,
                SaleRateDelta {
                    time,
                    sale_rate_delta0: delta0,
                    sale_rate_delta1: delta1,
                },
            ),
        }
        Some(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TwammPoolState {
    pub full_range: FullRangePoolState,
    pub sale_rates: SaleRateState,
}

crate::lens!(pub CoreLens: TwammPoolState => full_range: FullRangePoolState);
crate::lens!(pub SaleRatesLens: TwammPoolState => sale_rates: SaleRateState);

fn apply_sale_rate_delta(rate: u128, delta: i128) -> Result<u128, PricingError> {
    rate.checked_add_signed(delta).ok_or(PricingError::SaleRateOverflow)
}

fn unix_seconds(now: DateTime<Utc>) -> Result<u64, QuoteError> {
    let seconds = now.timestamp();
    u64::try_from(seconds).map_err(|_| QuoteError::ClockBeforeEpoch(seconds))
}

/// Maintains the sale rate part of a TWAMM pool from extension logs.
#[derive(Debug, Clone)]
pub struct SaleRatesSubscriber {
    key: PoolKey,
    twamm_data_fetcher: Address,
}

impl SaleRatesSubscriber {
    pub fn new(key: PoolKey, deployment: &Deployment) -> Self {
        Self {
            key,
            twamm_data_fetcher: deployment.twamm_data_fetcher,
        }
    }

    fn order_updated(
        &self,
        state: &SaleRateState,
        sell_token0: bool,
        start: u64,
        end: u64,
        delta: i128,
        now: u64,
    ) -> Option<SaleRateState> {
        let mut next = state.clone();
        let (delta0, delta1) = if sell_token0 { (delta, 0) } else { (0, delta) };

        if start <= now && now < end {
            let rate = if sell_token0 {
                &mut next.token0_sale_rate
            } else {
                &mut next.token1_sale_rate
            };
            *rate = rate.checked_add_signed(delta)?;
        }
        if start > now {
            next.accumulate(start, delta0, delta1)?;
        }
        if end > now {
            next.accumulate(end, delta0.checked_neg()?, delta1.checked_neg()?)?;
        }

        Some(next)
    }
}

impl EventSubscriber for SaleRatesSubscriber {
    type State = SaleRateState;

    fn addresses_subscribed(&self) -> Vec<Address> {
        vec![self.key.config.extension]
    }

    fn process_log(
        &self,
        state: &SaleRateState,
        log: &Log,
        header: &BlockHeader,
    ) -> Option<SaleRateState> {
        let event = parse_twamm_log(log, self.key.config.extension)?;
        assert_eq!(
            event.pool_id(log.address),
            self.key.id(),
            "TWAMM event routed to the wrong pool"
        );

        match event {
            EkuboEvent::VirtualOrdersExecuted(event) => {
                let now = header.timestamp;
                Some(SaleRateState {
                    token0_sale_rate: event.token0_sale_rate,
                    token1_sale_rate: event.token1_sale_rate,
                    last_execution_time: now,
                    virtual_order_deltas: state
                        .virtual_order_deltas
                        .iter()
                        .filter(|d| d.time > now)
                        .copied()
                        .collect(),
                })
            },
            EkuboEvent::OrderUpdated(event) => {
                let Ok(delta) = i128::try_from(event.saleRateDelta) else {
                    warn!("Sale rate delta {} out of range", event.saleRateDelta);
                    return None;
                };
                if delta == 0 {
                    return None;
                }
                let order = &event.orderKey;
                let next = self.order_updated(
                    state,
                    order.sellToken == self.key.token0,
                    order.startTime,
                    order.endTime,
                    delta,
                    header.timestamp,
                );
                if next.is_none() {
                    warn!("Sale rate overflow in pool {}", self.key.id());
                }
                next
            },
            _ => None,
        }
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        let call = ITwammDataFetcher::getPoolStateCall {
            poolKey: self.key.to_abi(),
        };
        vec![Call::new(self.twamm_data_fetcher, call.abi_encode())]
    }

    fn generate_state(&self, outputs: &[Bytes], _block: u64) -> Result<SaleRateState, SubscriberError> {
        expect_outputs(outputs, 1)?;
        let state = ITwammDataFetcher::getPoolStateCall::abi_decode_returns(&outputs[0])?;

        let virtual_order_deltas = state
            .saleRateDeltas
            .iter()
            .map(|d| {
                Ok(SaleRateDelta {
                    time: d.time,
                    sale_rate_delta0: i128::try_from(d.saleRateDelta0)
                        .map_err(|e| SubscriberError::InvalidState(e.to_string()))?,
                    sale_rate_delta1: i128::try_from(d.saleRateDelta1)
                        .map_err(|e| SubscriberError::InvalidState(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, SubscriberError>>()?;

        Ok(SaleRateState {
            token0_sale_rate: state.saleRateToken0.to::<u128>(),
            token1_sale_rate: state.saleRateToken1.to::<u128>(),
            last_execution_time: u64::from(state.lastVirtualOrderExecutionTime),
            virtual_order_deltas,
        })
    }
}

/// Outcome of executing virtual orders up to some time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VirtualExecution {
    pub full_range: FullRangePoolState,
    pub token0_sale_rate: u128,
    pub token1_sale_rate: u128,
    pub deltas_crossed: u32,
}

pub struct TwammPool {
    key: PoolKey,
    full_range: FullRangePool,
    subscriber: ComposedSubscriber<TwammPoolState>,
}

impl TwammPool {
    pub fn new(key: PoolKey, deployment: &Deployment) -> Self {
        let full_range = FullRangePool::new(key, deployment);
        let subscriber = ComposedSubscriber::<TwammPoolState>::new(vec![
            Box::new(Focused::new(CoreLens, full_range.clone())),
            Box::new(Focused::new(SaleRatesLens, SaleRatesSubscriber::new(key, deployment))),
        ]);
        Self {
            key,
            full_range,
            subscriber,
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Trades both order streams against the pool from the last execution
    /// until `now`, one segment per scheduled sale rate change.
    pub(crate) fn execute_virtual_orders(
        &self,
        state: &TwammPoolState,
        now: u64,
    ) -> Result<VirtualExecution, PricingError> {
        let rates = &state.sale_rates;
        let fee = self.key.config.fee;
        let liquidity = state.full_range.liquidity;

        if now < rates.last_execution_time {
            return Err(PricingError::ExecutionTimeInFuture {
                now,
                last_execution: rates.last_execution_time,
            });
        }

        let mut full_range = state.full_range;
        let mut next_sqrt_ratio = full_range.sqrt_ratio;
        let mut token0_sale_rate = rates.token0_sale_rate;
        let mut token1_sale_rate = rates.token1_sale_rate;
        let mut last_execution_time = rates.last_execution_time;
        let mut deltas_crossed = 0;

        let deltas = &rates.virtual_order_deltas;
        let mut next_delta_index = deltas.partition_point(|d| d.time <= last_execution_time);

        while last_execution_time != now {
            let delta = deltas.get(next_delta_index);
            let next_execution_time = delta.map_or(now, |d| d.time.min(now));
            let time_elapsed = u32::try_from(next_execution_time - last_execution_time)
                .map_err(|_| PricingError::ExecutionWindowTooLong)?;

            let amount0 = compute_amount_from_sale_rate(token0_sale_rate, time_elapsed, false);
            let amount1 = compute_amount_from_sale_rate(token1_sale_rate, time_elapsed, false);

            if amount0 > 0 && amount1 > 0 {
                let current_sqrt_ratio = next_sqrt_ratio.clamp(MIN_SQRT_RATIO, MAX_SQRT_RATIO);
                next_sqrt_ratio = calculate_next_sqrt_ratio(
                    current_sqrt_ratio,
                    liquidity,
                    token0_sale_rate,
                    token1_sale_rate,
                    time_elapsed,
                    fee,
                )
                .ok_or(PricingError::SaleRateOverflow)?
                .clamp(MIN_SQRT_RATIO, MAX_SQRT_RATIO);

                let (amount, is_token1) = if current_sqrt_ratio < next_sqrt_ratio {
                    (amount1, true)
                } else {
                    (amount0, false)
                };
                let (_, after) = full_range.swap(fee, to_signed(amount)?, is_token1, Some(next_sqrt_ratio))?;
                full_range = after;
            } else if amount0 > 0 || amount1 > 0 {
                let (amount, is_token1, limit) = if amount0 != 0 {
                    (amount0, false, MIN_SQRT_RATIO)
                } else {
                    (amount1, true, MAX_SQRT_RATIO)
                };
                let (_, after) = full_range.swap(fee, to_signed(amount)?, is_token1, Some(limit))?;
                full_range = after;
                next_sqrt_ratio = after.sqrt_ratio;
            }

            if let Some(delta) = delta.filter(|d| d.time == next_execution_time) {
                token0_sale_rate = apply_sale_rate_delta(token0_sale_rate, delta.sale_rate_delta0)?;
                token1_sale_rate = apply_sale_rate_delta(token1_sale_rate, delta.sale_rate_delta1)?;
                next_delta_index += 1;
                deltas_crossed += 1;
            }

            last_execution_time = next_execution_time;
        }

        Ok(VirtualExecution {
            full_range,
            token0_sale_rate,
            token1_sale_rate,
            deltas_crossed,
        })
    }

    /// Executes pending virtual orders, then quotes against the resulting
    /// full range state.
    pub fn quote(&self, state: &TwammPoolState, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        is_token1(&self.key, request.token)?;

        let now = match request.timestamp {
            Some(timestamp) => timestamp,
            None => unix_seconds(Utc::now())?,
        };
        let execution = self.execute_virtual_orders(state, now)?;
        if execution.deltas_crossed > 0 {
            debug!(
                "Crossed {} sale rate changes quoting pool {}",
                execution.deltas_crossed,
                self.key.id()
            );
        }

        let mut quote = self.full_range.quote(&execution.full_range, request)?;
        if now > state.sale_rates.last_execution_time {
            quote.gas_consumed += VIRTUAL_ORDERS_EXECUTED_GAS_COST;
        }
        quote.gas_consumed += execution.deltas_crossed * GAS_COST_PER_SALE_RATE_DELTA_CROSSED;
        Ok(quote)
    }
}

impl EventSubscriber for TwammPool {
    type State = TwammPoolState;

    fn addresses_subscribed(&self) -> Vec<Address> {
        self.subscriber.addresses_subscribed()
    }

    fn process_log(
        &self,
        state: &TwammPoolState,
        log: &Log,
        header: &BlockHeader,
    ) -> Option<TwammPoolState> {
        self.subscriber.process_log(state, log, header)
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        self.subscriber.generate_state_calls()
    }

    fn generate_state(&self, outputs: &[Bytes], block: u64) -> Result<TwammPoolState, SubscriberError> {
        self.subscriber.generate_state(outputs, block)
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::aliases::{I112, U112},
        sol_types::SolValue,
    };

    use super::*;
    use crate::{
        abis::{AbiTwammPoolState, QuoteData, SaleRateDelta as AbiSaleRateDelta},
        events::testing::{order_updated_log, swapped_log, virtual_orders_executed_log},
        math::{fixed_to_compact, tick_to_sqrt_ratio},
        pools::{
            full_range::tests::{deployment, CORE, TOKEN0, TOKEN1, TWAMM},
            PoolConfig, FULL_RANGE_GAS_COST,
        },
    };

    const ONE_PER_SECOND: u128 = 1 << 32;

    fn pool() -> TwammPool {
        TwammPool::new(
            PoolKey::new(TOKEN0, TOKEN1, PoolConfig::new(TWAMM, 0, 0)),
            &deployment(),
        )
    }

    fn state(sale_rates: SaleRateState) -> TwammPoolState {
        TwammPoolState {
            full_range: FullRangePoolState::new(tick_to_sqrt_ratio(1).unwrap(), 100_000),
            sale_rates,
        }
    }

    fn rates(token0: u128, token1: u128, last: u64, deltas: &[(u64, i128, i128)]) -> SaleRateState {
        SaleRateState {
            token0_sale_rate: token0,
            token1_sale_rate: token1,
            last_execution_time: last,
            virtual_order_deltas: deltas
                .iter()
                .map(|&(time, d0, d1)| SaleRateDelta {
                    time,
                    sale_rate_delta0: d0,
                    sale_rate_delta1: d1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_idle_orders_quote_like_full_range() {
        let pool = pool();
        let state = state(SaleRateState::default());

        let quote = pool.quote(&state, &QuoteRequest::new(1000, TOKEN1).at(0)).unwrap();
        assert_eq!(quote.calculated_amount, 990);
        assert_eq!(quote.gas_consumed, FULL_RANGE_GAS_COST);

        let later = pool.quote(&state, &QuoteRequest::new(1000, TOKEN1).at(500)).unwrap();
        assert_eq!(later.calculated_amount, 990);
        assert_eq!(later.gas_consumed, FULL_RANGE_GAS_COST + VIRTUAL_ORDERS_EXECUTED_GAS_COST);
    }

    #[test]
    fn test_one_sided_orders_sell_into_pool() {
        let pool = pool();
        let state = state(rates(ONE_PER_SECOND, 0, 0, &[]));

        let execution = pool.execute_virtual_orders(&state, 100).unwrap();
        let (_, expected) = state.full_range.swap(0, 100, false, None).unwrap();
        assert_eq!(execution.full_range, expected);
        assert!(execution.full_range.sqrt_ratio < state.full_range.sqrt_ratio);
        assert_eq!(execution.deltas_crossed, 0);
    }

    #[test]
    fn test_sale_rate_delta_ends_segment() {
        let pool = pool();
        let state = state(rates(
            ONE_PER_SECOND,
            0,
            0,
            &[(50, -(ONE_PER_SECOND as i128), 0)],
        ));

        let execution = pool.execute_virtual_orders(&state, 100).unwrap();
        let (_, expected) = state.full_range.swap(0, 50, false, None).unwrap();
        assert_eq!(execution.full_range, expected);
        assert_eq!(execution.token0_sale_rate, 0);
        assert_eq!(execution.deltas_crossed, 1);

        let quote = pool.quote(&state, &QuoteRequest::new(1000, TOKEN1).at(100)).unwrap();
        assert_eq!(
            quote.gas_consumed,
            FULL_RANGE_GAS_COST + VIRTUAL_ORDERS_EXECUTED_GAS_COST + GAS_COST_PER_SALE_RATE_DELTA_CROSSED
        );
    }

    #[test]
    fn test_balanced_orders_keep_price_at_sale_ratio() {
        let pool = pool();
        let mut state = state(rates(ONE_PER_SECOND, ONE_PER_SECOND, 0, &[]));
        state.full_range.sqrt_ratio = tick_to_sqrt_ratio(0).unwrap();

        let execution = pool.execute_virtual_orders(&state, 1_000).unwrap();
        assert_eq!(execution.full_range, state.full_range);
        assert_eq!(execution.token0_sale_rate, ONE_PER_SECOND);
    }

    #[test]
    fn test_execution_time_errors() {
        let pool = pool();
        let state = state(rates(0, 0, 100, &[]));
        assert_eq!(
            pool.quote(&state, &QuoteRequest::new(1, TOKEN0).at(99)),
            Err(QuoteError::Unpriceable(PricingError::ExecutionTimeInFuture {
                now: 99,
                last_execution: 100
            }))
        );

        let far = 100 + u64::from(u32::MAX) + 1;
        assert_eq!(
            pool.execute_virtual_orders(&state, far),
            Err(PricingError::ExecutionWindowTooLong)
        );
    }

    #[test]
    fn test_clock_before_epoch_is_an_error() {
        let before = DateTime::from_timestamp(-5, 0).unwrap();
        assert_eq!(unix_seconds(before), Err(QuoteError::ClockBeforeEpoch(-5)));

        let after = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(unix_seconds(after), Ok(1_700_000_000));
    }

    #[test]
    fn test_addresses_include_extension() {
        assert_eq!(pool().addresses_subscribed(), vec![CORE, TWAMM]);
    }

    #[test]
    fn test_virtual_orders_executed_folds_elapsed_deltas() {
        let pool = pool();
        let id = pool.key().id();
        let start = state(rates(5, 7, 10, &[(20, -5, 0), (40, 0, -7)]));

        let log = virtual_orders_executed_log(TWAMM, id, 3, 7);
        let next = pool.process_log(&start, &log, &BlockHeader::new(2, 30)).unwrap();
        assert_eq!(next.sale_rates, rates(3, 7, 30, &[(40, 0, -7)]));
        assert_eq!(next.full_range, start.full_range);
    }

    #[test]
    fn test_order_updated_schedules_and_cancels() {
        let pool = pool();
        let header = BlockHeader::new(2, 100);
        let start = state(SaleRateState {
            last_execution_time: 100,
            ..Default::default()
        });

        // Future order selling token1
        let placed = pool
            .process_log(&start, &order_updated_log(TWAMM, TOKEN1, TOKEN0, 0, 200, 300, 9), &header)
            .unwrap();
        assert_eq!(placed.sale_rates.token1_sale_rate, 0);
        assert_eq!(
            placed.sale_rates.virtual_order_deltas,
            rates(0, 0, 0, &[(200, 0, 9), (300, 0, -9)]).virtual_order_deltas
        );

        // Active order selling token0
        let active = pool
            .process_log(&placed, &order_updated_log(TWAMM, TOKEN0, TOKEN1, 0, 50, 300, 4), &header)
            .unwrap();
        assert_eq!(active.sale_rates.token0_sale_rate, 4);
        assert_eq!(
            active.sale_rates.virtual_order_deltas,
            rates(0, 0, 0, &[(200, 0, 9), (300, -4, -9)]).virtual_order_deltas
        );

        // Cancelling both empties the schedule
        let cancelled = pool
            .process_log(&active, &order_updated_log(TWAMM, TOKEN1, TOKEN0, 0, 200, 300, -9), &header)
            .and_then(|s| {
                pool.process_log(&s, &order_updated_log(TWAMM, TOKEN0, TOKEN1, 0, 50, 300, -4), &header)
            })
            .unwrap();
        assert_eq!(cancelled, start);
    }

    #[test]
    #[should_panic(expected = "routed to the wrong pool")]
    fn test_order_of_another_pool_is_rejected() {
        let pool = pool();
        let start = state(SaleRateState::default());
        // Another fee tier is another pool
        let log = order_updated_log(TWAMM, TOKEN0, TOKEN1, 1, 50, 300, 4);
        pool.process_log(&start, &log, &BlockHeader::new(2, 100));
    }

    #[test]
    fn test_logs_of_other_emitters_are_ignored() {
        let pool = pool();
        let start = state(rates(5, 0, 10, &[]));
        let stranger = Address::repeat_byte(0x77);
        let id = pool.key().id();

        let executed = virtual_orders_executed_log(stranger, id, 3, 7);
        assert!(pool.process_log(&start, &executed, &BlockHeader::new(2, 30)).is_none());
        let swapped = swapped_log(stranger, id, 1, -1, 9, tick_to_sqrt_ratio(3).unwrap(), 3);
        assert!(pool.process_log(&start, &swapped, &BlockHeader::new(2, 30)).is_none());
    }

    #[test]
    fn test_core_logs_update_full_range_part() {
        let pool = pool();
        let start = state(rates(5, 0, 10, &[]));
        let price = tick_to_sqrt_ratio(-20).unwrap();
        let log = swapped_log(CORE, pool.key().id(), 1, -1, 4_242, price, -20);

        let next = pool.process_log(&start, &log, &BlockHeader::new(2, 30)).unwrap();
        assert_eq!(next.full_range, FullRangePoolState::new(price, 4_242));
        assert_eq!(next.sale_rates, start.sale_rates);
    }

    #[test]
    fn test_generate_state_from_both_fetchers() {
        let pool = pool();
        let sqrt_ratio = tick_to_sqrt_ratio(1).unwrap();
        let compact = fixed_to_compact(sqrt_ratio).unwrap();

        let quote_data = vec![QuoteData {
            tick: 1,
            sqrtRatio: compact,
            liquidity: 100_000,
            minTick: 0,
            maxTick: 0,
            ticks: vec![],
        }];
        let pool_state = AbiTwammPoolState {
            sqrtRatio: compact,
            tick: 1,
            liquidity: 100_000,
            lastVirtualOrderExecutionTime: 60,
            saleRateToken0: U112::from(11u64),
            saleRateToken1: U112::from(0u64),
            saleRateDeltas: vec![AbiSaleRateDelta {
                time: 120,
                saleRateDelta0: I112::try_from(-11i128).unwrap(),
                saleRateDelta1: I112::ZERO,
            }],
        };

        assert_eq!(pool.generate_state_calls().len(), 2);
        let outputs = vec![
            Bytes::from(quote_data.abi_encode()),
            Bytes::from(pool_state.abi_encode()),
        ];
        let generated = pool.generate_state(&outputs, 1).unwrap();
        assert_eq!(generated, state(rates(11, 0, 60, &[(120, -11, 0)])));
    }
}
