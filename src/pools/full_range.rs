use alloy::{
    primitives::{Address, Bytes, Log, U256},
    sol_types::SolCall,
};
use log::warn;

use super::{
    is_token1, resolve_sqrt_ratio_limit, to_signed, Deployment, PoolKey, Quote, QuoteRequest,
    FULL_RANGE_GAS_COST,
};
use crate::{
    abis::IQuoteDataFetcher,
    error::{PricingError, QuoteError, SubscriberError},
    events::{parse_core_log, EkuboEvent},
    math::{compact_to_fixed, compute_step},
    multicall::Call,
    subscriber::{expect_outputs, BlockHeader, EventSubscriber},
};

/// Liquidity spanning the whole price range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullRangePoolState {
    pub sqrt_ratio: U256,
    pub liquidity: u128,
}

/// Result of a swap before it is turned into a [`Quote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SwapOutcome {
    pub consumed_amount: i128,
    pub calculated_amount: u128,
}

impl FullRangePoolState {
    pub fn new(sqrt_ratio: U256, liquidity: u128) -> Self {
        Self {
            sqrt_ratio,
            liquidity,
        }
    }

    /// One constant-liquidity step towards the limit. Returns the state after the swap.
    pub(crate) fn swap(
        &self,
        fee: u64,
        amount: i128,
        is_token1: bool,
        sqrt_ratio_limit: Option<U256>,
    ) -> Result<(SwapOutcome, Self), PricingError> {
        if amount == 0 {
            return Ok((
                SwapOutcome {
                    consumed_amount: 0,
                    calculated_amount: 0,
                },
                *self,
            ));
        }

        let limit = resolve_sqrt_ratio_limit(sqrt_ratio_limit, self.sqrt_ratio, amount, is_token1)?;
        let step = compute_step(self.sqrt_ratio, self.liquidity, limit, amount, is_token1, fee)?;

        Ok((
            SwapOutcome {
                consumed_amount: step.consumed_amount,
                calculated_amount: step.calculated_amount,
            },
            Self {
                sqrt_ratio: step.sqrt_ratio_next,
                liquidity: self.liquidity,
            },
        ))
    }
}

#[derive(Debug, Clone)]
pub struct FullRangePool {
    key: PoolKey,
    core: Address,
    quote_data_fetcher: Address,
}

impl FullRangePool {
    pub fn new(key: PoolKey, deployment: &Deployment) -> Self {
        Self {
            key,
            core: deployment.core,
            quote_data_fetcher: deployment.quote_data_fetcher,
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn quote(&self, state: &FullRangePoolState, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let is_token1 = is_token1(&self.key, request.token)?;
        let (outcome, _) = state.swap(
            self.key.config.fee,
            request.amount,
            is_token1,
            request.sqrt_ratio_limit,
        )?;

        Ok(Quote {
            consumed_amount: outcome.consumed_amount,
            calculated_amount: to_signed(outcome.calculated_amount)?,
            gas_consumed: if request.amount == 0 { 0 } else { FULL_RANGE_GAS_COST },
            skip_ahead: 0,
        })
    }
}

impl EventSubscriber for FullRangePool {
    type State = FullRangePoolState;

    fn addresses_subscribed(&self) -> Vec<Address> {
        vec![self.core]
    }

    fn process_log(
        &self,
        state: &FullRangePoolState,
        log: &Log,
        _header: &BlockHeader,
    ) -> Option<FullRangePoolState> {
        let pool_id = self.key.id();
        match parse_core_log(log, self.core)? {
            EkuboEvent::Swapped(event) => {
                assert_eq!(event.pool_id, pool_id, "Swapped routed to the wrong pool");
                Some(FullRangePoolState::new(
                    event.sqrt_ratio_after,
                    event.liquidity_after,
                ))
            },
            EkuboEvent::PositionUpdated(event) => {
                assert_eq!(event.poolId, pool_id, "PositionUpdated routed to the wrong pool");
                let delta = event.params.liquidityDelta;
                if delta == 0 {
                    return None;
                }
                match state.liquidity.checked_add_signed(delta) {
                    Some(liquidity) => Some(FullRangePoolState::new(state.sqrt_ratio, liquidity)),
                    None => {
                        warn!(
                            "Liquidity delta {} overflows liquidity {} of pool {}",
                            delta, state.liquidity, pool_id
                        );
                        None
                    },
                }
            },
            _ => None,
        }
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        let call = IQuoteDataFetcher::getQuoteDataCall {
            poolKeys: vec![self.key.to_abi()],
            minTickSpacings: 0,
        };
        vec![Call::new(self.quote_data_fetcher, call.abi_encode())]
    }

    fn generate_state(
        &self,
        outputs: &[Bytes],
        _block: u64,
    ) -> Result<FullRangePoolState, SubscriberError> {
        expect_outputs(outputs, 1)?;
        let data = IQuoteDataFetcher::getQuoteDataCall::abi_decode_returns(&outputs[0])?;
        let data = data
            .first()
            .ok_or_else(|| SubscriberError::InvalidState("empty quote data".to_string()))?;

        Ok(FullRangePoolState::new(
            compact_to_fixed(data.sqrtRatio),
            data.liquidity,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy::{primitives::address, sol_types::SolValue};

    use super::*;
    use crate::{
        abis::QuoteData,
        events::testing::{position_updated_log, swapped_log},
        math::{fixed_to_compact, tick_to_sqrt_ratio},
        pools::{Extensions, PoolConfig},
    };

    pub const TOKEN0: Address = address!("0000000000000000000000000000000000000001");
    pub const TOKEN1: Address = address!("0000000000000000000000000000000000000002");
    pub const CORE: Address = address!("e0e0e08a6a4b9dc7bd67bcb7aade5cf48157d444");
    pub const FETCHER: Address = address!("91cb8a896cafaab15a1ad2d1a2b1d2c14de87a2d");
    pub const TWAMM_FETCHER: Address = address!("c07e5b80750247c8b5d7234a9c79dfc58785392b");
    pub const ORACLE: Address = address!("51d02a5948496a67827242eabc5725531342527c");
    pub const TWAMM: Address = address!("d4279c050da1f5c5b2830558c7a08e57e12b54ec");

    pub fn deployment() -> Deployment {
        Deployment {
            core: CORE,
            quote_data_fetcher: FETCHER,
            twamm_data_fetcher: TWAMM_FETCHER,
            extensions: Extensions {
                oracle: ORACLE,
                twamm: TWAMM,
            },
            min_tick_spacings: 2,
        }
    }

    fn pool(fee: u64) -> FullRangePool {
        FullRangePool::new(
            PoolKey::new(TOKEN0, TOKEN1, PoolConfig::new(Address::ZERO, fee, 0)),
            &deployment(),
        )
    }

    fn state() -> FullRangePoolState {
        FullRangePoolState::new(tick_to_sqrt_ratio(1).unwrap(), 100_000)
    }

    #[test]
    fn test_quote_token1_input() {
        let quote = pool(0).quote(&state(), &QuoteRequest::new(1000, TOKEN1)).unwrap();
        assert_eq!(quote.consumed_amount, 1000);
        assert_eq!(quote.calculated_amount, 990);
        assert_eq!(quote.gas_consumed, FULL_RANGE_GAS_COST);
        assert_eq!(quote.skip_ahead, 0);
    }

    #[test]
    fn test_quote_with_fee() {
        let quote = pool(0).quote(&state(), &QuoteRequest::new(0, TOKEN1)).unwrap();
        assert_eq!(quote, Quote::default());

        let one_percent = ((1u128 << 64) / 100) as u64;
        let quote = pool(one_percent)
            .quote(&state(), &QuoteRequest::new(1000, TOKEN1))
            .unwrap();
        assert_eq!(quote.calculated_amount, 980);
    }

    #[test]
    fn test_quote_invalid_token() {
        let stranger = address!("0000000000000000000000000000000000000003");
        assert_eq!(
            pool(0).quote(&state(), &QuoteRequest::new(1000, stranger)),
            Err(QuoteError::InvalidToken(stranger))
        );
    }

    #[test]
    #[should_panic(expected = "routed to the wrong pool")]
    fn test_swapped_of_another_pool_is_rejected() {
        let other = PoolKey::new(TOKEN0, TOKEN1, PoolConfig::new(Address::ZERO, 7, 0)).id();
        let log = swapped_log(CORE, other, 0, 0, 1, tick_to_sqrt_ratio(0).unwrap(), 0);
        pool(0).process_log(&state(), &log, &BlockHeader::new(2, 24));
    }

    #[test]
    fn test_swapped_from_another_emitter_is_ignored() {
        let stranger = address!("00000000000000000000000000000000000000ff");
        let pool = pool(0);
        let log = swapped_log(stranger, pool.key().id(), 0, 0, 1, tick_to_sqrt_ratio(0).unwrap(), 0);
        assert!(pool.process_log(&state(), &log, &BlockHeader::new(2, 24)).is_none());
    }

    #[test]
    fn test_swapped_replaces_price_and_liquidity() {
        let pool = pool(0);
        let next = tick_to_sqrt_ratio(50).unwrap();
        let log = swapped_log(CORE, pool.key().id(), 10, -9, 7_777, next, 50);

        let updated = pool
            .process_log(&state(), &log, &BlockHeader::new(1, 0))
            .unwrap();
        assert_eq!(updated, FullRangePoolState::new(next, 7_777));
    }

    #[test]
    fn test_position_updated_changes_liquidity() {
        let pool = pool(0);
        let header = BlockHeader::new(1, 0);
        let id = pool.key().id();

        let added = pool
            .process_log(&state(), &position_updated_log(CORE, id, -887_272, 887_272, 500), &header)
            .unwrap();
        assert_eq!(added.liquidity, 100_500);

        let removed = pool
            .process_log(&added, &position_updated_log(CORE, id, -887_272, 887_272, -100_500), &header)
            .unwrap();
        assert_eq!(removed.liquidity, 0);

        assert!(pool
            .process_log(&removed, &position_updated_log(CORE, id, -887_272, 887_272, -1), &header)
            .is_none());
        assert!(pool
            .process_log(&state(), &position_updated_log(CORE, id, 0, 1, 0), &header)
            .is_none());
    }

    #[test]
    fn test_generate_state() {
        let pool = pool(0);
        let sqrt_ratio = tick_to_sqrt_ratio(-300).unwrap();
        let data = vec![QuoteData {
            tick: -300,
            sqrtRatio: fixed_to_compact(sqrt_ratio).unwrap(),
            liquidity: 123,
            minTick: 0,
            maxTick: 0,
            ticks: vec![],
        }];
        let outputs = vec![Bytes::from(data.abi_encode())];

        let state = pool.generate_state(&outputs, 1).unwrap();
        assert_eq!(state, FullRangePoolState::new(sqrt_ratio, 123));

        assert!(pool.generate_state(&[], 1).is_err());
    }
}
