use alloy::primitives::{Address, Bytes, Log};

use super::{
    Deployment, FullRangePool, FullRangePoolState, PoolKey, Quote, QuoteRequest,
    ORACLE_GAS_SURCHARGE,
};
use crate::{
    error::{QuoteError, SubscriberError},
    multicall::Call,
    subscriber::{BlockHeader, EventSubscriber},
};

/// A full range pool whose extension records a price observation on every
/// swap that moves it.
#[derive(Debug, Clone)]
pub struct OraclePool {
    inner: FullRangePool,
}

impl OraclePool {
    pub fn new(key: PoolKey, deployment: &Deployment) -> Self {
        Self {
            inner: FullRangePool::new(key, deployment),
        }
    }

    pub fn key(&self) -> &PoolKey {
        self.inner.key()
    }

    pub fn quote(&self, state: &FullRangePoolState, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let mut quote = self.inner.quote(state, request)?;
        if quote.calculated_amount != 0 {
            quote.gas_consumed += ORACLE_GAS_SURCHARGE;
        }
        Ok(quote)
    }
}

impl EventSubscriber for OraclePool {
    type State = FullRangePoolState;

    fn addresses_subscribed(&self) -> Vec<Address> {
        self.inner.addresses_subscribed()
    }

    fn process_log(
        &self,
        state: &FullRangePoolState,
        log: &Log,
        header: &BlockHeader,
    ) -> Option<FullRangePoolState> {
        self.inner.process_log(state, log, header)
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        self.inner.generate_state_calls()
    }

    fn generate_state(
        &self,
        outputs: &[Bytes],
        block: u64,
    ) -> Result<FullRangePoolState, SubscriberError> {
        self.inner.generate_state(outputs, block)
    }
}
