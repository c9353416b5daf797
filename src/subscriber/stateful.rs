use std::sync::Arc;

use alloy::primitives::{Address, Log};
use log::{debug, warn};

use super::{BlockHeader, EventSubscriber, SubscriberCache};
use crate::{error::SubscriberError, multicall::MulticallExecutor};

/// An [`EventSubscriber`] together with its block-indexed cache.
///
/// Log application is expected from a single pipeline. Reads go through
/// published snapshots and never block.
pub struct StatefulSubscriber<E: EventSubscriber> {
    inner: E,
    cache: SubscriberCache<E::State>,
    executor: Arc<dyn MulticallExecutor>,
}

impl<E: EventSubscriber> StatefulSubscriber<E> {
    pub fn new(inner: E, executor: Arc<dyn MulticallExecutor>, retention_blocks: u64) -> Self {
        Self {
            inner,
            cache: SubscriberCache::new(retention_blocks),
            executor,
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn addresses_subscribed(&self) -> Vec<Address> {
        self.inner.addresses_subscribed()
    }

    pub fn get_state(&self, block: u64) -> Option<Arc<E::State>> {
        self.cache.get(block)
    }

    pub fn latest_state(&self) -> Option<(u64, Arc<E::State>)> {
        self.cache.latest()
    }

    pub fn set_state(&self, state: E::State, block: u64) {
        self.cache.publish(block, Arc::new(state));
    }

    pub fn last_block(&self) -> Option<u64> {
        self.cache.last_block()
    }

    /// Folds the block's logs over the latest snapshot.
    ///
    /// Returns whether the state changed. A block at or below the last applied
    /// one drops the affected snapshots and fails with
    /// [`SubscriberError::Reorg`]; the caller regenerates.
    pub fn apply_block(&self, logs: &[Log], header: &BlockHeader) -> Result<bool, SubscriberError> {
        let Some(last_applied) = self.cache.last_block() else {
            debug!("Skipping block {} for uninitialized subscriber", header.number);
            return Ok(false);
        };

        if header.number <= last_applied {
            warn!(
                "Reorg detected at block {} (last applied {}), truncating cache",
                header.number, last_applied
            );
            self.cache.truncate_from(header.number);
            return Err(SubscriberError::Reorg {
                block: header.number,
                last_applied,
            });
        }

        let Some((_, current)) = self.cache.latest() else {
            return Ok(false);
        };

        let mut next: Option<E::State> = None;
        for log in logs {
            let base = next.as_ref().unwrap_or(current.as_ref());
            if let Some(updated) = self.inner.process_log(base, log, header) {
                next = Some(updated);
            }
        }

        match next {
            Some(state) if state != *current => {
                self.cache.publish(header.number, Arc::new(state));
                Ok(true)
            },
            _ => {
                self.cache.advance(header.number);
                Ok(false)
            },
        }
    }

    /// Records that blocks up to `block` carried no logs for this subscriber.
    pub fn advance_to(&self, block: u64) {
        self.cache.advance(block);
    }

    /// Rebuilds the state at `block` with one multicall. Leaves the cache untouched.
    pub async fn generate_state(&self, block: u64) -> Result<E::State, SubscriberError> {
        let calls = self.inner.generate_state_calls();
        let outputs = self
            .executor
            .aggregate(&calls, block)
            .await
            .map_err(SubscriberError::Multicall)?;
        self.inner.generate_state(&outputs, block)
    }

    /// Cached state at `block`, or a regenerated one.
    ///
    /// A regenerated state is published only if the cache has not moved past
    /// `block` in the meantime; otherwise it is returned without being stored.
    pub async fn get_or_generate_state(
        &self,
        block: u64,
    ) -> Result<Arc<E::State>, SubscriberError> {
        if let Some(state) = self.cache.get(block) {
            return Ok(state);
        }

        let state = Arc::new(self.generate_state(block).await?);
        if !self.cache.publish_if_newer(block, state.clone()) {
            debug!(
                "Discarding regenerated state for block {}, cache is at {:?}",
                block,
                self.cache.last_block()
            );
        }
        Ok(state)
    }

    /// Drops snapshots from `from_block` on, so that the next
    /// [`get_or_generate_state`](Self::get_or_generate_state) rebuilds.
    pub fn restart(&self, from_block: u64) {
        self.cache.truncate_from(from_block);
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{address, Bytes, LogData, U256},
        sol_types::SolValue,
    };

    use super::*;
    use crate::multicall::{testing::StaticMulticall, Call};

    const COUNTER: Address = address!("00000000000000000000000000000000000000c0");

    /// Sums the first data word of every log from `COUNTER`.
    struct Counter;

    impl EventSubscriber for Counter {
        type State = u64;

        fn addresses_subscribed(&self) -> Vec<Address> {
            vec![COUNTER]
        }

        fn process_log(&self, state: &u64, log: &Log, _header: &BlockHeader) -> Option<u64> {
            if log.address != COUNTER {
                return None;
            }
            let value = U256::abi_decode(&log.data.data).ok()?;
            Some(state + value.to::<u64>())
        }

        fn generate_state_calls(&self) -> Vec<Call> {
            vec![Call::new(COUNTER, Bytes::from_static(&[0x01]))]
        }

        fn generate_state(&self, outputs: &[Bytes], _block: u64) -> Result<u64, SubscriberError> {
            crate::subscriber::expect_outputs(outputs, 1)?;
            Ok(U256::abi_decode(&outputs[0])?.to::<u64>())
        }
    }

    fn increment(by: u64) -> Log {
        Log {
            address: COUNTER,
            data: LogData::new_unchecked(vec![], U256::from(by).abi_encode().into()),
        }
    }

    fn subscriber(value: u64) -> (StatefulSubscriber<Counter>, Arc<StaticMulticall>) {
        let executor = Arc::new(StaticMulticall::default());
        executor.respond(&Counter.generate_state_calls()[0], U256::from(value).abi_encode());
        (
            StatefulSubscriber::new(Counter, executor.clone(), 64),
            executor,
        )
    }

    #[test]
    fn test_apply_block_folds_logs() {
        let (sub, _) = subscriber(0);
        sub.set_state(10, 1);

        let changed = sub
            .apply_block(&[increment(1), increment(2)], &BlockHeader::new(2, 0))
            .unwrap();
        assert!(changed);
        assert_eq!(*sub.get_state(2).unwrap(), 13);
        assert_eq!(*sub.get_state(1).unwrap(), 10);
    }

    #[test]
    fn test_empty_block_advances() {
        let (sub, _) = subscriber(0);
        sub.set_state(10, 1);

        assert!(!sub.apply_block(&[], &BlockHeader::new(5, 0)).unwrap());
        assert_eq!(sub.last_block(), Some(5));
        assert_eq!(*sub.get_state(4).unwrap(), 10);
    }

    #[test]
    fn test_uninitialized_ignores_blocks() {
        let (sub, _) = subscriber(0);
        assert!(!sub.apply_block(&[increment(1)], &BlockHeader::new(3, 0)).unwrap());
        assert!(sub.get_state(3).is_none());
    }

    #[test]
    fn test_reorg_truncates() {
        let (sub, _) = subscriber(0);
        sub.set_state(10, 1);
        sub.apply_block(&[increment(1)], &BlockHeader::new(2, 0)).unwrap();
        sub.apply_block(&[increment(1)], &BlockHeader::new(3, 0)).unwrap();

        let err = sub
            .apply_block(&[increment(5)], &BlockHeader::new(2, 0))
            .unwrap_err();
        assert!(err.is_reorg());
        assert_eq!(sub.last_block(), Some(1));
        assert!(sub.get_state(2).is_none());
        assert_eq!(*sub.get_state(1).unwrap(), 10);
    }

    #[tokio::test]
    async fn test_get_or_generate_state() {
        let (sub, executor) = subscriber(42);

        let state = sub.get_or_generate_state(7).await.unwrap();
        assert_eq!(*state, 42);
        assert_eq!(executor.invocations(), 1);

        // Served from cache.
        sub.get_or_generate_state(7).await.unwrap();
        assert_eq!(executor.invocations(), 1);
    }

    #[tokio::test]
    async fn test_stale_regeneration_is_not_published() {
        let (sub, _) = subscriber(42);
        sub.set_state(1, 10);

        let state = sub.get_or_generate_state(5).await.unwrap();
        assert_eq!(*state, 42);
        assert_eq!(sub.last_block(), Some(10));
        assert_eq!(*sub.get_state(10).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_regeneration_leaves_cache() {
        let executor = Arc::new(StaticMulticall::default());
        let sub = StatefulSubscriber::new(Counter, executor, 64);

        let err = sub.generate_state(3).await.unwrap_err();
        assert!(matches!(err, SubscriberError::Multicall(_)));
        assert!(sub.last_block().is_none());
    }
}
