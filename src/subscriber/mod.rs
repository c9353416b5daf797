//! Event-sourced pool state.
//!
//! An [`EventSubscriber`] describes how a state is derived: which addresses it
//! watches, how one log transforms it, and how to rebuild it from a batch of
//! read-only calls. [`StatefulSubscriber`] owns the block-indexed cache around
//! it, and [`ComposedSubscriber`] joins independent sub-states behind lenses.

mod cache;
mod composed;
mod partial;
mod stateful;

use std::fmt::Debug;

use alloy::primitives::{Address, Bytes, Log};

use crate::{error::SubscriberError, multicall::Call};

pub use cache::SubscriberCache;
pub use composed::ComposedSubscriber;
pub use partial::{Focused, PartialEventSubscriber};
pub use stateful::StatefulSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
}

impl BlockHeader {
    pub fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }
}

pub trait EventSubscriber: Send + Sync {
    /// Snapshots are plain data so that log-derived and regenerated states
    /// can be compared for equality.
    type State: Clone + PartialEq + Debug + Send + Sync + 'static;

    fn addresses_subscribed(&self) -> Vec<Address>;

    /// Derives the next state from one log. `None` means the log does not
    /// concern this state.
    fn process_log(
        &self,
        state: &Self::State,
        log: &Log,
        header: &BlockHeader,
    ) -> Option<Self::State>;

    /// Read-only calls whose outputs rebuild the state.
    fn generate_state_calls(&self) -> Vec<Call>;

    /// Rebuilds the state from the outputs of [`generate_state_calls`](Self::generate_state_calls).
    fn generate_state(&self, outputs: &[Bytes], block: u64)
        -> Result<Self::State, SubscriberError>;
}

/// Fails with [`SubscriberError::OutputCountMismatch`] unless exactly `expected` outputs came back.
pub(crate) fn expect_outputs(outputs: &[Bytes], expected: usize) -> Result<(), SubscriberError> {
    if outputs.len() != expected {
        return Err(SubscriberError::OutputCountMismatch {
            expected,
            actual: outputs.len(),
        });
    }
    Ok(())
}
