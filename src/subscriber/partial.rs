use alloy::primitives::{Address, Bytes, Log};

use super::{BlockHeader, EventSubscriber};
use crate::{error::SubscriberError, lens::Lens, multicall::Call};

/// A subscriber that owns one part of an aggregate state `W`.
///
/// Object safe, so a [`ComposedSubscriber`](super::ComposedSubscriber) can hold
/// children of different concrete types.
pub trait PartialEventSubscriber<W>: Send + Sync {
    fn addresses_subscribed(&self) -> Vec<Address>;

    /// Next aggregate state, reading and writing only this child's part.
    fn process_log(&self, whole: &W, log: &Log, header: &BlockHeader) -> Option<W>;

    fn generate_state_calls(&self) -> Vec<Call>;

    fn call_count(&self) -> usize {
        self.generate_state_calls().len()
    }

    /// Writes the part rebuilt from this child's slice of outputs into `whole`.
    fn generate_state(&self, whole: W, outputs: &[Bytes], block: u64)
        -> Result<W, SubscriberError>;
}

/// Runs an [`EventSubscriber`] on the part of `W` selected by a lens.
#[derive(Debug, Clone)]
pub struct Focused<L, E> {
    lens: L,
    inner: E,
}

impl<L, E> Focused<L, E> {
    pub fn new(lens: L, inner: E) -> Self {
        Self { lens, inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<W, L, E> PartialEventSubscriber<W> for Focused<L, E>
where
    W: Clone + Send + Sync,
    E: EventSubscriber,
    L: Lens<W, Part = E::State>,
{
    fn addresses_subscribed(&self) -> Vec<Address> {
        self.inner.addresses_subscribed()
    }

    fn process_log(&self, whole: &W, log: &Log, header: &BlockHeader) -> Option<W> {
        let part = self.inner.process_log(self.lens.get(whole), log, header)?;
        Some(self.lens.set(whole.clone(), part))
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        self.inner.generate_state_calls()
    }

    fn generate_state(
        &self,
        whole: W,
        outputs: &[Bytes],
        block: u64,
    ) -> Result<W, SubscriberError> {
        let part = self.inner.generate_state(outputs, block)?;
        Ok(self.lens.set(whole, part))
    }
}
