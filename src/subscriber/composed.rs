use std::fmt::Debug;

use alloy::primitives::{Address, Bytes, Log};
use log::debug;
use rustc_hash::FxHashMap;

use super::{BlockHeader, EventSubscriber, PartialEventSubscriber};
use crate::{error::SubscriberError, multicall::Call};

/// One [`EventSubscriber`] over an aggregate state built from independent parts.
///
/// Logs are routed by emitter address. When several children watch the same
/// address they run in declaration order, each seeing the state already
/// updated by the ones before it. Regeneration issues every child's calls in a
/// single batch and hands each child its own slice of the outputs.
pub struct ComposedSubscriber<W> {
    children: Vec<Box<dyn PartialEventSubscriber<W>>>,
    routes: FxHashMap<Address, Vec<usize>>,
}

impl<W> ComposedSubscriber<W> {
    pub fn new(children: Vec<Box<dyn PartialEventSubscriber<W>>>) -> Self {
        let mut routes: FxHashMap<Address, Vec<usize>> = FxHashMap::default();
        for (index, child) in children.iter().enumerate() {
            for address in child.addresses_subscribed() {
                let entry = routes.entry(address).or_default();
                if !entry.contains(&index) {
                    entry.push(index);
                }
            }
        }
        Self { children, routes }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<W> EventSubscriber for ComposedSubscriber<W>
where
    W: Clone + PartialEq + Debug + Default + Send + Sync + 'static,
{
    type State = W;

    fn addresses_subscribed(&self) -> Vec<Address> {
        let mut addresses = Vec::with_capacity(self.routes.len());
        for child in &self.children {
            for address in child.addresses_subscribed() {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
        addresses
    }

    fn process_log(&self, state: &W, log: &Log, header: &BlockHeader) -> Option<W> {
        let Some(indices) = self.routes.get(&log.address) else {
            debug!(
                "No child subscribed to {} (block {})",
                log.address, header.number
            );
            return None;
        };

        let mut next: Option<W> = None;
        for &index in indices {
            let base = next.as_ref().unwrap_or(state);
            if let Some(updated) = self.children[index].process_log(base, log, header) {
                next = Some(updated);
            }
        }
        next
    }

    fn generate_state_calls(&self) -> Vec<Call> {
        self.children
            .iter()
            .flat_map(|child| child.generate_state_calls())
            .collect()
    }

    fn generate_state(&self, outputs: &[Bytes], block: u64) -> Result<W, SubscriberError> {
        let expected: usize = self.children.iter().map(|child| child.call_count()).sum();
        super::expect_outputs(outputs, expected)?;

        let mut whole = W::default();
        let mut offset = 0;
        for child in &self.children {
            let end = offset + child.call_count();
            whole = child.generate_state(whole, &outputs[offset..end], block)?;
            offset = end;
        }
        Ok(whole)
    }
}
