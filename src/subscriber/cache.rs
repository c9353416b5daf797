use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwap;

#[derive(Debug)]
struct Snapshots<S> {
    states: BTreeMap<u64, Arc<S>>,
    /// Last block the cache reflects, whether or not it changed the state.
    last_block: Option<u64>,
}

impl<S> Clone for Snapshots<S> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            last_block: self.last_block,
        }
    }
}

impl<S> Default for Snapshots<S> {
    fn default() -> Self {
        Self {
            states: BTreeMap::new(),
            last_block: None,
        }
    }
}

/// Block-indexed snapshots of a state.
///
/// Readers load the current map without locking. Writers build a new map and
/// swap it in; published snapshots are never mutated.
pub struct SubscriberCache<S> {
    inner: ArcSwap<Snapshots<S>>,
    retention_blocks: u64,
}

impl<S> SubscriberCache<S> {
    pub fn new(retention_blocks: u64) -> Self {
        Self {
            inner: ArcSwap::from_pointee(Snapshots::default()),
            retention_blocks,
        }
    }

    pub fn last_block(&self) -> Option<u64> {
        self.inner.load().last_block
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.load().states.len()
    }

    /// State as of the end of `block`: the latest snapshot at or before it.
    ///
    /// `None` if the cache has not reached `block` yet or `block` has been evicted.
    pub fn get(&self, block: u64) -> Option<Arc<S>> {
        let snapshots = self.inner.load();
        if snapshots.last_block? < block {
            return None;
        }
        snapshots
            .states
            .range(..=block)
            .next_back()
            .map(|(_, state)| state.clone())
    }

    pub fn latest(&self) -> Option<(u64, Arc<S>)> {
        self.inner
            .load()
            .states
            .iter()
            .next_back()
            .map(|(block, state)| (*block, state.clone()))
    }

    /// Stores `state` for `block` and moves the cache forward to it.
    pub fn publish(&self, block: u64, state: Arc<S>) {
        self.inner.rcu(|current| {
            let mut next = (**current).clone();
            next.states.insert(block, state.clone());
            next.last_block = Some(next.last_block.map_or(block, |last| last.max(block)));
            self.evict(&mut next);
            next
        });
    }

    /// Like [`publish`](Self::publish), but only if the cache has not already
    /// moved past `block`. Returns whether the state was stored.
    pub fn publish_if_newer(&self, block: u64, state: Arc<S>) -> bool {
        let mut stored = false;
        self.inner.rcu(|current| {
            let mut next = (**current).clone();
            stored = next.last_block.map_or(true, |last| block > last);
            if stored {
                next.states.insert(block, state.clone());
                next.last_block = Some(block);
                self.evict(&mut next);
            }
            next
        });
        stored
    }

    /// Marks blocks up to `block` as processed without a state change.
    /// No-op on an empty cache.
    pub fn advance(&self, block: u64) {
        self.inner.rcu(|current| {
            let mut next = (**current).clone();
            if let Some(last) = next.last_block {
                if block > last {
                    next.last_block = Some(block);
                    self.evict(&mut next);
                }
            }
            next
        });
    }

    /// Drops every snapshot at or after `block`.
    pub fn truncate_from(&self, block: u64) {
        self.inner.rcu(|current| {
            let mut next = (**current).clone();
            let _ = next.states.split_off(&block);
            next.last_block = match next.states.keys().next_back() {
                Some(_) => next.last_block.map(|last| last.min(block.saturating_sub(1))),
                None => None,
            };
            next
        });
    }

    pub fn clear(&self) {
        self.inner.store(Arc::new(Snapshots::default()));
    }

    // Keeps the newest snapshot at or before the horizon so that every block
    // inside the retention window stays answerable.
    fn evict(&self, snapshots: &mut Snapshots<S>) {
        let Some(last) = snapshots.last_block else {
            return;
        };
        let horizon = last.saturating_sub(self.retention_blocks);
        let keep_from = snapshots
            .states
            .range(..=horizon)
            .next_back()
            .map(|(block, _)| *block);
        if let Some(keep_from) = keep_from {
            snapshots.states = snapshots.states.split_off(&keep_from);
        }
    }
}
