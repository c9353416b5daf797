use std::time::Duration;

use alloy::primitives::{Address, Log, B256};
use futures::future::join_all;
use log::{debug, info, warn};
use moka::future::Cache;
use rustc_hash::FxHashMap;

use super::{Deployment, EkuboPool, PoolKind, Quote, QuoteRequest};
use crate::{error::QuoteError, events::parse_log, subscriber::BlockHeader};

/// A quote from one pool, as returned by [`PoolRegistry::quote_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedQuote {
    pub pool_id: B256,
    pub kind: PoolKind,
    pub quote: Quote,
}

/// Outcome of applying one block to every pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    /// Pools whose state changed.
    pub changed: Vec<B256>,
    /// Pools that saw this block twice and were rolled back.
    pub reorged: Vec<B256>,
}

/// Every tracked pool, keyed by pool id.
pub struct PoolRegistry {
    pools: FxHashMap<B256, EkuboPool>,
    core: Address,
    twamm: Address,
    /// Pools whose last regeneration failed. Not retried until the entry expires.
    cooldown: Cache<B256, ()>,
}

impl PoolRegistry {
    pub fn new(deployment: &Deployment, regeneration_cooldown: Duration) -> Self {
        let cooldown = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(regeneration_cooldown)
            .build();

        Self {
            pools: FxHashMap::default(),
            core: deployment.core,
            twamm: deployment.extensions.twamm,
            cooldown,
        }
    }

    /// Tracks `pool`. Returns its id; a pool already tracked is replaced.
    pub fn add_pool(&mut self, pool: EkuboPool) -> B256 {
        let id = pool.key().id();
        if self.pools.insert(id, pool).is_some() {
            warn!("Replacing already tracked pool {}", id);
        }
        id
    }

    pub fn get(&self, pool_id: &B256) -> Option<&EkuboPool> {
        self.pools.get(pool_id)
    }

    pub fn pools(&self) -> impl Iterator<Item = &EkuboPool> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn addresses_subscribed(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .pools
            .values()
            .flat_map(|pool| pool.addresses_subscribed())
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
    }

    /// Routes the block's logs to the pools they name and moves every pool to
    /// `header.number`. Logs must be in chain order.
    pub fn apply_block(&self, logs: &[Log], header: &BlockHeader) -> BlockOutcome {
        let mut routed: FxHashMap<B256, Vec<Log>> = FxHashMap::default();
        for log in logs {
            let Some(event) = parse_log(log, self.core, self.twamm) else {
                continue;
            };
            let pool_id = event.pool_id(log.address);
            if self.pools.contains_key(&pool_id) {
                routed.entry(pool_id).or_default().push(log.clone());
            }
        }

        let mut outcome = BlockOutcome::default();
        for (id, pool) in &self.pools {
            let logs = routed.get(id).map(Vec::as_slice).unwrap_or_default();
            let result = match pool.apply_block(logs, header) {
                Err(e) if e.is_reorg() => {
                    outcome.reorged.push(*id);
                    pool.apply_block(logs, header)
                },
                result => result,
            };

            match result {
                Ok(true) => outcome.changed.push(*id),
                Ok(false) => {},
                Err(e) => {
                    warn!(
                        "Failed to apply block {} to pool {}: {}, restarting",
                        header.number, id, e
                    );
                    pool.restart(0);
                },
            }
        }

        if !outcome.reorged.is_empty() {
            warn!(
                "Rolled back {} pools at block {}",
                outcome.reorged.len(),
                header.number
            );
        }
        outcome
    }

    /// Drops every pool's snapshots from `from_block` on. Pools left without
    /// any state are rebuilt by the next [`regenerate`](Self::regenerate).
    pub fn rollback(&self, from_block: u64) {
        for pool in self.pools.values() {
            pool.restart(from_block);
        }
    }

    /// Marks `block` as processed for every pool.
    pub fn advance_to(&self, block: u64) {
        for pool in self.pools.values() {
            pool.advance_to(block);
        }
    }

    /// Rebuilds every pool without state at `block`, skipping pools in cooldown.
    ///
    /// Returns the number of pools regenerated.
    pub async fn regenerate(&self, block: u64) -> usize {
        let pending: Vec<(&B256, &EkuboPool)> = self
            .pools
            .iter()
            .filter(|(id, pool)| pool.last_block().is_none() && !self.cooldown.contains_key(*id))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        debug!("Regenerating {} pools at block {}", pending.len(), block);
        let results = join_all(pending.iter().map(|(_, pool)| pool.ensure_state(block))).await;

        let mut regenerated = 0;
        for ((id, _), result) in pending.into_iter().zip(results) {
            match result {
                Ok(()) => regenerated += 1,
                Err(e) => {
                    warn!("Failed to regenerate pool {} at block {}: {}", id, block, e);
                    self.cooldown.insert(*id, ()).await;
                },
            }
        }

        info!("Regenerated {} pools at block {}", regenerated, block);
        regenerated
    }

    /// Quotes a swap of `token_in` for `token_out` in every pool trading the
    /// pair, best first. A positive `amount` is an exact input of `token_in`,
    /// a negative one an exact output of `token_out`.
    ///
    /// Pools that are not ready or cannot price the amount are left out.
    pub fn quote_all(
        &self,
        amount: i128,
        token_in: Address,
        token_out: Address,
        block: u64,
    ) -> Result<Vec<RankedQuote>, QuoteError> {
        let specified = if amount >= 0 { token_in } else { token_out };
        let request = QuoteRequest::new(amount, specified);

        let mut quotes = Vec::new();
        for (id, pool) in &self.pools {
            let key = pool.key();
            if !key.has_token(token_in) || !key.has_token(token_out) {
                continue;
            }

            match pool.quote(&request, block) {
                Ok(quote) => quotes.push(RankedQuote {
                    pool_id: *id,
                    kind: pool.kind(),
                    quote,
                }),
                Err(e) if e.is_skippable() => {
                    debug!("Skipping pool {}: {}", id, e);
                },
                Err(e) => return Err(e),
            }
        }

        // Exact input maximizes the output, exact output minimizes the input.
        if amount >= 0 {
            quotes.sort_by(|a, b| b.quote.calculated_amount.cmp(&a.quote.calculated_amount));
        } else {
            quotes.sort_by(|a, b| a.quote.calculated_amount.cmp(&b.quote.calculated_amount));
        }
        Ok(quotes)
    }
}
