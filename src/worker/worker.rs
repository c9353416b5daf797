use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::{
    eips::BlockNumberOrTag,
    primitives::B256,
    providers::{DynProvider, Provider},
    rpc::types::{Filter, Log as RpcLog},
};
use anyhow::Context;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{config::SyncSettings, pools::PoolRegistry, subscriber::BlockHeader};

/// Interval for logging progress updates (10 seconds)
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Follows the chain head and feeds every block's Ekubo logs to the registry.
///
/// - Cold starts regenerate every pool at the current head
/// - Logs are fetched for all subscribed addresses in bounded block ranges
/// - Hashes of recent blocks are kept to detect reorgs. Pools are rolled back
///   to the fork point and the replaced blocks are applied again
pub struct SyncWorker {
    provider: DynProvider,
    registry: Arc<PoolRegistry>,
    poll_interval: Duration,
    max_block_range: u64,
    /// Checkpoints as `(number, hash)` pairs, oldest first. One is taken at
    /// the cold start block and at the end of every synced range.
    recent_blocks: VecDeque<(u64, B256)>,
    /// Number of checkpoints kept. A reorg that replaces every kept
    /// checkpoint forces a cold restart.
    max_recent_blocks: usize,
}

impl SyncWorker {
    pub fn new(
        provider: DynProvider,
        registry: Arc<PoolRegistry>,
        settings: &SyncSettings,
        retention_blocks: u64,
    ) -> Self {
        Self {
            provider,
            registry,
            poll_interval: settings.poll_interval(),
            max_block_range: settings.max_block_range.max(1),
            recent_blocks: VecDeque::new(),
            max_recent_blocks: usize::try_from(retention_blocks.max(1)).unwrap_or(usize::MAX),
        }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let mut last_progress_log = Instant::now();
        let mut next_block: Option<u64> = None;

        loop {
            if cancellation_token.is_cancelled() {
                info!("Sync worker received cancellation signal");
                break;
            }

            match self.poll(&mut next_block).await {
                Ok(Some(head)) if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL => {
                    info!("Synced {} pools to block {}", self.registry.len(), head);
                    for pool in self.registry.pools() {
                        if let Some(price) = pool.spot_price(head) {
                            debug!("Pool {} trades at {:.8}", pool.key().id(), price);
                        }
                    }
                    last_progress_log = Instant::now();
                },
                Ok(_) => {},
                Err(e) => warn!("Sync failed: {:#}", e),
            }

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Sync worker received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        Ok(())
    }

    /// Brings the registry up to the current head. Returns the head.
    async fn poll(&mut self, next_block: &mut Option<u64>) -> anyhow::Result<Option<u64>> {
        let head = self
            .provider
            .get_block_number()
            .await
            .context("Failed to fetch head block number")?;

        let Some(from) = *next_block else {
            info!("Cold start at block {}", head);
            self.remember_block(head).await?;
            self.registry.regenerate(head).await;
            *next_block = Some(head + 1);
            return Ok(Some(head));
        };

        match self.check_canonical().await? {
            ChainCheck::Canonical => {},
            ChainCheck::ForkedAfter(fork) => {
                warn!("Chain reorganized after block {}, replaying", fork);
                self.registry.rollback(fork + 1);
                *next_block = Some(fork + 1);
            },
            ChainCheck::Lost => {
                warn!("Reorg deeper than the remembered blocks, regenerating from scratch");
                self.registry.rollback(0);
                *next_block = None;
                return Ok(None);
            },
        }
        let from = next_block.unwrap_or(from);

        for (range_start, range_end) in block_ranges(from, head, self.max_block_range) {
            self.sync_range(range_start, range_end).await?;
            *next_block = Some(range_end + 1);
        }

        Ok(Some(head))
    }

    async fn sync_range(&mut self, from: u64, to: u64) -> anyhow::Result<()> {
        let filter = Filter::new()
            .address(self.registry.addresses_subscribed())
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .with_context(|| format!("Failed to fetch logs for blocks {}..={}", from, to))?;
        debug!("Fetched {} logs for blocks {}..={}", logs.len(), from, to);

        for (number, block_logs) in group_logs_by_block(logs) {
            let timestamp = match block_logs.first().and_then(|log| log.block_timestamp) {
                Some(timestamp) => timestamp,
                None => self.block_header(number).await?.1,
            };
            let inner: Vec<_> = block_logs.into_iter().map(|log| log.inner).collect();
            let outcome = self
                .registry
                .apply_block(&inner, &BlockHeader::new(number, timestamp));
            if !outcome.changed.is_empty() {
                debug!("Block {} changed {} pools", number, outcome.changed.len());
            }
        }

        self.registry.advance_to(to);
        self.remember_block(to).await?;
        self.registry.regenerate(to).await;
        Ok(())
    }

    async fn block_header(&self, number: u64) -> anyhow::Result<(B256, u64)> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .with_context(|| format!("Failed to fetch block {}", number))?
            .with_context(|| format!("Block {} not found", number))?;
        Ok((block.header.hash, block.header.timestamp))
    }

    async fn remember_block(&mut self, number: u64) -> anyhow::Result<()> {
        let (hash, _) = self.block_header(number).await?;
        self.recent_blocks.retain(|(n, _)| *n < number);
        self.recent_blocks.push_back((number, hash));
        while self.recent_blocks.len() > self.max_recent_blocks {
            self.recent_blocks.pop_front();
        }
        Ok(())
    }

    /// Compares checkpoints against the canonical chain. Only the newest one
    /// is fetched unless it was replaced.
    async fn check_canonical(&mut self) -> anyhow::Result<ChainCheck> {
        let Some(&(newest, hash)) = self.recent_blocks.back() else {
            return Ok(ChainCheck::Canonical);
        };
        if self.block_header(newest).await?.0 == hash {
            return Ok(ChainCheck::Canonical);
        }

        let mut canonical = Vec::with_capacity(self.recent_blocks.len());
        for &(number, _) in &self.recent_blocks {
            canonical.push(self.block_header(number).await?.0);
        }
        Ok(rewind_checkpoints(&mut self.recent_blocks, &canonical))
    }
}

/// Drops checkpoints whose hash differs from `canonical`, newest first, until
/// one matches. `canonical` holds the current hash of each checkpoint in the
/// same order.
fn rewind_checkpoints(checkpoints: &mut VecDeque<(u64, B256)>, canonical: &[B256]) -> ChainCheck {
    let mut forked = false;
    while let Some(&(number, hash)) = checkpoints.back() {
        if canonical.get(checkpoints.len() - 1) == Some(&hash) {
            return if forked {
                ChainCheck::ForkedAfter(number)
            } else {
                ChainCheck::Canonical
            };
        }
        forked = true;
        checkpoints.pop_back();
    }

    if forked {
        ChainCheck::Lost
    } else {
        ChainCheck::Canonical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainCheck {
    Canonical,
    /// Blocks after this one were replaced.
    ForkedAfter(u64),
    /// No remembered block is canonical anymore.
    Lost,
}

/// Splits `from..=to` into inclusive ranges of at most `max_len` blocks.
fn block_ranges(from: u64, to: u64, max_len: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(max_len - 1).min(to);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// Groups logs by block number in ascending order, keeping their order within
/// a block. Removed and pending logs are dropped.
fn group_logs_by_block(logs: Vec<RpcLog>) -> BTreeMap<u64, Vec<RpcLog>> {
    let mut blocks: BTreeMap<u64, Vec<RpcLog>> = BTreeMap::new();
    for log in logs {
        if log.removed {
            continue;
        }
        let Some(number) = log.block_number else {
            continue;
        };
        blocks.entry(number).or_default().push(log);
    }
    for logs in blocks.values_mut() {
        logs.sort_by_key(|log| log.log_index);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, Log, LogData};

    use super::*;

    fn log(block: u64, index: u64, removed: bool) -> RpcLog {
        RpcLog {
            inner: Log {
                address: Address::ZERO,
                data: LogData::new_unchecked(vec![], Default::default()),
            },
            block_number: Some(block),
            log_index: Some(index),
            removed,
            ..Default::default()
        }
    }

    fn checkpoints(blocks: &[(u64, u8)]) -> VecDeque<(u64, B256)> {
        blocks
            .iter()
            .map(|&(number, byte)| (number, B256::repeat_byte(byte)))
            .collect()
    }

    #[test]
    fn test_unchanged_chain_is_canonical() {
        let mut kept = checkpoints(&[(10, 1), (20, 2), (30, 3)]);
        let canonical = [B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)];

        assert_eq!(rewind_checkpoints(&mut kept, &canonical), ChainCheck::Canonical);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_changed_hash_rewinds_to_last_match() {
        let mut kept = checkpoints(&[(10, 1), (20, 2), (30, 3)]);
        let canonical = [B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(0xee)];

        assert_eq!(rewind_checkpoints(&mut kept, &canonical), ChainCheck::ForkedAfter(20));
        assert_eq!(kept, checkpoints(&[(10, 1), (20, 2)]));

        let mut kept = checkpoints(&[(10, 1), (20, 2), (30, 3)]);
        let canonical = [B256::repeat_byte(1), B256::repeat_byte(0xdd), B256::repeat_byte(0xee)];

        assert_eq!(rewind_checkpoints(&mut kept, &canonical), ChainCheck::ForkedAfter(10));
        assert_eq!(kept, checkpoints(&[(10, 1)]));
    }

    #[test]
    fn test_reorg_deeper_than_checkpoints_is_lost() {
        let mut kept = checkpoints(&[(10, 1), (20, 2)]);
        let canonical = [B256::repeat_byte(0xcc), B256::repeat_byte(0xdd)];

        assert_eq!(rewind_checkpoints(&mut kept, &canonical), ChainCheck::Lost);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_no_checkpoints_is_canonical() {
        let mut kept = VecDeque::new();
        assert_eq!(rewind_checkpoints(&mut kept, &[]), ChainCheck::Canonical);
    }

    #[test]
    fn test_block_ranges() {
        assert_eq!(block_ranges(10, 9, 5), vec![]);
        assert_eq!(block_ranges(10, 10, 5), vec![(10, 10)]);
        assert_eq!(block_ranges(10, 21, 5), vec![(10, 14), (15, 19), (20, 21)]);
        assert_eq!(block_ranges(0, 2, 1), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_group_logs_by_block() {
        let logs = vec![
            log(7, 3, false),
            log(5, 0, false),
            log(7, 1, false),
            log(6, 0, true),
        ];
        let grouped = group_logs_by_block(logs);

        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![5, 7]);
        let indices: Vec<_> = grouped[&7].iter().map(|log| log.log_index).collect();
        assert_eq!(indices, vec![Some(1), Some(3)]);
    }
}
