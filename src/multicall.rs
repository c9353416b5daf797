use std::time::Duration;

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes},
    providers::{DynProvider, MULTICALL3_ADDRESS},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;

use crate::abis::multicall::IMulticall3;

/// One read-only call of a regeneration batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: Address,
    pub call_data: Bytes,
}

impl Call {
    pub fn new(target: Address, call_data: impl Into<Bytes>) -> Self {
        Self {
            target,
            call_data: call_data.into(),
        }
    }
}

/// Executes a batch of calls in one round trip, pinned to a block.
///
/// Outputs come back in call order, one per call.
#[async_trait]
pub trait MulticallExecutor: Send + Sync {
    async fn aggregate(&self, calls: &[Call], block: u64) -> Result<Vec<Bytes>>;
}

/// Maximum retries for multicall
const MAX_RETRIES: u32 = 3;

/// Delay between retries (exponential backoff base)
const RETRY_DELAY_MS: u64 = 100;

/// Multicall3 `aggregate` over an alloy provider.
#[derive(Clone)]
pub struct AlloyMulticall {
    provider: DynProvider,
    address: Address,
    call_timeout: Duration,
    max_retries: u32,
}

impl AlloyMulticall {
    pub fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            address: MULTICALL3_ADDRESS,
            call_timeout: Duration::from_secs(30),
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn aggregate_once(&self, calls: &[Call], block: u64) -> Result<Vec<Bytes>> {
        let multicall = IMulticall3::new(self.address, &self.provider);
        let calls: Vec<IMulticall3::Call> = calls
            .iter()
            .map(|call| IMulticall3::Call {
                target: call.target,
                callData: call.call_data.clone(),
            })
            .collect();

        let result = tokio::time::timeout(
            self.call_timeout,
            multicall
                .aggregate(calls)
                .block(BlockId::number(block))
                .call(),
        )
        .await
        .context("Multicall timeout")?
        .context("Multicall aggregate failed")?;

        Ok(result.returnData)
    }
}

#[async_trait]
impl MulticallExecutor for AlloyMulticall {
    async fn aggregate(&self, calls: &[Call], block: u64) -> Result<Vec<Bytes>> {
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            match self.aggregate_once(calls, block).await {
                Ok(outputs) => return Ok(outputs),
                Err(e) => {
                    warn!(
                        "Multicall of {} calls at block {} failed (attempt {}/{}): {:#}",
                        calls.len(),
                        block,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.max_retries {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * 2_u64.pow(attempt));
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("multicall was not attempted")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use rustc_hash::FxHashMap;

    use super::*;

    /// Answers calls from a fixed table keyed by (target, calldata).
    #[derive(Default)]
    pub struct StaticMulticall {
        responses: Mutex<FxHashMap<(Address, Bytes), Bytes>>,
        invocations: AtomicUsize,
    }

    impl StaticMulticall {
        pub fn respond(&self, call: &Call, output: impl Into<Bytes>) {
            self.responses
                .lock()
                .unwrap()
                .insert((call.target, call.call_data.clone()), output.into());
        }

        pub fn invocations(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MulticallExecutor for StaticMulticall {
        async fn aggregate(&self, calls: &[Call], _block: u64) -> Result<Vec<Bytes>> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            calls
                .iter()
                .map(|call| {
                    responses
                        .get(&(call.target, call.call_data.clone()))
                        .cloned()
                        .with_context(|| format!("no response for call to {}", call.target))
                })
                .collect()
        }
    }
}
