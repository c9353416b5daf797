//! Error families shared across the crate.
//!
//! - [`PricingError`]: a pool cannot price a given amount (skip the pool)
//! - [`QuoteError`]: outcome of a quote request, classified for the caller
//! - [`SubscriberError`]: state regeneration and log application failures

use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::{
    ledger::LedgerError,
    math::{AmountDeltaError, FeeError, SwapStepError, TickError},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("swap step failed: {0}")]
    Step(#[from] SwapStepError),
    #[error(transparent)]
    AmountDelta(#[from] AmountDeltaError),
    #[error(transparent)]
    Fee(#[from] FeeError),
    #[error(transparent)]
    Tick(#[from] TickError),
    #[error("invalid sqrt ratio limit {0}")]
    InvalidSqrtRatioLimit(U256),
    #[error("liquidity overflow while crossing tick {0}")]
    LiquidityOverflow(i32),
    #[error("calculated amount does not fit a signed 128-bit value")]
    AmountOverflow,
    #[error("quote time {now} is before the last virtual order execution {last_execution}")]
    ExecutionTimeInFuture { now: u64, last_execution: u64 },
    #[error("virtual order segment longer than u32::MAX seconds")]
    ExecutionWindowTooLong,
    #[error("virtual order sale rates could not be applied")]
    SaleRateOverflow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// The token is not one of the pool's tokens. A wiring bug, never retried.
    #[error("token {0} is not traded by this pool")]
    InvalidToken(Address),
    /// No cached or regenerable state at the requested block. Retryable.
    #[error("no state available for block {0}")]
    NotReady(u64),
    /// The pool cannot price this amount. The pool is skipped.
    #[error("pool cannot price this amount: {0}")]
    Unpriceable(#[from] PricingError),
    /// The system clock is set before the unix epoch.
    #[error("system clock reads {0}s, before the unix epoch")]
    ClockBeforeEpoch(i64),
}

impl QuoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }

    /// Errors that drop a pool from the candidate set instead of failing the request.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Unpriceable(_))
    }
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("multicall failed: {0:#}")]
    Multicall(anyhow::Error),
    #[error("failed to decode call output: {0}")]
    Decode(#[from] alloy::sol_types::Error),
    #[error("expected {expected} call outputs, got {actual}")]
    OutputCountMismatch { expected: usize, actual: usize },
    #[error("reorg at block {block}, last applied block was {last_applied}")]
    Reorg { block: u64, last_applied: u64 },
    #[error("inconsistent on-chain state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SubscriberError {
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::Reorg { .. })
    }
}
