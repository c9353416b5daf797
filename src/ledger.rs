//! Sorted, sparse per-tick liquidity deltas of a concentrated liquidity pool.
//!
//! Only ticks inside a checked window `[lower, upper]` are tracked. Liquidity
//! from positions reaching outside the window is rolled up into two sentinel
//! ticks at the window bounds, so the deltas always sum to zero.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tick {
    pub number: i32,
    pub liquidity_delta: i128,
}

impl Tick {
    pub fn new(number: i32, liquidity_delta: i128) -> Self {
        Self {
            number,
            liquidity_delta,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("liquidity delta overflow at tick {0}")]
    DeltaOverflow(i32),
    #[error("liquidity {0} does not fit a signed delta")]
    LiquidityOverflow(u128),
}

/// Index of the greatest tick `<= tick`, or `None` if `tick` is below all of them.
pub fn find_nearest_initialized_tick_index(ticks: &[Tick], tick: i32) -> Option<usize> {
    ticks
        .partition_point(|t| t.number <= tick)
        .checked_sub(1)
}

/// Ticks plus the index of the active one.
///
/// Ticks sit behind an [`Arc`]: snapshots share the vector until a position
/// change writes to it, so swaps never copy the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickLedger {
    ticks: Arc<Vec<Tick>>,
    active_tick_index: Option<usize>,
    checked_bounds: (i32, i32),
}

impl TickLedger {
    pub fn new(ticks: Vec<Tick>, active_tick: i32, checked_bounds: (i32, i32)) -> Self {
        let active_tick_index = find_nearest_initialized_tick_index(&ticks, active_tick);
        Self {
            ticks: Arc::new(ticks),
            active_tick_index,
            checked_bounds,
        }
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn active_tick_index(&self) -> Option<usize> {
        self.active_tick_index
    }

    pub fn checked_bounds(&self) -> (i32, i32) {
        self.checked_bounds
    }

    pub fn get(&self, index: usize) -> Option<&Tick> {
        self.ticks.get(index)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    fn is_bound(&self, tick: i32) -> bool {
        tick == self.checked_bounds.0 || tick == self.checked_bounds.1
    }

    /// Re-derives the active index after a price move to `active_tick`.
    pub fn set_active_tick(&mut self, active_tick: i32) {
        self.active_tick_index = find_nearest_initialized_tick_index(&self.ticks, active_tick);
    }

    /// Applies a position's liquidity change at one of its bounds.
    ///
    /// Upper bounds carry the negated delta. A tick outside the tracked ticks is
    /// folded into the nearest sentinel unless `force_insert` is set. An entry
    /// whose delta drops to zero is removed unless it is a window bound.
    pub fn update_tick(
        &mut self,
        tick: i32,
        liquidity_delta: i128,
        is_upper: bool,
        force_insert: bool,
        active_tick: i32,
    ) -> Result<(), LedgerError> {
        let delta = if is_upper {
            liquidity_delta.checked_neg().ok_or(LedgerError::DeltaOverflow(tick))?
        } else {
            liquidity_delta
        };

        let nearest = find_nearest_initialized_tick_index(&self.ticks, tick);
        let len = self.ticks.len();

        match nearest {
            Some(index) if self.ticks[index].number == tick => {
                let updated = self.ticks[index]
                    .liquidity_delta
                    .checked_add(delta)
                    .ok_or(LedgerError::DeltaOverflow(tick))?;

                if updated == 0 && !self.is_bound(tick) {
                    Arc::make_mut(&mut self.ticks).remove(index);
                    if active_tick >= tick {
                        self.active_tick_index = self.active_tick_index.and_then(|i| i.checked_sub(1));
                    }
                } else {
                    Arc::make_mut(&mut self.ticks)[index].liquidity_delta = updated;
                }
            },
            None if !force_insert && len > 0 => {
                self.accumulate(0, delta)?;
            },
            Some(index) if !force_insert && index == len - 1 => {
                self.accumulate(index, delta)?;
            },
            _ => {
                let position = nearest.map_or(0, |i| i + 1);
                Arc::make_mut(&mut self.ticks).insert(position, Tick::new(tick, delta));
                if active_tick >= tick {
                    self.active_tick_index = Some(self.active_tick_index.map_or(0, |i| i + 1));
                }
            },
        }

        Ok(())
    }

    fn accumulate(&mut self, index: usize, delta: i128) -> Result<(), LedgerError> {
        let entry = &mut Arc::make_mut(&mut self.ticks)[index];
        entry.liquidity_delta = entry
            .liquidity_delta
            .checked_add(delta)
            .ok_or(LedgerError::DeltaOverflow(entry.number))?;
        Ok(())
    }

    /// Folds liquidity from outside the checked window into the two sentinel
    /// ticks, so that the deltas sum to zero and the running sum at the active
    /// tick equals `liquidity`. Run once after a cold read.
    pub fn add_liquidity_cutoffs(
        &mut self,
        active_tick: i32,
        liquidity: u128,
    ) -> Result<(), LedgerError> {
        let liquidity =
            i128::try_from(liquidity).map_err(|_| LedgerError::LiquidityOverflow(liquidity))?;

        let mut current = 0i128;
        let mut active_index = None;
        let mut lower_cutoff = None;

        for (index, tick) in self.ticks.iter().enumerate() {
            if lower_cutoff.is_none() && active_tick < tick.number {
                active_index = index.checked_sub(1);
                lower_cutoff = Some(liquidity - current);
                current = liquidity;
            }
            current = current
                .checked_add(tick.liquidity_delta)
                .ok_or(LedgerError::DeltaOverflow(tick.number))?;
        }

        let lower_cutoff = match lower_cutoff {
            Some(cutoff) => cutoff,
            None => {
                active_index = self.ticks.len().checked_sub(1);
                let cutoff = liquidity - current;
                current = liquidity;
                cutoff
            },
        };

        self.active_tick_index = active_index;

        let (lower, upper) = self.checked_bounds;
        self.update_tick(lower, lower_cutoff, false, true, active_tick)?;
        self.update_tick(upper, current, true, true, active_tick)
    }

    /// Sum of the deltas up to and including the active tick.
    pub fn active_liquidity(&self) -> i128 {
        self.active_tick_index
            .map_or(0, |index| self.ticks[..=index].iter().map(|t| t.liquidity_delta).sum())
    }
}
