// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The work done after each rotation: raise the quantile, keep the heavy passive items and clear
//! the spare table.
//!
//! A job is a sequence of small units. Before each unit the job asks its [`Budget`] for a step,
//! and the tables are locked only for the unit itself, so a budget that blocks never holds the
//! lock.

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::heavyhitters::counter_table::CounterTable;
use crate::heavyhitters::counter_table::HASH_MULTIPLIER;
use crate::heavyhitters::partitions::Layout;
use crate::heavyhitters::partitions::Partitioning;
use crate::heavyhitters::partitions::Partitions;
use crate::select::select_work_bound;
use crate::select::try_select_nth;

/// Number of buckets or slots of the spare table cleared per step.
const CLEAR_CHUNK: usize = 8;

/// Meters the steps of a maintenance job.
pub(super) trait Budget {
    /// Called before every unit of work. An error aborts the job.
    fn step(&mut self) -> Result<(), Error>;
}

/// Runs a job to completion.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Unbounded;

impl Budget for Unbounded {
    fn step(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Returns the most steps one generation can take.
pub(super) fn work_bound(layout: &Layout) -> u64 {
    let passive = layout.table_capacity as u64;
    let buckets = passive * HASH_MULTIPLIER as u64;
    let clear = buckets.div_ceil(CLEAR_CHUNK as u64) + passive.div_ceil(CLEAR_CHUNK as u64);
    match layout.large_capacity {
        Some(large) => {
            let combined = passive + large as u64;
            // merge, copy, select, swap walk, clear
            passive + combined + select_work_bound(layout.buffer_len(), true) + combined + clear
        }
        // copy, select, promote, clear
        None => passive + select_work_bound(layout.buffer_len(), true) + passive + clear,
    }
}

/// Number of steps each update grants a pending job so that it finishes before the active table
/// fills up again.
pub(super) fn steps_per_update(layout: &Layout) -> usize {
    let per_insert = work_bound(layout).div_ceil(layout.insert_budget as u64);
    usize::try_from(per_insert).unwrap_or(usize::MAX).max(1)
}

/// Maintenance for one sketch, reused across generations.
#[derive(Debug)]
pub(super) struct MaintenanceJob {
    layout: Layout,
    buffer: Vec<i32>,
}

impl MaintenanceJob {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            buffer: Vec::with_capacity(layout.buffer_len()),
        }
    }

    /// Runs one generation against freshly rotated tables.
    pub fn run<B: Budget>(&mut self, tables: &Mutex<Partitions>, budget: &mut B) -> Result<(), Error> {
        match self.layout.partitioning {
            Partitioning::Three => {
                self.merge(tables, budget)?;
                let quantile = self.raise_quantile(tables, budget)?;
                self.swap_out(tables, budget, quantile)?;
            }
            Partitioning::Two => {
                let quantile = self.raise_quantile(tables, budget)?;
                self.promote(tables, budget, quantile)?;
            }
        }
        self.clear_spare(tables, budget)?;

        let mut parts = tables.lock();
        parts.generations += 1;
        debug!(
            generation = parts.generations,
            quantile = parts.quantile,
            "maintenance generation complete"
        );
        Ok(())
    }

    /// Adds the counts of passive entries that also live in the large table to the large entry
    /// and vacates the passive slot.
    fn merge<B: Budget>(&self, tables: &Mutex<Partitions>, budget: &mut B) -> Result<(), Error> {
        for slot in 0..self.layout.table_capacity {
            budget.step()?;
            let mut guard = tables.lock();
            let Partitions { passive, large, .. } = &mut *guard;
            let (Some(large), Some(item)) = (large.as_mut(), passive.counter(slot).item()) else {
                continue;
            };
            if let Some(target) = large.find(item) {
                large.add_count(target, passive.counter(slot).count());
                passive.remove(slot)?;
            }
        }
        Ok(())
    }

    /// Selects the new quantile from every passive count and publishes it.
    fn raise_quantile<B: Budget>(
        &mut self,
        tables: &Mutex<Partitions>,
        budget: &mut B,
    ) -> Result<i32, Error> {
        self.buffer.clear();
        for slot in 0..self.layout.table_capacity {
            budget.step()?;
            self.buffer.push(tables.lock().passive.counter(slot).count());
        }
        for slot in 0..self.layout.large_capacity.unwrap_or(0) {
            budget.step()?;
            let count = tables
                .lock()
                .large
                .as_ref()
                .map_or(0, |large| large.counter(slot).count());
            self.buffer.push(count);
        }

        let current = tables.lock().quantile;
        let selected = try_select_nth(
            &mut self.buffer,
            self.layout.quantile_rank,
            Some(current.saturating_add(1)),
            &mut || budget.step(),
        )?;
        let quantile = current.max(selected);
        tables.lock().quantile = quantile;
        Ok(quantile)
    }

    /// Moves passive items above `quantile` into large slots holding items at or below it.
    fn swap_out<B: Budget>(
        &self,
        tables: &Mutex<Partitions>,
        budget: &mut B,
        quantile: i32,
    ) -> Result<(), Error> {
        let passive_len = self.layout.table_capacity;
        let large_len = self.layout.large_capacity.unwrap_or(0);
        let (mut i, mut j, mut swaps) = (0, 0, 0);
        while i < passive_len && j < large_len && swaps < passive_len {
            budget.step()?;
            let mut guard = tables.lock();
            let Partitions { passive, large, .. } = &mut *guard;
            let Some(large) = large.as_mut() else {
                break;
            };
            if large.counter(j).count() > quantile {
                j += 1;
            } else if passive.counter(i).count() <= quantile {
                i += 1;
            } else {
                CounterTable::swap_slots(passive, i, large, j)?;
                i += 1;
                j += 1;
                swaps += 1;
            }
        }
        Ok(())
    }

    /// Copies passive items above `quantile` into the active table.
    fn promote<B: Budget>(
        &self,
        tables: &Mutex<Partitions>,
        budget: &mut B,
        quantile: i32,
    ) -> Result<(), Error> {
        for slot in 0..self.layout.table_capacity {
            budget.step()?;
            let mut guard = tables.lock();
            let Partitions { active, passive, .. } = &mut *guard;
            let counter = passive.counter(slot);
            if let Some(item) = counter.item() {
                if counter.count() > quantile && active.find(item).is_none() {
                    active.insert(item, counter.count());
                }
            }
        }
        Ok(())
    }

    fn clear_spare<B: Budget>(&self, tables: &Mutex<Partitions>, budget: &mut B) -> Result<(), Error> {
        let (buckets, slots) = {
            let parts = tables.lock();
            (parts.spare.bucket_count(), parts.spare.capacity())
        };
        for start in (0..buckets).step_by(CLEAR_CHUNK) {
            budget.step()?;
            let end = (start + CLEAR_CHUNK).min(buckets);
            tables.lock().spare.clear_buckets(start..end);
        }
        for start in (0..slots).step_by(CLEAR_CHUNK) {
            budget.step()?;
            let end = (start + CLEAR_CHUNK).min(slots);
            tables.lock().spare.clear_slots(start..end);
        }
        tables.lock().spare.finish_clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::PairwiseHash;

    /// Counts steps and optionally fails after a fixed number of them.
    struct Meter {
        taken: u64,
        limit: Option<u64>,
    }

    impl Budget for Meter {
        fn step(&mut self) -> Result<(), Error> {
            if self.limit.is_some_and(|limit| self.taken == limit) {
                return Err(Error::maintenance_stopped("out of steps"));
            }
            self.taken += 1;
            Ok(())
        }
    }

    fn rotated(layout: &Layout, counts: &[(u32, i32)]) -> Mutex<Partitions> {
        let mut parts = Partitions::new(layout, PairwiseHash::default());
        for &(item, count) in counts {
            parts.active.insert(item, count);
        }
        parts.rotate();
        Mutex::new(parts)
    }

    #[test]
    fn test_three_partition_generation() {
        let layout = Layout::new(Partitioning::Three, 0.25, 1.0).unwrap();
        assert_eq!(layout.table_capacity, 2);
        assert_eq!(layout.large_capacity, Some(4));

        let tables = rotated(&layout, &[(1, 9), (2, 1)]);
        let mut job = MaintenanceJob::new(layout);
        let mut meter = Meter {
            taken: 0,
            limit: None,
        };
        job.run(&tables, &mut meter).unwrap();

        let parts = tables.lock();
        // counts 9, 1, 0, 0, 0, 0 at rank 2
        assert_eq!(parts.quantile, 0);
        assert_eq!(parts.generations, 1);
        assert_eq!(parts.find_item(1).map(|(_, c)| c), Some(9));
        assert_eq!(parts.large.as_ref().and_then(|l| l.get(1)), Some(9));
        assert_eq!(parts.large.as_ref().and_then(|l| l.get(2)), Some(1));
        assert!(parts.spare.is_empty());
        parts.check_integrity().unwrap();
        assert!(meter.taken <= work_bound(&layout));
    }

    #[test]
    fn test_merge_sums_counts_into_large() {
        let layout = Layout::new(Partitioning::Three, 0.25, 1.0).unwrap();
        let tables = rotated(&layout, &[(5, 20)]);
        if let Some(large) = tables.lock().large.as_mut() {
            large.insert(5, 12);
        }
        MaintenanceJob::new(layout).run(&tables, &mut Unbounded).unwrap();

        let parts = tables.lock();
        assert_eq!(parts.passive.get(5), None);
        assert_eq!(parts.find_item(5).map(|(_, c)| c), Some(32));
    }

    #[test]
    fn test_two_partition_generation_promotes_heavy_items() {
        let layout = Layout::new(Partitioning::Two, 0.5, 1.0).unwrap();
        assert_eq!(layout.table_capacity, 4);
        assert_eq!(layout.quantile_rank, 1);

        let tables = rotated(&layout, &[(1, 7), (2, 3), (3, 2), (4, 1)]);
        MaintenanceJob::new(layout).run(&tables, &mut Unbounded).unwrap();

        let parts = tables.lock();
        assert_eq!(parts.quantile, 2);
        assert_eq!(parts.active.get(1), Some(7));
        assert_eq!(parts.active.get(2), Some(3));
        assert_eq!(parts.active.get(3), None);
        assert_eq!(parts.point_est(4), 1);
        parts.check_integrity().unwrap();
    }

    #[test]
    fn test_budget_error_aborts_job() {
        let layout = Layout::new(Partitioning::Three, 0.1, 1.0).unwrap();
        let tables = rotated(&layout, &[(1, 1), (2, 2)]);
        let mut meter = Meter {
            taken: 0,
            limit: Some(3),
        };
        let err = MaintenanceJob::new(layout)
            .run(&tables, &mut meter)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MaintenanceStopped);
        assert_eq!(tables.lock().generations, 0);
    }

    #[test]
    fn test_steps_per_update_is_positive() {
        for partitioning in [Partitioning::Two, Partitioning::Three] {
            for (epsilon, gamma) in [(0.5, 0.1), (0.1, 1.0), (0.001, 4.0)] {
                let layout = Layout::new(partitioning, epsilon, gamma).unwrap();
                assert!(steps_per_update(&layout) >= 1);
            }
        }
    }
}
