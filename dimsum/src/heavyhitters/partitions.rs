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

//! Table layout and lookups across partitions.

use std::collections::BTreeMap;
use std::mem;

use crate::error::Error;
use crate::hash::PairwiseHash;
use crate::heavyhitters::counter_table::CounterTable;
use crate::heavyhitters::counter_table::HASH_MULTIPLIER;

/// Largest number of counters a single table may hold.
const MAX_TABLE_CAPACITY: usize = (u32::MAX as usize) / HASH_MULTIPLIER;

/// How counters are split across tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Partitioning {
    /// DIM-SUM: an active and a passive table of `1/epsilon + gamma/epsilon` counters each.
    ///
    /// Maintenance keeps the `1/epsilon` heaviest passive items by copying them into the active
    /// table, which leaves `gamma/epsilon` slots for new items per generation.
    Two,
    /// DIM-SUM++: an active and a small passive table of `gamma/(2 epsilon)` counters each, plus a
    /// large passive table of `1/epsilon` counters holding the heaviest items.
    ///
    /// Maintenance merges the small passive table into the large one and swaps light items out of
    /// it, so nothing is copied into the active table and it uses half the space of DIM-SUM.
    #[default]
    Three,
}

/// The table an entry was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// The table absorbing new items.
    Active,
    /// The most recently rotated out table (the small passive table under
    /// [`Partitioning::Three`]).
    Passive,
    /// The large passive table of [`Partitioning::Three`].
    Large,
}

/// Table sizes derived from `epsilon` and `gamma`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub partitioning: Partitioning,
    /// Capacity of the active, passive and spare tables.
    pub table_capacity: usize,
    pub large_capacity: Option<usize>,
    /// Number of new items the active table accepts per generation.
    pub insert_budget: usize,
    /// Rank of the new quantile within the scratch buffer.
    pub quantile_rank: usize,
}

impl Layout {
    pub fn new(partitioning: Partitioning, epsilon: f64, gamma: f64) -> Result<Self, Error> {
        let layout = match partitioning {
            Partitioning::Two => {
                let keep = capacity_for(1.0 / epsilon)?;
                let extra = capacity_for(gamma / epsilon)?;
                Layout {
                    partitioning,
                    table_capacity: checked_capacity(keep + extra)?,
                    large_capacity: None,
                    insert_budget: extra,
                    quantile_rank: extra - 1,
                }
            }
            Partitioning::Three => {
                let small = capacity_for(0.5 * gamma / epsilon)?;
                Layout {
                    partitioning,
                    table_capacity: small,
                    large_capacity: Some(capacity_for(1.0 / epsilon)?),
                    insert_budget: small,
                    quantile_rank: small,
                }
            }
        };
        Ok(layout)
    }

    /// Length of the scratch buffer the quantile is selected from.
    pub fn buffer_len(&self) -> usize {
        self.table_capacity + self.large_capacity.unwrap_or(0)
    }
}

fn capacity_for(size: f64) -> Result<usize, Error> {
    if !size.is_finite() || size > MAX_TABLE_CAPACITY as f64 {
        return Err(Error::invalid_argument("table capacity out of range")
            .with_context("requested", size));
    }
    Ok((size.ceil() as usize).max(1))
}

fn checked_capacity(capacity: usize) -> Result<usize, Error> {
    if capacity > MAX_TABLE_CAPACITY {
        return Err(Error::invalid_argument("table capacity out of range")
            .with_context("requested", capacity));
    }
    Ok(capacity)
}

/// All tables of one sketch plus the current error bound.
#[derive(Debug)]
pub(super) struct Partitions {
    pub active: CounterTable,
    pub passive: CounterTable,
    pub large: Option<CounterTable>,
    /// Table recycled from the last rotation; cleared by maintenance to become the next active.
    pub spare: CounterTable,
    /// Upper bound on the weight of any item not found in a table. Never decreases.
    pub quantile: i32,
    pub generations: u64,
}

impl Partitions {
    pub fn new(layout: &Layout, hasher: PairwiseHash) -> Self {
        Self {
            active: CounterTable::new(layout.table_capacity, hasher),
            passive: CounterTable::new(layout.table_capacity, hasher),
            large: layout
                .large_capacity
                .map(|capacity| CounterTable::new(capacity, hasher)),
            spare: CounterTable::new(layout.table_capacity, hasher),
            quantile: 0,
            generations: 0,
        }
    }

    /// Probes active, passive and large in that order.
    ///
    /// The order matters: a table rotated out more recently holds the newer upper bound.
    pub fn find_item(&self, item: u32) -> Option<(Partition, i32)> {
        if let Some(count) = self.active.get(item) {
            return Some((Partition::Active, count));
        }
        self.find_in_passive(item)
    }

    /// Probes the passive tables only.
    pub fn find_in_passive(&self, item: u32) -> Option<(Partition, i32)> {
        if let Some(count) = self.passive.get(item) {
            return Some((Partition::Passive, count));
        }
        self.large
            .as_ref()
            .and_then(|large| large.get(item))
            .map(|count| (Partition::Large, count))
    }

    pub fn point_est(&self, item: u32) -> i32 {
        match self.find_item(item) {
            Some((_, count)) => count,
            None => self.quantile,
        }
    }

    /// Collects every tracked item whose authoritative count is at least `threshold`.
    ///
    /// A passive entry is only reported when no table probed before it holds the same item, so
    /// every reported count equals what [`Partitions::point_est`] returns.
    pub fn output(&self, threshold: u64) -> BTreeMap<u32, u32> {
        let mut result = BTreeMap::new();
        let mut collect = |table: &CounterTable, shadowed: &dyn Fn(u32) -> bool| {
            for (_, item, count) in table.iter() {
                if count >= 0 && count as u64 >= threshold && !shadowed(item) {
                    result.insert(item, count as u32);
                }
            }
        };
        collect(&self.active, &|_| false);
        collect(&self.passive, &|item| self.active.find(item).is_some());
        if let Some(large) = &self.large {
            collect(large, &|item| {
                self.active.find(item).is_some() || self.passive.find(item).is_some()
            });
        }
        result
    }

    /// Counts distinct tracked items.
    pub fn num_tracked(&self) -> usize {
        let passive = self
            .passive
            .iter()
            .filter(|&(_, item, _)| self.active.find(item).is_none())
            .count();
        let large = self.large.as_ref().map_or(0, |large| {
            large
                .iter()
                .filter(|&(_, item, _)| {
                    self.active.find(item).is_none() && self.passive.find(item).is_none()
                })
                .count()
        });
        self.active.num_occupied() + passive + large
    }

    /// Makes the cleared spare table active and the full active table passive.
    ///
    /// The previous passive table becomes the spare. Its contents are dropped from every lookup
    /// and maintenance clears it in place.
    pub fn rotate(&mut self) {
        assert!(
            self.spare.is_empty(),
            "rotating before the spare table was cleared"
        );
        mem::swap(&mut self.active, &mut self.spare);
        mem::swap(&mut self.spare, &mut self.passive);
    }

    pub fn check_integrity(&self) -> Result<(), Error> {
        self.active.check_chains()?;
        self.passive.check_chains()?;
        if let Some(large) = &self.large {
            large.check_chains()?;
        }
        Ok(())
    }

    pub fn size_in_bytes(&self) -> usize {
        self.active.size_in_bytes()
            + self.passive.size_in_bytes()
            + self.spare.size_in_bytes()
            + self.large.as_ref().map_or(0, CounterTable::size_in_bytes)
    }
}
