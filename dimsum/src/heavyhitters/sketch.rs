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

//! The DIM-SUM heavy hitter sketch and its builder.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::hash::PairwiseHash;
use crate::heavyhitters::maintenance;
use crate::heavyhitters::maintenance::MaintenanceJob;
use crate::heavyhitters::maintenance::Unbounded;
use crate::heavyhitters::partitions::Layout;
use crate::heavyhitters::partitions::Partition;
use crate::heavyhitters::partitions::Partitioning;
use crate::heavyhitters::partitions::Partitions;
use crate::heavyhitters::worker::Progress;
use crate::heavyhitters::worker::Worker;

/// Where maintenance runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scheduling {
    /// The update that fills the active table runs the whole maintenance job before returning.
    #[default]
    Synchronous,
    /// A dedicated thread runs maintenance in slices, one slice per update, so every update does
    /// a bounded amount of work.
    Background,
}

/// A tracked item as seen by [`DimSum::find_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    item: u32,
    count: i32,
    partition: Partition,
}

impl Entry {
    /// Returns the item.
    pub fn item(&self) -> u32 {
        self.item
    }

    /// Returns the stored count, an upper bound on the item's weight.
    pub fn count(&self) -> i32 {
        self.count
    }

    /// Returns the table holding the authoritative count.
    pub fn partition(&self) -> Partition {
        self.partition
    }
}

#[derive(Debug)]
enum Maintenance {
    Synchronous(MaintenanceJob),
    Background { worker: Worker, pending: bool },
}

/// Heavy hitter sketch over a stream of `(item, weight)` updates.
///
/// Every estimate is an upper bound on the item's true weight. Items not found in any table are
/// estimated at [`DimSum::point_err`], which never decreases.
#[derive(Debug)]
pub struct DimSum {
    epsilon: f64,
    gamma: f64,
    layout: Layout,
    tables: Arc<Mutex<Partitions>>,
    maintenance: Maintenance,
    inserts_left: usize,
    steps_per_update: usize,
    total_weight: i64,
}

impl DimSum {
    /// Creates a three-partition sketch with synchronous maintenance.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is not in `(0, 1)` or `gamma` is not a positive finite number.
    pub fn new(epsilon: f64, gamma: f64) -> Self {
        match Self::builder(epsilon, gamma).build() {
            Ok(sketch) => sketch,
            Err(err) => panic!("invalid sketch parameters: {err}"),
        }
    }

    /// Creates a builder with the given accuracy and space trade-off.
    ///
    /// `epsilon` bounds the error as a fraction of the stream weight. `gamma` buys fewer
    /// maintenance passes with more space.
    pub fn builder(epsilon: f64, gamma: f64) -> DimSumBuilder {
        DimSumBuilder {
            epsilon,
            gamma,
            partitioning: Partitioning::default(),
            scheduling: Scheduling::default(),
            hash: PairwiseHash::default(),
        }
    }

    /// Adds `weight` to `item`.
    ///
    /// # Panics
    ///
    /// Panics if [`DimSum::try_update`] fails.
    pub fn update(&mut self, item: u32, weight: i32) {
        if let Err(err) = self.try_update(item, weight) {
            panic!("update failed: {err}");
        }
    }

    /// Adds `weight` to `item`, reporting invalid weights and maintenance failures.
    pub fn try_update(&mut self, item: u32, weight: i32) -> Result<(), Error> {
        if weight <= 0 {
            return Err(Error::invalid_argument("weight must be positive")
                .with_context("item", item)
                .with_context("weight", weight));
        }
        self.advance_maintenance()?;

        let mut parts = self.tables.lock();
        if let Some(slot) = parts.active.find(item) {
            parts.active.add_count(slot, weight);
            drop(parts);
            self.total_weight = self.total_weight.saturating_add(i64::from(weight));
            return Ok(());
        }
        if self.inserts_left == 0 {
            drop(parts);
            self.rotate()?;
            parts = self.tables.lock();
        }
        self.inserts_left -= 1;
        let prior = parts
            .find_in_passive(item)
            .map_or(parts.quantile, |(_, count)| count);
        parts.active.insert(item, prior.saturating_add(weight));
        drop(parts);
        self.total_weight = self.total_weight.saturating_add(i64::from(weight));
        Ok(())
    }

    /// Returns an upper bound on the weight of `item`.
    pub fn point_est(&self, item: u32) -> i32 {
        self.tables.lock().point_est(item)
    }

    /// Returns the estimate given to items not found in any table, an upper bound on their weight.
    pub fn point_err(&self) -> i32 {
        self.tables.lock().quantile
    }

    /// Returns every tracked item whose estimate is at least `threshold`.
    ///
    /// Every item whose true weight is at least `threshold + point_err()` is included.
    pub fn output(&self, threshold: u64) -> BTreeMap<u32, u32> {
        self.tables.lock().output(threshold)
    }

    /// Returns the tracked entry for `item`, if any.
    pub fn find_item(&self, item: u32) -> Option<Entry> {
        self.tables
            .lock()
            .find_item(item)
            .map(|(partition, count)| Entry {
                item,
                count,
                partition,
            })
    }

    /// Returns the memory used by the sketch, in bytes.
    pub fn size(&self) -> usize {
        mem::size_of::<Self>()
            + self.tables.lock().size_in_bytes()
            + self.layout.buffer_len() * mem::size_of::<i32>()
    }

    /// Returns the sum of all weights seen.
    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn partitioning(&self) -> Partitioning {
        self.layout.partitioning
    }

    pub fn scheduling(&self) -> Scheduling {
        match self.maintenance {
            Maintenance::Synchronous(_) => Scheduling::Synchronous,
            Maintenance::Background { .. } => Scheduling::Background,
        }
    }

    /// Returns the number of distinct items currently tracked.
    pub fn num_tracked(&self) -> usize {
        self.tables.lock().num_tracked()
    }

    /// Returns the number of completed maintenance generations.
    pub fn generations(&self) -> u64 {
        self.tables.lock().generations
    }

    /// Returns how many maintenance steps each update grants a pending generation.
    pub fn steps_per_update(&self) -> usize {
        self.steps_per_update
    }

    /// Returns true if a background generation has not finished yet.
    pub fn is_maintenance_pending(&self) -> bool {
        matches!(self.maintenance, Maintenance::Background { pending: true, .. })
    }

    /// Walks every bucket chain and checks it against the stored counters.
    pub fn check_integrity(&self) -> Result<(), Error> {
        self.tables.lock().check_integrity()
    }

    fn advance_maintenance(&mut self) -> Result<(), Error> {
        if let Maintenance::Background { worker, pending } = &mut self.maintenance {
            if *pending {
                *pending = worker.advance(self.steps_per_update)? == Progress::Paused;
            }
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), Error> {
        if let Maintenance::Background { worker, pending } = &mut self.maintenance {
            if *pending {
                warn!(
                    steps_per_update = self.steps_per_update,
                    "maintenance still pending at rotation, draining it"
                );
                worker.finish()?;
                *pending = false;
            }
        }

        let generation = {
            let mut parts = self.tables.lock();
            parts.rotate();
            parts.generations + 1
        };
        debug!(generation, "rotated tables");
        self.inserts_left = self.layout.insert_budget;

        match &mut self.maintenance {
            Maintenance::Synchronous(job) => job.run(&self.tables, &mut Unbounded),
            Maintenance::Background { worker, pending } => {
                *pending = worker.start(self.steps_per_update)? == Progress::Paused;
                Ok(())
            }
        }
    }
}

/// Builder for [`DimSum`].
#[derive(Debug, Clone)]
pub struct DimSumBuilder {
    epsilon: f64,
    gamma: f64,
    partitioning: Partitioning,
    scheduling: Scheduling,
    hash: PairwiseHash,
}

impl DimSumBuilder {
    /// Sets how counters are split across tables. Defaults to [`Partitioning::Three`].
    pub fn partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Sets where maintenance runs. Defaults to [`Scheduling::Synchronous`].
    pub fn scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Draws the bucket hash from a seeded generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.hash = PairwiseHash::from_seed(seed);
        self
    }

    /// Uses an explicit bucket hash.
    pub fn hash(mut self, hash: PairwiseHash) -> Self {
        self.hash = hash;
        self
    }

    /// Builds the sketch.
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if the
    /// parameters are out of range, and with
    /// [`ErrorKind::MaintenanceStopped`](crate::error::ErrorKind::MaintenanceStopped) if the
    /// maintenance thread cannot be started.
    pub fn build(self) -> Result<DimSum, Error> {
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(Error::invalid_argument("epsilon must be in (0, 1)")
                .with_context("epsilon", self.epsilon));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(Error::invalid_argument("gamma must be positive and finite")
                .with_context("gamma", self.gamma));
        }
        let layout = Layout::new(self.partitioning, self.epsilon, self.gamma)?;
        let tables = Arc::new(Mutex::new(Partitions::new(&layout, self.hash)));
        let job = MaintenanceJob::new(layout);
        let maintenance = match self.scheduling {
            Scheduling::Synchronous => Maintenance::Synchronous(job),
            Scheduling::Background => Maintenance::Background {
                worker: Worker::spawn(job, tables.clone())?,
                pending: false,
            },
        };
        Ok(DimSum {
            epsilon: self.epsilon,
            gamma: self.gamma,
            layout,
            tables,
            maintenance,
            inserts_left: layout.insert_budget,
            steps_per_update: maintenance::steps_per_update(&layout),
            total_weight: 0,
        })
    }
}
