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

//! Deamortized heavy hitter sketches.
//!
//! # Overview
//!
//! [`DimSum`] tracks approximate weights of `u32` items in a stream of positive integer weights
//! and reports the items whose weight is at least a given threshold. It implements the DIM-SUM and
//! DIM-SUM++ table designs, which keep the cost of every update bounded by spreading table
//! maintenance over the updates that follow it.
//!
//! Counters live in fixed-size tables. New items go into the *active* table, seeded with the
//! count they already had in a passive table or, failing that, with the current *quantile*. When
//! the active table has accepted its budget of new items it is rotated out and becomes *passive*,
//! and a maintenance job raises the quantile and keeps only the heaviest passive items.
//!
//! # Accuracy
//!
//! For every item, `true weight <= point_est(item)`, and `point_err()`, the estimate given to
//! items not found in any table, never decreases. Every item whose true weight is at least
//! `threshold + point_err()` is reported by `output(threshold)`.
//!
//! # Partitioning
//!
//! * [`Partitioning::Three`] (DIM-SUM++, the default) uses `1/epsilon + 3 * gamma / (2 * epsilon)`
//!   counters: an active, a small passive and a spare table of `gamma / (2 * epsilon)` counters,
//!   and a large passive table of `1/epsilon` counters.
//! * [`Partitioning::Two`] (DIM-SUM) uses an active, a passive and a spare table of
//!   `(1 + gamma) / epsilon` counters each.
//!
//! # Scheduling
//!
//! With [`Scheduling::Synchronous`] the update that rotates the active table pays for the whole
//! maintenance job. With [`Scheduling::Background`] a worker thread runs the job in slices of
//! [`DimSum::steps_per_update`] steps, one slice per update, so no single update waits for a full
//! job. Queries issued while a background job is pending may see a partially maintained
//! generation, for example an item present in both passive tables or a quantile raised before the
//! heavy items moved. Estimates remain upper bounds throughout.
//!
//! # Examples
//!
//! ```
//! use dimsum::heavyhitters::DimSum;
//! use dimsum::heavyhitters::Partitioning;
//! use dimsum::heavyhitters::Scheduling;
//!
//! let mut sketch = DimSum::builder(0.01, 1.0)
//!     .partitioning(Partitioning::Two)
//!     .scheduling(Scheduling::Background)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! for i in 0..10_000u32 {
//!     sketch.update(i % 100, 1);
//!     sketch.update(7, 5);
//! }
//! assert!(sketch.point_est(7) >= 50_100);
//! assert!(sketch.output(40_000).contains_key(&7));
//! ```

mod counter_table;
mod maintenance;
mod partitions;
mod sketch;
mod worker;

pub use self::partitions::Partition;
pub use self::partitions::Partitioning;
pub use self::sketch::DimSum;
pub use self::sketch::DimSumBuilder;
pub use self::sketch::Entry;
pub use self::sketch::Scheduling;
