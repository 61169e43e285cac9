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
//! This crate implements the DIM-SUM family of heavy hitter algorithms: an approximate
//! frequency counter over a stream of `(item, weight)` updates whose per-update work is bounded
//! in the worst case, not only on average. The periodic rebuild that a plain Misra-Gries style
//! summary performs in one spike is split into small steps and spread over the updates that
//! follow it.
//!
//! The main entry point is [`heavyhitters::DimSum`]. The linear-time order statistic selector
//! used to recompute the error bound is available on its own in [`select`].
//!
//! ```
//! # use dimsum::heavyhitters::DimSum;
//! let mut sketch = DimSum::new(0.1, 1.0);
//! sketch.update(7, 12);
//! sketch.update(9, 1);
//! assert!(sketch.point_est(7) >= 12);
//! assert!(sketch.output(10).contains_key(&7));
//! ```

pub mod error;
pub mod hash;
pub mod heavyhitters;
pub mod select;
