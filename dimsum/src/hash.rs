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

//! Pairwise independent hash family used to place counters into buckets.
//!
//! The family is the classic `((a * x + b) mod p)` construction over the Mersenne prime
//! `p = 2^31 - 1`, with the modular reduction done by folding the high bits back in. The tables
//! only need the hash to be deterministic and well spread, so any member of the family works.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Mersenne prime `2^31 - 1`, also the output mask.
const MOD: i64 = (1 << 31) - 1;
const HL: u32 = 31;

/// Default multiplier, fixed so that runs are reproducible.
pub const DEFAULT_HASH_A: i64 = 151261303;
/// Default offset, fixed so that runs are reproducible.
pub const DEFAULT_HASH_B: i64 = 6722461;

/// Hashes `item` with the member of the family selected by `a` and `b`.
///
/// The result is always below `2^31`.
#[inline]
pub fn hash31(a: i64, b: i64, item: u32) -> u32 {
    let result = a.wrapping_mul(item as i64).wrapping_add(b);
    let result = (result >> HL).wrapping_add(result) & MOD;
    result as u32
}

/// A member of the pairwise independent hash family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairwiseHash {
    a: i64,
    b: i64,
}

impl Default for PairwiseHash {
    fn default() -> Self {
        Self {
            a: DEFAULT_HASH_A,
            b: DEFAULT_HASH_B,
        }
    }
}

impl PairwiseHash {
    /// Creates a hash function from explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics if `a` is not in `[1, 2^31 - 1)` or `b` is not in `[0, 2^31 - 1)`.
    pub fn new(a: i64, b: i64) -> Self {
        assert!((1..MOD).contains(&a), "a must be in [1, {MOD}), got {a}");
        assert!((0..MOD).contains(&b), "b must be in [0, {MOD}), got {b}");
        Self { a, b }
    }

    /// Draws a random member of the family from a seeded generator.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = rng.random_range(1..MOD);
        let b = rng.random_range(0..MOD);
        Self { a, b }
    }

    /// Returns the multiplier.
    pub fn a(&self) -> i64 {
        self.a
    }

    /// Returns the offset.
    pub fn b(&self) -> i64 {
        self.b
    }

    /// Hashes an item.
    #[inline]
    pub fn hash(&self, item: u32) -> u32 {
        hash31(self.a, self.b, item)
    }
}
