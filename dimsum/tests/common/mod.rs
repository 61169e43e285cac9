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

use std::collections::HashMap;

use dimsum::heavyhitters::DimSum;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Exact weights of every item fed to a sketch.
#[derive(Debug, Default)]
pub struct ExactCounts {
    counts: HashMap<u32, i64>,
}

impl ExactCounts {
    pub fn add(&mut self, item: u32, weight: i32) {
        *self.counts.entry(item).or_default() += i64::from(weight);
    }

    pub fn get(&self, item: u32) -> i64 {
        self.counts.get(&item).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.counts.iter().map(|(&item, &count)| (item, count))
    }
}

/// Generates a stream where a few small items carry most of the weight.
pub fn skewed_stream(seed: u64, len: usize, universe: u32) -> Vec<(u32, i32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let r: f64 = rng.random();
            let item = (f64::from(universe) * r * r * r) as u32;
            (item, rng.random_range(1..=8))
        })
        .collect()
}

/// Feeds `stream` into `sketch` and returns the exact counts.
pub fn feed(sketch: &mut DimSum, stream: &[(u32, i32)]) -> ExactCounts {
    let mut exact = ExactCounts::default();
    let mut last_err = sketch.point_err();
    for &(item, weight) in stream {
        sketch.update(item, weight);
        exact.add(item, weight);
        let err = sketch.point_err();
        assert!(err >= last_err, "error bound decreased from {last_err} to {err}");
        last_err = err;
    }
    exact
}

/// Checks the guarantees that hold for every scheduling.
pub fn assert_upper_bounds(sketch: &DimSum, exact: &ExactCounts, threshold: u64) {
    for (item, count) in exact.iter() {
        let estimate = i64::from(sketch.point_est(item));
        assert!(
            estimate >= count,
            "estimate {estimate} below true weight {count} for item {item}"
        );
    }

    let err = i64::from(sketch.point_err());
    let output = sketch.output(threshold);
    for (&item, &count) in &output {
        assert!(u64::from(count) >= threshold);
        assert_eq!(count as i32, sketch.point_est(item));
    }
    for (item, count) in exact.iter() {
        if count >= threshold as i64 + err {
            assert!(
                output.contains_key(&item),
                "item {item} with weight {count} missing from output({threshold}), error {err}"
            );
        }
    }
}
