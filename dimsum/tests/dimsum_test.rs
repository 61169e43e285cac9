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

mod common;

use common::assert_upper_bounds;
use common::feed;
use common::skewed_stream;
use dimsum::error::ErrorKind;
use dimsum::hash::PairwiseHash;
use dimsum::heavyhitters::DimSum;
use dimsum::heavyhitters::Partition;
use dimsum::heavyhitters::Partitioning;
use dimsum::heavyhitters::Scheduling;
use googletest::assert_that;
use googletest::prelude::eq;
use googletest::prelude::ge;
use googletest::prelude::le;

fn sketch(epsilon: f64, gamma: f64, partitioning: Partitioning) -> DimSum {
    DimSum::builder(epsilon, gamma)
        .partitioning(partitioning)
        .build()
        .unwrap()
}

#[test]
fn test_init_defaults() {
    let sketch = DimSum::new(0.1, 1.0);
    assert_eq!(sketch.epsilon(), 0.1);
    assert_eq!(sketch.gamma(), 1.0);
    assert_eq!(sketch.partitioning(), Partitioning::Three);
    assert_eq!(sketch.scheduling(), Scheduling::Synchronous);
    assert_eq!(sketch.point_err(), 0);
    assert_eq!(sketch.point_est(1), 0);
    assert_eq!(sketch.total_weight(), 0);
    assert_eq!(sketch.num_tracked(), 0);
    assert_eq!(sketch.generations(), 0);
    assert!(!sketch.is_maintenance_pending());
    assert!(sketch.output(1).is_empty());
    assert!(sketch.find_item(1).is_none());
    assert_that!(sketch.steps_per_update(), ge(1));
}

#[test]
fn test_heavy_items_survive_maintenance() {
    for partitioning in [Partitioning::Three, Partitioning::Two] {
        let mut sketch = sketch(0.1, 1.0, partitioning);
        for (item, weight) in [(1, 1), (2, 10), (3, 11), (4, 12), (5, 5)] {
            sketch.update(item, weight);
        }
        assert_eq!(sketch.point_err(), 0);
        for filler in 100..110 {
            sketch.update(filler, 1);
        }

        assert_that!(sketch.generations(), ge(1));
        assert_that!(sketch.point_err(), le(1));
        let out = sketch.output(10);
        insta::allow_duplicates! {
            insta::assert_snapshot!(format!("{out:?}"), @"{2: 10, 3: 11, 4: 12}");
        }
        assert_eq!(sketch.point_est(1), 1);
        assert_eq!(sketch.point_est(5), 5);
        sketch.check_integrity().unwrap();
    }
}

#[test]
fn test_exact_counts_while_space_is_ample() {
    let mut sketch = DimSum::new(0.05, 0.4);
    for (item, weight) in (69..78).zip(4..13) {
        sketch.update(item, weight);
    }
    for (item, weight) in (69..78).zip(4..13) {
        assert_eq!(sketch.point_est(item), weight);
        let entry = sketch.find_item(item).unwrap();
        assert_eq!(entry.item(), item);
        assert_eq!(entry.count(), weight);
    }
    assert_eq!(sketch.point_err(), 0);
    assert_eq!(sketch.num_tracked(), 9);
    assert_eq!(sketch.total_weight(), (4..13).sum::<i64>());
}

#[test]
fn test_find_item_reports_partition() {
    let mut sketch = sketch(0.25, 1.0, Partitioning::Three);
    // two active slots per generation
    sketch.update(1, 9);
    sketch.update(2, 3);
    sketch.update(3, 1);
    assert_eq!(sketch.generations(), 1);
    assert_eq!(
        sketch.find_item(1).map(|entry| entry.partition()),
        Some(Partition::Large)
    );
    assert_eq!(
        sketch.find_item(3).map(|entry| entry.partition()),
        Some(Partition::Active)
    );

    sketch.update(1, 1);
    let entry = sketch.find_item(1).unwrap();
    assert_eq!(entry.partition(), Partition::Active);
    assert_eq!(entry.count(), 10);
}

#[test]
fn test_merge_adds_passive_weight_into_large() {
    let mut sketch = sketch(0.25, 1.0, Partitioning::Three);
    sketch.update(1, 9);
    sketch.update(2, 3);
    // rotates: items 1 and 2 move to the large table
    sketch.update(3, 1);
    // inherits 9 from the large table
    sketch.update(1, 1);
    assert_eq!(sketch.point_est(1), 10);

    // rotates again: the passive count 10 is added to the large count 9
    sketch.update(4, 1);
    assert_eq!(sketch.generations(), 2);
    let entry = sketch.find_item(1).unwrap();
    assert_eq!(entry.partition(), Partition::Large);
    assert_eq!(entry.count(), 19);
    assert_eq!(sketch.point_est(2), 3);
    sketch.check_integrity().unwrap();
}

#[test]
fn test_repeated_queries_are_stable() {
    let mut sketch = sketch(0.05, 0.5, Partitioning::Three);
    feed(&mut sketch, &skewed_stream(3, 5_000, 2_000));
    let err = sketch.point_err();
    let est = sketch.point_est(0);
    let out = sketch.output(100);
    for _ in 0..3 {
        assert_eq!(sketch.point_err(), err);
        assert_eq!(sketch.point_est(0), est);
        assert_eq!(sketch.output(100), out);
    }
}

#[test]
fn test_skewed_stream_guarantees() {
    for partitioning in [Partitioning::Three, Partitioning::Two] {
        for seed in 0..4 {
            let mut sketch = DimSum::builder(0.02, 0.5)
                .partitioning(partitioning)
                .seed(seed)
                .build()
                .unwrap();
            let stream = skewed_stream(seed, 20_000, 5_000);
            let exact = feed(&mut sketch, &stream);

            assert_upper_bounds(&sketch, &exact, 1_000);
            assert_that!(i64::from(sketch.point_est(0)), ge(exact.get(0)));
            let total: i64 = stream.iter().map(|&(_, w)| i64::from(w)).sum();
            assert_eq!(sketch.total_weight(), total);
            assert_that!(sketch.generations(), ge(1));
            sketch.check_integrity().unwrap();
        }
    }
}

#[test]
fn test_integrity_after_every_generation() {
    let mut sketch = DimSum::builder(0.1, 0.5).seed(11).build().unwrap();
    let mut generations = 0;
    for &(item, weight) in &skewed_stream(11, 3_000, 500) {
        sketch.update(item, weight);
        if sketch.generations() != generations {
            generations = sketch.generations();
            sketch.check_integrity().unwrap();
        }
    }
    assert_that!(generations, ge(10));
}

#[test]
fn test_explicit_hash_matches_default() {
    let stream = skewed_stream(5, 2_000, 300);
    let mut default = DimSum::new(0.05, 1.0);
    let mut explicit = DimSum::builder(0.05, 1.0)
        .hash(PairwiseHash::default())
        .build()
        .unwrap();
    feed(&mut default, &stream);
    feed(&mut explicit, &stream);
    assert_eq!(default.output(1), explicit.output(1));
    assert_eq!(default.point_err(), explicit.point_err());
}

#[test]
fn test_size_grows_with_precision() {
    let coarse = DimSum::new(0.1, 1.0);
    let fine = DimSum::new(0.01, 1.0);
    assert_that!(fine.size(), ge(coarse.size() * 5));

    let three = sketch(0.01, 1.0, Partitioning::Three);
    let two = sketch(0.01, 1.0, Partitioning::Two);
    assert_that!(three.size(), le(two.size()));
}

#[test]
fn test_saturating_counts() {
    let mut sketch = DimSum::new(0.1, 1.0);
    sketch.update(1, i32::MAX);
    sketch.update(1, i32::MAX);
    assert_eq!(sketch.point_est(1), i32::MAX);
    assert_eq!(sketch.total_weight(), 2 * i64::from(i32::MAX));
}

#[test]
fn test_invalid_arguments() {
    for (epsilon, gamma) in [
        (0.0, 1.0),
        (1.0, 1.0),
        (-0.5, 1.0),
        (f64::NAN, 1.0),
        (0.1, 0.0),
        (0.1, -1.0),
        (0.1, f64::INFINITY),
    ] {
        let err = DimSum::builder(epsilon, gamma).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    let mut sketch = DimSum::new(0.1, 1.0);
    let err = sketch.try_update(3, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_that!(err.context().len(), eq(2));
    assert!(sketch.try_update(3, -4).is_err());
    assert_eq!(sketch.point_est(3), 0);
    assert_eq!(sketch.total_weight(), 0);
}

#[test]
#[should_panic(expected = "epsilon must be in (0, 1)")]
fn test_new_panics_on_bad_epsilon() {
    DimSum::new(2.0, 1.0);
}

#[test]
#[should_panic(expected = "weight must be positive")]
fn test_update_panics_on_bad_weight() {
    DimSum::new(0.1, 1.0).update(1, 0);
}
