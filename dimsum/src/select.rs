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

//! Worst-case linear order statistic selection.
//!
//! This is the median-of-medians quickselect: the input is split into groups of five, the lower
//! median of each group is found with a partial selection sort, the median of those medians is
//! found recursively and used as the pivot of a three-way partition, and the search continues in
//! the side of the partition holding the requested rank.
//!
//! Unlike [`slice::select_nth_unstable`], the work done here has a proven worst-case bound
//! ([`select_work_bound`]) and can be metered: [`try_select_nth`] reports every unit of work to a
//! step callback, which may pause the caller or abort the selection. The heavy hitter sketches use
//! this to interleave the quantile computation with stream updates.
//!
//! # Examples
//!
//! ```
//! # use dimsum::select::select_nth;
//! let mut values = vec![9, 1, 8, 2, 7, 3];
//! assert_eq!(select_nth(&mut values, 2), 3);
//! assert!(values[..2].iter().all(|&v| v <= 3));
//! ```

use std::convert::Infallible;

const GROUP_SIZE: usize = 5;

/// Returns the value at position `k` of `values` in sorted order.
///
/// On return `values` is partitioned so that every element at an index below `k` is less than or
/// equal to the returned value.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
pub fn select_nth<T: Ord + Copy>(values: &mut [T], k: usize) -> T {
    select_nth_with_pivot(values, k, None)
}

/// Like [`select_nth`], but seeds the first partition with `pivot` when one is given.
///
/// A hint does not change the result, only the work done to reach it. Callers that know a good
/// split value (for example a previous quantile) save the median-of-medians pass at the top level.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
pub fn select_nth_with_pivot<T: Ord + Copy>(values: &mut [T], k: usize, pivot: Option<T>) -> T {
    let result: Result<T, Infallible> = try_select_nth(values, k, pivot, &mut || Ok(()));
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Metered selection.
///
/// `step` is called once for every group of five whose median is extracted and once for every
/// element visited by a partition pass. If it returns an error the selection stops and the error
/// is returned; `values` is then left in an unspecified order.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
pub fn try_select_nth<T, E, F>(
    values: &mut [T],
    k: usize,
    pivot: Option<T>,
    step: &mut F,
) -> Result<T, E>
where
    T: Ord + Copy,
    F: FnMut() -> Result<(), E>,
{
    assert!(
        k < values.len(),
        "k must be less than the number of values, got k = {k}, n = {}",
        values.len()
    );
    select_in(values, k, pivot, step)
}

/// Returns an upper bound on the number of `step` calls [`try_select_nth`] makes for `n` values.
///
/// The bound follows the recurrence `T(m) = ceil(m/5) + 2m + T(ceil(m/5)) + T(s(m))` where
/// `s(m) = min(m - 1, 7m/10 + 8)` bounds the side of the partition that is searched next. A pivot
/// hint adds one unrestricted partition of all `n` values in front.
pub fn select_work_bound(n: usize, hinted: bool) -> u64 {
    if n <= 2 {
        return 0;
    }
    let mut bound = vec![0u64; n + 1];
    for m in 3..=n {
        let groups = m.div_ceil(GROUP_SIZE);
        let side = (m - 1).min(7 * m / 10 + 8);
        bound[m] = (groups + 2 * m) as u64 + bound[groups] + bound[side];
    }
    if hinted {
        2 * n as u64 + bound[n]
    } else {
        bound[n]
    }
}

fn select_in<T, E, F>(values: &mut [T], k: usize, pivot: Option<T>, step: &mut F) -> Result<T, E>
where
    T: Ord + Copy,
    F: FnMut() -> Result<(), E>,
{
    let n = values.len();
    if n == 1 {
        return Ok(values[0]);
    }
    if n == 2 {
        if values[1] < values[0] {
            values.swap(0, 1);
        }
        return Ok(values[k]);
    }

    let pivot = match pivot {
        Some(pivot) => pivot,
        None => median_of_medians(values, step)?,
    };

    // everything below the pivot goes first
    let mut less = 0;
    for i in 0..n {
        step()?;
        if values[i] < pivot {
            values.swap(i, less);
            less += 1;
        }
    }
    // then the copies of the pivot
    let mut equal = less;
    for i in less..n {
        step()?;
        if values[i] == pivot {
            values.swap(i, equal);
            equal += 1;
        }
    }

    if k < less {
        select_in(&mut values[..less], k, None, step)
    } else if k >= equal {
        select_in(&mut values[equal..], k - equal, None, step)
    } else {
        Ok(pivot)
    }
}

/// Moves the lower median of every group of five to the front and selects their median.
fn median_of_medians<T, E, F>(values: &mut [T], step: &mut F) -> Result<T, E>
where
    T: Ord + Copy,
    F: FnMut() -> Result<(), E>,
{
    let n = values.len();
    let groups = n.div_ceil(GROUP_SIZE);
    for g in 0..groups {
        step()?;
        let start = g * GROUP_SIZE;
        let end = (start + GROUP_SIZE).min(n);
        let mid = lower_median_of_group(&mut values[start..end]);
        // slot g belongs to a group that has already been visited
        values.swap(g, start + mid);
    }
    select_in(&mut values[..groups], (groups - 1) / 2, None, step)
}

/// Selection-sorts the smallest half of a group (three of five) and returns the median index.
fn lower_median_of_group<T: Ord>(group: &mut [T]) -> usize {
    let mid = (group.len() - 1) / 2;
    for i in 0..=mid {
        let mut min = i;
        for j in (i + 1)..group.len() {
            if group[j] < group[min] {
                min = j;
            }
        }
        group.swap(i, min);
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_median_of_group() {
        let mut group = [5, 1, 4, 2, 3];
        let mid = lower_median_of_group(&mut group);
        assert_eq!(mid, 2);
        assert_eq!(&group[..3], &[1, 2, 3]);

        let mut pair = [9, 4];
        assert_eq!(lower_median_of_group(&mut pair), 0);
        assert_eq!(pair[0], 4);
    }

    #[test]
    fn test_base_cases() {
        assert_eq!(select_nth(&mut [42], 0), 42);
        let mut pair = [8, 3];
        assert_eq!(select_nth(&mut pair, 0), 3);
        assert_eq!(pair, [3, 8]);
        assert_eq!(select_nth(&mut [8, 3], 1), 8);
    }

    #[test]
    fn test_work_bound_is_monotone() {
        let mut last = 0;
        for n in 0..500 {
            let bound = select_work_bound(n, false);
            assert!(bound >= last, "bound decreased at n = {n}");
            last = bound;
        }
        assert!(select_work_bound(100, true) > select_work_bound(100, false));
    }
}
