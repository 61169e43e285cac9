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

//! Fixed-capacity counter arena with hash-chained lookup.
//!
//! Counters live in a boxed arena that is never resized. Every occupied counter is threaded onto
//! the doubly linked chain of its bucket through arena indices, which gives constant time unlink
//! and relink without walking the chain. Slots are handed out in order by [`CounterTable::insert`]
//! and only reclaimed when the whole table is cleared, except that maintenance may vacate and
//! refill individual slots through [`CounterTable::remove`] and [`CounterTable::swap_slots`].

use std::mem;
use std::ops::Range;

use crate::error::Error;
use crate::hash::PairwiseHash;

/// Number of buckets per counter slot. Keeps the expected chain length below one.
pub(super) const HASH_MULTIPLIER: usize = 3;

/// One tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Counter {
    /// `None` marks a vacant slot.
    item: Option<u32>,
    count: i32,
    bucket: u32,
    prev: Option<u32>,
    next: Option<u32>,
}

impl Counter {
    const VACANT: Counter = Counter {
        item: None,
        count: 0,
        bucket: 0,
        prev: None,
        next: None,
    };

    pub fn item(&self) -> Option<u32> {
        self.item
    }

    /// Count of the item; zero for a vacant slot.
    pub fn count(&self) -> i32 {
        self.count
    }
}

/// Arena of counters plus the bucket array of chain heads.
#[derive(Debug, Clone)]
pub(super) struct CounterTable {
    counters: Box<[Counter]>,
    buckets: Box<[Option<u32>]>,
    len: usize,
    hasher: PairwiseHash,
}

impl CounterTable {
    /// Creates an empty table holding up to `capacity` counters.
    pub fn new(capacity: usize, hasher: PairwiseHash) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        let bucket_count = capacity * HASH_MULTIPLIER;
        assert!(
            bucket_count <= u32::MAX as usize,
            "capacity {capacity} too large for 32-bit counter links"
        );
        Self {
            counters: vec![Counter::VACANT; capacity].into_boxed_slice(),
            buckets: vec![None; bucket_count].into_boxed_slice(),
            len: 0,
            hasher,
        }
    }

    /// Returns the number of arena slots.
    pub fn capacity(&self) -> usize {
        self.counters.len()
    }

    /// Returns true if no slot was claimed by [`CounterTable::insert`] since the last clear.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of occupied slots.
    pub fn num_occupied(&self) -> usize {
        self.counters.iter().filter(|c| c.item.is_some()).count()
    }

    /// Returns the counter stored in `slot`.
    pub fn counter(&self, slot: usize) -> &Counter {
        &self.counters[slot]
    }

    /// Returns the slot holding `item`, if any.
    pub fn find(&self, item: u32) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(item)];
        while let Some(slot) = cursor {
            let counter = &self.counters[slot as usize];
            if counter.item == Some(item) {
                return Some(slot as usize);
            }
            cursor = counter.next;
        }
        None
    }

    /// Returns the count of `item`, if it is stored here.
    pub fn get(&self, item: u32) -> Option<i32> {
        self.find(item).map(|slot| self.counters[slot].count)
    }

    /// Adds `weight` to the counter in `slot`.
    pub fn add_count(&mut self, slot: usize, weight: i32) {
        let counter = &mut self.counters[slot];
        counter.count = counter.count.saturating_add(weight);
    }

    /// Claims the next free slot for `item` and puts it at the head of its chain.
    ///
    /// # Panics
    ///
    /// Panics if the table is full. Callers must make room through maintenance first.
    pub fn insert(&mut self, item: u32, count: i32) -> usize {
        assert!(
            self.len < self.counters.len(),
            "insert into a full table: capacity = {}, item = {item}",
            self.counters.len()
        );
        let slot = self.len;
        self.len += 1;
        let counter = &mut self.counters[slot];
        counter.item = Some(item);
        counter.count = count;
        self.link(slot);
        slot
    }

    /// Detaches the counter in `slot` from its chain, leaving both links empty.
    ///
    /// Every link touched is validated before anything is written, so a corrupted chain is
    /// reported without being made worse.
    pub fn unlink(&mut self, slot: usize) -> Result<(), Error> {
        let Counter {
            item,
            bucket,
            prev,
            next,
            ..
        } = self.counters[slot];
        let slot_link = Some(slot as u32);
        let corrupted = |message: &str| {
            Error::corrupted_table(message)
                .with_context("slot", slot)
                .with_context("item", format!("{item:?}"))
                .with_context("bucket", bucket)
        };

        if item.is_none() {
            return Err(corrupted("unlinking a vacant slot"));
        }
        match prev {
            None if self.buckets[bucket as usize] != slot_link => {
                return Err(corrupted("bucket head does not match the counter"));
            }
            Some(p) if self.counters[p as usize].next != slot_link => {
                return Err(corrupted("previous counter does not link to the counter"));
            }
            _ => {}
        }
        if let Some(n) = next {
            if self.counters[n as usize].prev != slot_link {
                return Err(corrupted("next counter does not link back to the counter"));
            }
        }

        match prev {
            None => self.buckets[bucket as usize] = next,
            Some(p) => self.counters[p as usize].next = next,
        }
        if let Some(n) = next {
            self.counters[n as usize].prev = prev;
        }
        let counter = &mut self.counters[slot];
        counter.prev = None;
        counter.next = None;
        Ok(())
    }

    /// Unlinks the counter in `slot` and marks the slot vacant.
    pub fn remove(&mut self, slot: usize) -> Result<(), Error> {
        self.unlink(slot)?;
        self.counters[slot] = Counter::VACANT;
        Ok(())
    }

    /// Exchanges the contents of slot `i` of `left` with slot `j` of `right`.
    ///
    /// Occupied counters are unlinked from their old chains, and after the exchange each one is
    /// rehashed for the table it now lives in and linked at the head of its new chain. Either side
    /// may be vacant.
    pub fn swap_slots(
        left: &mut CounterTable,
        i: usize,
        right: &mut CounterTable,
        j: usize,
    ) -> Result<(), Error> {
        if left.counters[i].item.is_some() {
            left.unlink(i)?;
        }
        if right.counters[j].item.is_some() {
            right.unlink(j)?;
        }
        let a = &mut left.counters[i];
        let b = &mut right.counters[j];
        mem::swap(&mut a.item, &mut b.item);
        mem::swap(&mut a.count, &mut b.count);
        if left.counters[i].item.is_some() {
            left.link(i);
        } else {
            left.counters[i] = Counter::VACANT;
        }
        if right.counters[j].item.is_some() {
            right.link(j);
        } else {
            right.counters[j] = Counter::VACANT;
        }
        Ok(())
    }

    /// Resets a range of chain heads.
    pub fn clear_buckets(&mut self, range: Range<usize>) {
        self.buckets[range].fill(None);
    }

    /// Vacates a range of arena slots without touching the chains.
    pub fn clear_slots(&mut self, range: Range<usize>) {
        self.counters[range].fill(Counter::VACANT);
    }

    /// Marks the table empty once every bucket and slot has been cleared.
    pub fn finish_clear(&mut self) {
        debug_assert!(self.buckets.iter().all(Option::is_none));
        debug_assert!(self.counters.iter().all(|c| c.item.is_none()));
        self.len = 0;
    }

    /// Iterates over occupied slots as `(slot, item, count)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32, i32)> + '_ {
        self.counters
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.item.map(|item| (slot, item, c.count)))
    }

    /// Walks every chain and checks that it agrees with the arena.
    ///
    /// Each occupied counter must be reachable from exactly one bucket, store that bucket's index,
    /// hash to it, and have a `prev` link equal to its predecessor in the chain.
    pub fn check_chains(&self) -> Result<(), Error> {
        let mut reached = vec![false; self.counters.len()];
        for (bucket, head) in self.buckets.iter().enumerate() {
            let mut prev = None;
            let mut cursor = *head;
            while let Some(slot) = cursor {
                let counter = &self.counters[slot as usize];
                let corrupted = |message: &str| {
                    Error::corrupted_table(message)
                        .with_context("slot", slot)
                        .with_context("item", format!("{:?}", counter.item))
                        .with_context("bucket", bucket)
                };
                let Some(item) = counter.item else {
                    return Err(corrupted("vacant slot reachable from a chain"));
                };
                if reached[slot as usize] {
                    return Err(corrupted("counter reachable twice"));
                }
                if counter.bucket as usize != bucket || self.bucket_of(item) != bucket {
                    return Err(corrupted("counter stored in the wrong bucket"));
                }
                if counter.prev != prev {
                    return Err(corrupted("previous link does not match the chain"));
                }
                reached[slot as usize] = true;
                prev = cursor;
                cursor = counter.next;
            }
        }
        for (slot, counter) in self.counters.iter().enumerate() {
            if counter.item.is_some() && !reached[slot] {
                return Err(Error::corrupted_table("counter missing from its chain")
                    .with_context("slot", slot)
                    .with_context("item", format!("{:?}", counter.item)));
            }
        }
        Ok(())
    }

    /// Returns the heap footprint of the arena and the bucket array in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.counters.len() * mem::size_of::<Counter>()
            + self.buckets.len() * mem::size_of::<Option<u32>>()
    }

    fn bucket_of(&self, item: u32) -> usize {
        self.hasher.hash(item) as usize % self.buckets.len()
    }

    /// Prepends the occupied counter in `slot` to the chain of its bucket.
    fn link(&mut self, slot: usize) {
        let Some(item) = self.counters[slot].item else {
            unreachable!("linking a vacant slot {slot}");
        };
        let bucket = self.bucket_of(item);
        let head = self.buckets[bucket];
        if let Some(h) = head {
            self.counters[h as usize].prev = Some(slot as u32);
        }
        let counter = &mut self.counters[slot];
        counter.bucket = bucket as u32;
        counter.prev = None;
        counter.next = head;
        self.buckets[bucket] = Some(slot as u32);
    }
}
