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

//! Static ban cache (spec §4.4): "this offer was proven insufficient for
//! this task-group", expiring by time and by maximum capacity. Reads do
//! not need the offer manager's mutex (spec §4.4: "except the ban cache
//! which may serve reads without the mutex"), so it's backed by `dashmap`
//! rather than a lock the rest of `OfferManager` shares.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use scheduler_core::clock::Clock;
use scheduler_core::offer::StaticBanKey;

struct Entry {
    inserted_at_tick: u64,
    expires_at_millis: u64,
}

/// Bounded, approximately-LRU, time-expiring set of static bans.
///
/// "Approximate" per spec §4.4: instead of maintaining an exact LRU list
/// (which would require a second index under the same lock we're trying to
/// avoid taking for reads), eviction samples a handful of entries and
/// drops the stalest of the sample. This is the standard "sampled LRU"
/// trick used when a cache needs lock-free reads.
pub struct BanCache {
    entries: DashMap<StaticBanKey, Entry>,
    max_size: u64,
    expire_after_ms: u64,
    tick: AtomicU64,
    clock: Arc<dyn Clock>,
}

const EVICTION_SAMPLE: usize = 5;

impl BanCache {
    pub fn new(max_size: u64, expire_after_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
            expire_after_ms,
            tick: AtomicU64::new(0),
            clock,
        }
    }

    pub fn ban(&self, key: StaticBanKey) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let expires_at_millis = self.clock.now_millis() + self.expire_after_ms;
        self.entries.insert(key, Entry { inserted_at_tick: tick, expires_at_millis });
        self.evict_if_over_capacity();
    }

    pub fn is_banned(&self, key: &StaticBanKey) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at_millis > self.clock.now_millis() => true,
            Some(_) => {
                drop(self.entries.remove(key));
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_over_capacity(&self) {
        if (self.entries.len() as u64) <= self.max_size {
            return;
        }
        // Sample a handful of entries and evict the stalest (lowest
        // insertion tick) of the sample -- approximate LRU, O(1) amortized,
        // no global lock required.
        let mut sample: Vec<(StaticBanKey, u64)> = Vec::with_capacity(EVICTION_SAMPLE);
        for entry in self.entries.iter().take(EVICTION_SAMPLE) {
            sample.push((entry.key().clone(), entry.value().inserted_at_tick));
        }
        if let Some((stalest_key, _)) = sample.into_iter().min_by_key(|(_, tick)| *tick) {
            self.entries.remove(&stalest_key);
        }
    }
}
