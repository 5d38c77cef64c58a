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

use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Abstracts time for every time-dependent collaborator (offer return
/// timers, ban expiry, preemption reservations) so tests can advance time
/// deterministically, per spec §9.
///
/// `now_millis` gives wall-clock time for event timestamps; `monotonic`
/// gives an `Instant`-like value for duration arithmetic (cache expiry,
/// hold deadlines) that must never go backwards even if the wall clock is
/// adjusted.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> u64;
    fn monotonic(&self) -> Instant;
}

/// Production clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Deterministic clock for tests: `now_millis` is an explicit counter,
    /// `monotonic` is derived from a fixed base `Instant` plus the same
    /// counter, so advancing one advances the other in lockstep.
    #[derive(Debug, Clone)]
    pub struct FakeClock {
        inner: Arc<Mutex<FakeClockState>>,
    }

    #[derive(Debug)]
    struct FakeClockState {
        millis: u64,
        base: Instant,
    }

    impl FakeClock {
        pub fn new(start_millis: u64) -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeClockState {
                    millis: start_millis,
                    base: Instant::now(),
                })),
            }
        }

        pub fn advance(&self, millis: u64) {
            self.inner.lock().millis += millis;
        }

        pub fn set(&self, millis: u64) {
            self.inner.lock().millis = millis;
        }
    }

    impl Default for FakeClock {
        fn default() -> Self {
            Self::new(0)
        }
    }

    impl Clock for FakeClock {
        fn now_millis(&self) -> u64 {
            self.inner.lock().millis
        }

        fn monotonic(&self) -> Instant {
            let state = self.inner.lock();
            state.base + std::time::Duration::from_millis(state.millis)
        }
    }
}
