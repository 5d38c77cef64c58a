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

//! Offer manager (spec §4.4): the scheduler's ephemeral inventory of agent
//! resource offers. Offers arrive from the driver, are held for a jittered
//! minimum hold time, and are returned (declined) either when that timer
//! fires or when an incoming offer announces an imminent maintenance
//! window. A per-instance mutex guards the offer table; the static ban
//! cache is `dashmap`-backed and may be read without it (spec §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use scheduler_core::clock::Clock;
use scheduler_core::config::OfferConfig;
use scheduler_core::offer::{Offer, StaticBanKey};
use scheduler_core::traits::Driver;

use super::ban::BanCache;
use super::order;

struct Held {
    offer: Offer,
    arrival_index: usize,
    deadline_millis: u64,
}

/// In-memory offer inventory plus the static ban cache.
///
/// Grounded on the teacher's `SchedulerState` pattern of a single
/// `parking_lot::Mutex`-guarded table with explicit accessor methods
/// (`cluster/mod.rs`), adapted here to the offer lifecycle described in
/// spec §4.4.
pub struct OfferManager<D: Driver> {
    config: OfferConfig,
    clock: Arc<dyn Clock>,
    driver: Arc<D>,
    bans: BanCache,
    held: Mutex<HashMap<String, Held>>,
    arrival_counter: Mutex<usize>,
}

impl<D: Driver> OfferManager<D> {
    pub fn new(config: OfferConfig, ban_max_size: u64, ban_expire_after_ms: u64, clock: Arc<dyn Clock>, driver: Arc<D>) -> Self {
        Self {
            config,
            bans: BanCache::new(ban_max_size, ban_expire_after_ms, clock.clone()),
            clock,
            driver,
            held: Mutex::new(HashMap::new()),
            arrival_counter: Mutex::new(0),
        }
    }

    /// Record a freshly-arrived offer. If its unavailability window starts
    /// within the configured threshold, decline immediately instead of
    /// holding it (spec §4.4). Otherwise draws this offer's jittered hold
    /// deadline once, and cancels any other held offer from the same
    /// agent, replacing its return-timer with this one's (spec §4.4:
    /// "registers the offer, cancels any pending return-timer for its
    /// agent, and starts a new return-timer").
    pub async fn add_offer(&self, offer: Offer) {
        if let Some(window) = &offer.unavailability {
            if window.starts_within(self.clock.now_millis(), self.config.unavailability_threshold_ms) {
                self.driver.decline_offer(&offer.offer_id, 0).await;
                return;
            }
        }
        let arrival_index = {
            let mut counter = self.arrival_counter.lock();
            let index = *counter;
            *counter += 1;
            index
        };
        let deadline_millis = self.clock.now_millis() + self.draw_hold_duration_millis();
        let mut held = self.held.lock();
        held.retain(|_, h| h.offer.agent_id != offer.agent_id);
        held.insert(offer.offer_id.clone(), Held { offer, arrival_index, deadline_millis });
    }

    /// Drop a previously-held offer without declining it to the driver
    /// (used when the agent itself rescinds the offer).
    pub fn cancel_offer(&self, offer_id: &str) {
        self.held.lock().remove(offer_id);
    }

    /// Draw a fresh jittered hold duration: the configured minimum plus a
    /// random jitter, so a cluster-wide flood of arrivals doesn't return
    /// in lockstep (spec §4.4). Called exactly once per offer, at
    /// `add_offer` time -- the resulting deadline is then fixed for that
    /// offer's lifetime.
    fn draw_hold_duration_millis(&self) -> u64 {
        let jitter = if self.config.jitter_window_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..self.config.jitter_window_ms) };
        self.config.min_hold_ms + jitter
    }

    /// Decline every offer whose deadline, drawn once at `add_offer` time,
    /// has passed. Called periodically by the component that owns the
    /// manager's timer loop (spec §4.4: "offers are returned to the driver
    /// after a jittered minimum hold time").
    pub async fn expire_held_offers(&self) {
        let now = self.clock.now_millis();
        let expired: Vec<String> = {
            let held = self.held.lock();
            held.values().filter(|h| now >= h.deadline_millis).map(|h| h.offer.offer_id.clone()).collect()
        };
        for offer_id in expired {
            self.held.lock().remove(&offer_id);
            self.driver.decline_offer(&offer_id, self.config.min_hold_ms).await;
        }
    }

    pub fn ban_offer(&self, offer_id: &str, task_group_key: &str) {
        self.bans.ban(StaticBanKey::new(offer_id, task_group_key));
    }

    pub fn is_banned(&self, offer_id: &str, task_group_key: &str) -> bool {
        self.bans.is_banned(&StaticBanKey::new(offer_id, task_group_key))
    }

    /// Snapshot of currently-held offers, ordered per the configured
    /// policy, skipping offers banned for `task_group_key`.
    pub fn offers_for(&self, task_group_key: &str) -> Vec<Offer> {
        let held = self.held.lock();
        let mut candidates: Vec<&Held> = held
            .values()
            .filter(|h| !self.is_banned(&h.offer.offer_id, task_group_key))
            .collect();

        if self.config.order.0.first() == Some(&scheduler_core::offer::OrderCriterion::Random) {
            use rand::seq::SliceRandom;
            candidates.shuffle(&mut rand::thread_rng());
        }

        let arrival_index: HashMap<&str, usize> = held.values().map(|h| (h.offer.offer_id.as_str(), h.arrival_index)).collect();
        let cmp = order::comparator(&self.config.order, &|id| *arrival_index.get(id).unwrap_or(&usize::MAX));
        candidates.sort_by(|a, b| cmp(&a.offer, &b.offer));
        candidates.into_iter().map(|h| h.offer.clone()).collect()
    }

    /// Remove and return the first offer that satisfies `predicate`,
    /// consuming it from the held table (spec §4.4 `launchFirst`).
    pub fn take_first(&self, task_group_key: &str, predicate: impl Fn(&Offer) -> bool) -> Option<Offer> {
        let ordered = self.offers_for(task_group_key);
        let picked = ordered.into_iter().find(|o| predicate(o))?;
        self.held.lock().remove(&picked.offer_id);
        Some(picked)
    }

    /// Remove a specific offer from the held table by id, e.g. once the
    /// task scheduler has decided to launch onto it. Returns `None` if it
    /// was already taken or expired.
    pub fn take(&self, offer_id: &str) -> Option<Offer> {
        self.held.lock().remove(offer_id).map(|h| h.offer)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use scheduler_core::clock::fake::FakeClock;
    use scheduler_core::model::Task;
    use scheduler_core::offer::{OfferResources, PortRange};

    struct NoopDriver {
        declined: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Driver for NoopDriver {
        async fn launch_task(&self, _offer_id: &String, _task: &Task) {}
        async fn kill_task(&self, _task_id: &String) {}
        async fn decline_offer(&self, offer_id: &String, _filter_duration_ms: u64) {
            self.declined.lock().push(offer_id.clone());
        }
        async fn reconcile_tasks(&self, _statuses: Vec<Task>) {}
    }

    fn offer(id: &str, cpu: f64) -> Offer {
        offer_from_agent(id, id, cpu)
    }

    fn offer_from_agent(id: &str, agent_id: &str, cpu: f64) -> Offer {
        Offer {
            offer_id: id.to_string(),
            agent_id: agent_id.to_string(),
            host: format!("host-{agent_id}"),
            resources: OfferResources {
                cpu_cores: cpu,
                mem_mb: 4096,
                disk_mb: 4096,
                port_ranges: vec![PortRange { begin: 31000, end: 31010 }],
            },
            unavailability: None,
            revocable: false,
        }
    }

    fn manager() -> (OfferManager<NoopDriver>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(0));
        let driver = Arc::new(NoopDriver { declined: Mutex::new(Vec::new()) });
        (OfferManager::new(OfferConfig::default(), 100, 120_000, clock.clone(), driver), clock)
    }

    #[tokio::test]
    async fn add_and_take_first_round_trips() {
        let (mgr, _clock) = manager();
        mgr.add_offer(offer("o1", 4.0)).await;
        assert_eq!(mgr.held_count(), 1);
        let taken = mgr.take_first("group", |o| o.resources.cpu_cores >= 2.0);
        assert!(taken.is_some());
        assert_eq!(mgr.held_count(), 0);
    }

    #[tokio::test]
    async fn banned_offer_is_excluded_from_candidates() {
        let (mgr, _clock) = manager();
        mgr.add_offer(offer("o1", 4.0)).await;
        mgr.ban_offer("o1", "group");
        assert!(mgr.is_banned("o1", "group"));
        assert!(mgr.take_first("group", |_| true).is_none());
        // a different task group is unaffected by the ban
        assert!(mgr.take_first("other-group", |_| true).is_some());
    }

    #[tokio::test]
    async fn unavailability_within_threshold_declines_immediately() {
        let (mgr, _clock) = manager();
        let mut o = offer("o1", 4.0);
        o.unavailability = Some(scheduler_core::offer::UnavailabilityWindow { start_millis: 1_000, duration_millis: 60_000 });
        mgr.add_offer(o).await;
        assert_eq!(mgr.held_count(), 0);
    }

    #[tokio::test]
    async fn cancel_offer_removes_without_declining() {
        let (mgr, _clock) = manager();
        mgr.add_offer(offer("o1", 4.0)).await;
        mgr.cancel_offer("o1");
        assert_eq!(mgr.held_count(), 0);
    }

    #[tokio::test]
    async fn new_offer_from_same_agent_cancels_the_prior_one() {
        let (mgr, _clock) = manager();
        mgr.add_offer(offer_from_agent("o1", "agent-1", 4.0)).await;
        mgr.add_offer(offer_from_agent("o2", "agent-1", 8.0)).await;
        assert_eq!(mgr.held_count(), 1);
        assert!(mgr.take_first("group", |o| o.offer_id == "o1").is_none());
        assert!(mgr.take_first("group", |o| o.offer_id == "o2").is_some());
    }

    #[tokio::test]
    async fn expiry_deadline_is_fixed_at_add_offer_time() {
        let (mgr, clock) = manager();
        mgr.add_offer(offer("o1", 4.0)).await;
        // advance past min_hold_ms + jitter_window_ms, the widest possible
        // deadline drawn at insertion
        clock.advance(OfferConfig::default().min_hold_ms + OfferConfig::default().jitter_window_ms);
        mgr.expire_held_offers().await;
        assert_eq!(mgr.held_count(), 0);
    }
}
