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

//! Explicit wiring (spec §9 design note): constructs every component by
//! passing its collaborators in as constructor arguments, the way the
//! teacher wires `SchedulerState::new` up from a `SessionBuilder` and a
//! `TableProviderFactory` rather than resolving them from a container.
//!
//! `SchedulerCore::new` builds the offer manager, state manager, task
//! scheduler and preemptor, publishes `SchedulerActive`, and hands back a
//! handle whose `spawn_background_loops` starts the periodic scheduling,
//! preemption-search, offer-expiry and reconciliation passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};

use scheduler_core::clock::Clock;
use scheduler_core::config::SchedulerCoreConfig;
use scheduler_core::events::{Event, EventSink};
use scheduler_core::model::{FlapOracle, Status};
use scheduler_core::traits::{Driver, Storage};

use crate::fsm::RetryPolicy;
use crate::offer::OfferManager;
use crate::preemptor::Preemptor;
use crate::reconciliation::ReconciliationScheduler;
use crate::scheduler::TaskScheduler;
use crate::state_manager::StateManager;

/// Every component of THE CORE, wired together and ready to run.
pub struct SchedulerCore<S, D> {
    pub offers: Arc<OfferManager<D>>,
    pub state: Arc<StateManager<S, D>>,
    pub scheduler: Arc<TaskScheduler<S, D>>,
    pub preemptor: Arc<Preemptor<S, D>>,
    pub reconciliation: Arc<ReconciliationScheduler<S, D>>,
    storage: Arc<S>,
    config: SchedulerCoreConfig,
}

impl<S: Storage + 'static, D: Driver + 'static> SchedulerCore<S, D> {
    /// Construct every component from its collaborators. `retry_policy`
    /// and `flap_oracle` are optional overrides of the state manager's
    /// defaults (spec §9: dependencies are passed in, never looked up).
    pub fn new(
        storage: Arc<S>,
        driver: Arc<D>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        scheduler_host: impl Into<String>,
        config: SchedulerCoreConfig,
        retry_policy: Option<Box<dyn RetryPolicy>>,
        flap_oracle: Option<Box<dyn FlapOracle>>,
    ) -> Self {
        let offers = Arc::new(OfferManager::new(config.offer.clone(), config.ban.max_cache_size, config.ban.expire_after_ms, clock.clone(), driver.clone()));

        let mut state = StateManager::new(storage.clone(), driver.clone(), events.clone(), clock.clone(), scheduler_host, config.quota_enforced);
        if let Some(policy) = retry_policy {
            state = state.with_retry_policy(policy);
        }
        if let Some(oracle) = flap_oracle {
            state = state.with_flap_oracle(oracle);
        }
        let state = Arc::new(state);

        let preemptor = Arc::new(Preemptor::new(storage.clone(), state.clone(), clock.clone(), config.preemptor));
        let scheduler = Arc::new(TaskScheduler::new(storage.clone(), offers.clone(), state.clone(), preemptor.clone(), config.schedule));
        let reconciliation = Arc::new(ReconciliationScheduler::new(storage.clone(), driver, clock, config.reconciliation));

        events.publish(Event::SchedulerActive);

        Self { offers, state, scheduler, preemptor, reconciliation, storage, config }
    }

    /// Run one scheduling pass over every `PENDING` task. `THROTTLED`
    /// tasks are excluded: releasing a throttled task back to `PENDING`
    /// once its penalty elapses is the responsibility of an external
    /// timer collaborator (spec is silent on the release trigger; see
    /// DESIGN.md), not of this pass.
    pub async fn run_schedule_pass(&self) -> scheduler_core::error::Result<Vec<String>> {
        let pending = self.storage.read(|snapshot| {
            let statuses: HashSet<Status> = [Status::Pending].into_iter().collect();
            Ok(snapshot.tasks.query_by_status(&statuses))
        })?;
        self.scheduler.schedule(&pending).await
    }

    /// Run one preemptor pass over the tasks `run_schedule_pass` left
    /// unplaced.
    pub async fn run_preemptor_pass(&self, starved: &[scheduler_core::model::Task]) -> scheduler_core::error::Result<Vec<String>> {
        self.preemptor.search_and_reserve(starved).await
    }

    /// Spawn the periodic schedule, preemption-search and reconciliation
    /// loops on the current tokio runtime. Returns their join handles so
    /// the caller can track or abort them; offer expiry is left to the
    /// caller's driver-report loop since it depends on held-since
    /// timestamps the offer manager doesn't track on its own.
    pub fn spawn_background_loops(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let schedule_loop = {
            let this = self.clone();
            // Re-run a scheduling pass roughly as often as offers churn
            // through their minimum hold window -- no point polling faster
            // than offers can possibly change.
            let interval_ms = this.config.offer.min_hold_ms.max(1_000);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    ticker.tick().await;
                    if let Err(err) = this.run_schedule_pass().await {
                        error!("scheduling pass failed: {err}");
                    }
                }
            })
        };
        handles.push(schedule_loop);

        let preemptor_loop = {
            let this = self.clone();
            let interval_ms = this.config.preemptor.search_interval_ms.max(1);
            tokio::spawn(async move {
                if !this.config.preemptor.enabled {
                    return;
                }
                let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    ticker.tick().await;
                    let starved = match this.storage.read(|snapshot| {
                        let statuses: HashSet<Status> = [Status::Pending].into_iter().collect();
                        Ok(snapshot.tasks.query_by_status(&statuses))
                    }) {
                        Ok(tasks) => tasks,
                        Err(err) => {
                            warn!("preemptor snapshot read failed: {err}");
                            continue;
                        }
                    };
                    if let Err(err) = this.run_preemptor_pass(&starved).await {
                        error!("preemptor pass failed: {err}");
                    }
                }
            })
        };
        handles.push(preemptor_loop);

        let (explicit, implicit) = self.reconciliation.clone().spawn();
        handles.push(explicit);
        handles.push(implicit);

        handles
    }
}
