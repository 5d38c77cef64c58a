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

//! Task scheduler (spec §4.5): matches `PENDING` tasks against held offers.
//! For each task it walks the offer manager's ordered candidate list,
//! vetoing (and statically banning) every offer the scheduling filter
//! rejects, and assigns the task to the first offer that fits.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use scheduler_core::config::ScheduleConfig;
use scheduler_core::error::Result;
use scheduler_core::model::{HostAttributes, HostMode, SnapshotLimitOracle, Task, TaskId};
use scheduler_core::offer::Offer;
use scheduler_core::traits::{Driver, Storage};

use crate::filter::{fit, FitOutcome};
use crate::offer::OfferManager;
use crate::preemptor::Preemptor;
use crate::state_manager::StateManager;

/// Ties the scheduling filter, the offer manager, the preemptor and the
/// state manager together into one scheduling pass (spec §4.5).
pub struct TaskScheduler<S, D> {
    storage: Arc<S>,
    offers: Arc<OfferManager<D>>,
    state: Arc<StateManager<S, D>>,
    preemptor: Arc<Preemptor<S, D>>,
    config: ScheduleConfig,
}

impl<S: Storage, D: Driver> TaskScheduler<S, D> {
    pub fn new(storage: Arc<S>, offers: Arc<OfferManager<D>>, state: Arc<StateManager<S, D>>, preemptor: Arc<Preemptor<S, D>>, config: ScheduleConfig) -> Self {
        Self { storage, offers, state, preemptor, config }
    }

    /// Attempt to place every task in `pending`, processed in caller-given
    /// order but chunked at the configured batch size so a single pass
    /// never holds the offer manager's attention indefinitely (spec §4.5:
    /// "tasks are scheduled in bounded batches").
    pub async fn schedule(&self, pending: &[Task]) -> Result<Vec<TaskId>> {
        let mut placed = Vec::new();
        let batch_size = self.config.batch_size.max(1);
        for batch in pending.chunks(batch_size) {
            for task in batch {
                if let Some(id) = self.schedule_one(task).await? {
                    placed.push(id);
                }
            }
        }
        if !placed.is_empty() {
            info!("scheduled {} of {} pending tasks this pass", placed.len(), pending.len());
        }
        Ok(placed)
    }

    async fn schedule_one(&self, task: &Task) -> Result<Option<TaskId>> {
        let group_key = task.resource_signature();
        let (attributes_by_host, limit_oracle) = self.build_snapshot()?;

        // spec §4.5 step 2a: a task holding a preemption reservation gets
        // exactly one attempt against that specific agent; success or
        // failure either way consumes the reservation (spec §4.6 step 5),
        // since it is single-use and a held-open slot must not linger
        // once the scheduler has acted on it.
        if let Some(host) = self.preemptor.reserved_host(&task.id) {
            let placed = self.try_host(task, &host, &group_key, &attributes_by_host, &limit_oracle).await?;
            self.preemptor.consume_reservation(&task.id);
            if placed.is_some() {
                return Ok(placed);
            }
        }

        for offer in self.offers.offers_for(&group_key) {
            let host_attrs = attributes_by_host.get(&offer.host).cloned().unwrap_or_else(|| HostAttributes::new(offer.host.clone(), HostMode::None, Vec::new()));
            if self.try_offer(task, &offer, &group_key, &host_attrs, &limit_oracle).await? {
                return Ok(Some(task.id.clone()));
            }
        }
        Ok(None)
    }

    /// Attempt to place `task` on `host` only, drawing candidates from the
    /// currently-held offers for that agent (spec §4.5 step 2a).
    async fn try_host(&self, task: &Task, host: &str, group_key: &str, attributes_by_host: &HashMap<String, HostAttributes>, limit_oracle: &SnapshotLimitOracle) -> Result<Option<TaskId>> {
        let host_attrs = attributes_by_host.get(host).cloned().unwrap_or_else(|| HostAttributes::new(host.to_string(), HostMode::None, Vec::new()));
        for offer in self.offers.offers_for(group_key) {
            if offer.host != host {
                continue;
            }
            if self.try_offer(task, &offer, group_key, &host_attrs, limit_oracle).await? {
                return Ok(Some(task.id.clone()));
            }
        }
        Ok(None)
    }

    /// Test `task` against a single offer, taking and assigning it on fit,
    /// banning it for `group_key` on veto.
    async fn try_offer(&self, task: &Task, offer: &Offer, group_key: &str, host_attrs: &HostAttributes, limit_oracle: &SnapshotLimitOracle) -> Result<bool> {
        match fit(task, &offer.resources, host_attrs, limit_oracle) {
            FitOutcome::Fit => {
                let Some(offer) = self.offers.take(&offer.offer_id) else {
                    // lost the race to another scheduling pass; caller
                    // tries the next candidate instead of failing the task
                    return Ok(false);
                };
                let ports = assign_named_ports(task, &offer);
                self.state.assign_task(&task.id, &offer.offer_id, offer.host.clone(), offer.agent_id.clone(), ports).await?;
                Ok(true)
            }
            FitOutcome::Veto(vetoes) => {
                debug!("offer {} vetoed for task {}: {:?}", offer.offer_id, task.id, vetoes);
                self.offers.ban_offer(&offer.offer_id, group_key);
                Ok(false)
            }
        }
    }

    fn build_snapshot(&self) -> Result<(HashMap<String, HostAttributes>, SnapshotLimitOracle)> {
        self.storage.read(|snapshot| {
            let attributes: HashMap<String, HostAttributes> = snapshot.attributes.all().into_iter().map(|a| (a.host.clone(), a)).collect();
            let active = snapshot.tasks.query_by_status(&scheduler_core::model::Status::active_stored());
            let oracle = SnapshotLimitOracle::build(&active, |host| attributes.get(host));
            Ok((attributes, oracle))
        })
    }
}

/// Bind the task's named ports to concrete numbers drawn from the offer's
/// advertised port ranges, in the order the ranges were advertised.
fn assign_named_ports(task: &Task, offer: &scheduler_core::offer::Offer) -> HashMap<String, u32> {
    let mut available = offer.resources.port_ranges.iter().flat_map(|r| r.begin..=r.end);
    task.resources
        .named_ports
        .iter()
        .filter_map(|name| available.next().map(|port| (name.clone(), port)))
        .collect()
}
