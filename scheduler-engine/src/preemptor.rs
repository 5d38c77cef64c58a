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

//! Preemptor (spec §4.6): periodically searches for a set of lower-tier
//! victims whose combined resources would satisfy a pending task that
//! `TaskScheduler` could not place on any held offer, and reserves that
//! victim set so a later preemptor pass doesn't target the same tasks
//! twice while the kill is still in flight.
//!
//! The search minimizes the victim count first, then the leftover
//! resources once the set is freed (spec §4.6: "minimizing `|V|` then
//! waste").

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use scheduler_core::clock::Clock;
use scheduler_core::config::PreemptorConfig;
use scheduler_core::error::Result;
use scheduler_core::model::{is_dedicated_to, HostAttributes, HostMode, ResourceRequest, Status, Task, TaskId};
use scheduler_core::traits::{Driver, Storage};

use crate::fsm::Command;
use crate::state_manager::StateManager;

#[derive(Debug, Clone)]
struct Reservation {
    host: String,
    victim_ids: Vec<TaskId>,
    expires_at_millis: u64,
}

/// Tracks in-flight preemptions and drives victims into `PREEMPTING`.
pub struct Preemptor<S, D> {
    storage: Arc<S>,
    state: Arc<StateManager<S, D>>,
    clock: Arc<dyn Clock>,
    config: PreemptorConfig,
    reservations: Mutex<HashMap<TaskId, Reservation>>,
}

impl<S: Storage, D: Driver> Preemptor<S, D> {
    pub fn new(storage: Arc<S>, state: Arc<StateManager<S, D>>, clock: Arc<dyn Clock>, config: PreemptorConfig) -> Self {
        Self {
            storage,
            state,
            clock,
            config,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// One preemptor pass: for each still-unplaced pending task, search for
    /// a victim set and reserve it if found. Returns the ids of pending
    /// tasks a reservation was created for this pass.
    pub async fn search_and_reserve(&self, starved: &[Task]) -> Result<Vec<TaskId>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        self.expire_stale_reservations();

        let (tasks_by_host, attributes_by_host) = self.build_snapshot()?;
        let already_targeted: std::collections::HashSet<TaskId> = self.reservations.lock().values().flat_map(|r| r.victim_ids.iter().cloned()).collect();

        let mut reserved_for = Vec::new();
        for task in starved {
            if reserved_for.len() >= self.config.reservation_max_batch_size {
                break;
            }
            if self.reservations.lock().contains_key(&task.id) {
                continue;
            }
            let Some((host, victims)) = find_victim_set(task, &tasks_by_host, &attributes_by_host, &already_targeted) else {
                continue;
            };

            let victim_ids: Vec<TaskId> = victims.iter().map(|v| v.id.clone()).collect();
            for victim in &victims {
                self.state.change_state(&victim.id, Some(victim.status), Command::ChangeState(Status::Preempting)).await?;
            }

            info!("reserved {} victim(s) on {host} to admit task {}", victim_ids.len(), task.id);
            self.reservations.lock().insert(
                task.id.clone(),
                Reservation {
                    host,
                    victim_ids,
                    expires_at_millis: self.clock.now_millis() + self.config.delay_ms,
                },
            );
            reserved_for.push(task.id.clone());
        }
        Ok(reserved_for)
    }

    /// Drop reservations whose grace period has elapsed without the
    /// victims' resources becoming available -- stale reservations must not
    /// permanently block those tasks from being considered again.
    fn expire_stale_reservations(&self) {
        let now = self.clock.now_millis();
        self.reservations.lock().retain(|_, r| r.expires_at_millis > now);
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().len()
    }

    /// The host reserved for `task_id`, if a preemption slot is currently
    /// held open for it (spec §4.5 step 2a: "if the task is reserved by a
    /// preemption slot, attempt that specific agent only").
    pub fn reserved_host(&self, task_id: &TaskId) -> Option<String> {
        self.reservations.lock().get(task_id).map(|r| r.host.clone())
    }

    /// Drop `task_id`'s reservation, whether the scheduler placed it on
    /// the reserved agent or the attempt failed (spec §4.6 step 5:
    /// "reservations are consumed by §4.5 or expire"). A reservation is
    /// single-use: once the scheduler has acted on it, it no longer
    /// guards anything.
    pub fn consume_reservation(&self, task_id: &TaskId) {
        self.reservations.lock().remove(task_id);
    }

    fn build_snapshot(&self) -> Result<(HashMap<String, Vec<Task>>, HashMap<String, HostAttributes>)> {
        self.storage.read(|snapshot| {
            let mut by_host: HashMap<String, Vec<Task>> = HashMap::new();
            for task in snapshot.tasks.query_by_status(&Status::active_stored()) {
                if let Some(assignment) = &task.assignment {
                    by_host.entry(assignment.agent_host.clone()).or_default().push(task);
                }
            }
            let attributes = snapshot.attributes.all().into_iter().map(|a| (a.host.clone(), a)).collect();
            Ok((by_host, attributes))
        })
    }
}

#[derive(Default, Clone, Copy)]
struct Freed {
    cpu_cores: f64,
    mem_mb: u64,
    disk_mb: u64,
}

impl Freed {
    fn add(&mut self, r: &ResourceRequest) {
        self.cpu_cores += r.cpu_cores;
        self.mem_mb += r.mem_mb;
        self.disk_mb += r.disk_mb;
    }

    fn satisfies(&self, r: &ResourceRequest) -> bool {
        self.cpu_cores >= r.cpu_cores && self.mem_mb >= r.mem_mb && self.disk_mb >= r.disk_mb
    }

    fn waste(&self, r: &ResourceRequest) -> f64 {
        (self.cpu_cores - r.cpu_cores).max(0.0) + (self.mem_mb.saturating_sub(r.mem_mb)) as f64 + (self.disk_mb.saturating_sub(r.disk_mb)) as f64
    }
}

/// Find the host and minimal-then-least-wasteful victim set that would
/// free enough resources for `task`, skipping hosts the task couldn't run
/// on at all (maintenance, dedicated-constraint mismatch) and tasks
/// already targeted by another reservation.
fn find_victim_set(task: &Task, tasks_by_host: &HashMap<String, Vec<Task>>, attributes_by_host: &HashMap<String, HostAttributes>, already_targeted: &std::collections::HashSet<TaskId>) -> Option<(String, Vec<Task>)> {
    let mut best: Option<(String, Vec<Task>, f64)> = None;

    // `tasks_by_host` is a `HashMap`; iterate hosts in a stable (lexical)
    // order so ties in `|V|` and waste break the same way on every run
    // (spec §4.6: "ties are broken by a stable agent ordering").
    let mut hosts: Vec<&String> = tasks_by_host.keys().collect();
    hosts.sort();

    for host in hosts {
        let tasks = &tasks_by_host[host];
        let empty_attrs;
        let host_attrs = match attributes_by_host.get(host) {
            Some(attrs) => attrs,
            None => {
                empty_attrs = HostAttributes::new(host.clone(), HostMode::None, Vec::new());
                &empty_attrs
            }
        };
        if host_attrs.mode != HostMode::None {
            continue;
        }
        if !is_dedicated_to(host_attrs, &task.job.role) {
            continue;
        }

        let mut candidates: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.status.is_active() && t.tier.preemptable_by(task.tier) && !already_targeted.contains(&t.id))
            .collect();
        // Prefer preempting the lowest tier first, and within a tier the
        // smallest task, to keep the victim set's resource overshoot small.
        candidates.sort_by(|a, b| a.tier.cmp(&b.tier).then(a.resources.cpu_cores.partial_cmp(&b.resources.cpu_cores).unwrap_or(std::cmp::Ordering::Equal)));

        let mut freed = Freed::default();
        let mut victims = Vec::new();
        for candidate in candidates {
            if freed.satisfies(&task.resources) {
                break;
            }
            freed.add(&candidate.resources);
            victims.push(candidate.clone());
        }

        if !freed.satisfies(&task.resources) {
            continue;
        }
        let waste = freed.waste(&task.resources);
        let better = match &best {
            None => true,
            Some((_, best_victims, best_waste)) => victims.len() < best_victims.len() || (victims.len() == best_victims.len() && waste < *best_waste),
        };
        if better {
            best = Some((host.clone(), victims, waste));
        }
    }

    best.map(|(host, victims, _)| (host, victims))
}
