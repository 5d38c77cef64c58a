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

//! State manager (spec §4.3): the sole caller of `fsm::transition`, and the
//! only component that touches storage or the driver directly. Every
//! public method runs inside a single `Storage::write` transaction and
//! publishes its events only after that transaction commits (spec §5:
//! "events published by one transaction are delivered in commit order").

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use uuid::Uuid;

use scheduler_core::clock::Clock;
use scheduler_core::error::{Error, Result};
use scheduler_core::events::{Event, EventSink};
use scheduler_core::model::{Constraint, FlapOracle, InstanceIds, JobKey, NoFlapOracle, ResourceRequest, Status, Task, TaskId, Tier, TransitionEvent};
use scheduler_core::traits::{Driver, Storage, Transaction};

use crate::fsm::{self, Command, MaxFailuresRetryPolicy, Outcome, RetryPolicy, SideEffectKind};

/// Owns the transactional task lifecycle operations described in spec §4.3.
pub struct StateManager<S, D> {
    storage: Arc<S>,
    driver: Arc<D>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    retry_policy: Box<dyn RetryPolicy>,
    flap_oracle: Box<dyn FlapOracle>,
    scheduler_host: String,
    quota_enforced: bool,
}

impl<S: Storage, D: Driver> StateManager<S, D> {
    pub fn new(storage: Arc<S>, driver: Arc<D>, events: Arc<dyn EventSink>, clock: Arc<dyn Clock>, scheduler_host: impl Into<String>, quota_enforced: bool) -> Self {
        Self {
            storage,
            driver,
            events,
            clock,
            retry_policy: Box::new(MaxFailuresRetryPolicy::default()),
            flap_oracle: Box::new(NoFlapOracle),
            scheduler_host: scheduler_host.into(),
            quota_enforced,
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Box::new(policy);
        self
    }

    pub fn with_flap_oracle(mut self, oracle: impl FlapOracle + 'static) -> Self {
        self.flap_oracle = Box::new(oracle);
        self
    }

    /// Insert `PENDING` tasks for each requested instance of `job` (spec
    /// §4.3 `insertPending`). Any instance already holding an active task
    /// aborts the whole batch with `Error::Conflict`; so does a quota
    /// breach when enforcement is configured (SPEC_FULL.md supplement 2).
    pub fn insert_pending(&self, job: JobKey, instances: InstanceIds, tier: Tier, resources: ResourceRequest, constraints: Vec<Constraint>) -> Result<Vec<TaskId>> {
        let now = self.clock.now_millis();
        let scheduler_host = self.scheduler_host.clone();
        let quota_enforced = self.quota_enforced;

        let (ids, inserted_events) = self.storage.write(|txn| {
            for instance in &instances {
                if txn.tasks.get_active_by_instance(&job, *instance).is_some() {
                    return Err(Error::conflict(format!("instance {instance} of {job} already has an active task")));
                }
            }

            if quota_enforced {
                check_quota(txn, &job.role, &resources, instances.len() as u64)?;
            }

            let mut ids = Vec::with_capacity(instances.len());
            let mut events = Vec::with_capacity(instances.len());
            for instance in instances {
                let id = Uuid::new_v4().to_string();
                let mut task = Task::new(id.clone(), job.clone(), instance, tier, resources.clone());
                task.constraints = constraints.clone();
                task.status = Status::Pending;
                task.events.push(TransitionEvent {
                    timestamp_millis: now,
                    status: Status::Pending,
                    message: None,
                    scheduler_host: scheduler_host.clone(),
                });
                events.push(Event::TaskStateChange { task: task.clone(), previous_state: Status::Init });
                txn.tasks.save(task);
                ids.push(id);
            }
            Ok((ids, events))
        })?;

        self.events.publish_all(inserted_events);
        Ok(ids)
    }

    /// Drive `task_id` through `command`, CAS-guarded by `expected_prior` if
    /// given (spec §4.3 `changeState`). Applies the FSM's side effects
    /// under the same write transaction, then publishes events in commit
    /// order.
    pub async fn change_state(&self, task_id: &TaskId, expected_prior: Option<Status>, command: Command) -> Result<Outcome> {
        let now = self.clock.now_millis();
        let scheduler_host = self.scheduler_host.clone();
        let retry_policy = self.retry_policy.as_ref();
        let flap_oracle = self.flap_oracle.as_ref();

        let (outcome, events, kills) = self.storage.write(|txn| {
            let Some(task) = txn.tasks.get(task_id) else {
                return Ok((Outcome::InvalidCas, Vec::new(), Vec::new()));
            };

            let result = fsm::transition(&task, expected_prior, command.clone(), retry_policy, flap_oracle);
            if result.outcome != Outcome::Success {
                if result.outcome == Outcome::Illegal {
                    warn!("illegal transition for task {task_id}: {:?}", result.message);
                }
                return Ok((result.outcome, Vec::new(), Vec::new()));
            }

            let (events, kills, _final_task) = apply_side_effects(txn, task, &result, now, &scheduler_host);
            Ok((Outcome::Success, events, kills))
        })?;

        for killed_id in &kills {
            self.driver.kill_task(killed_id).await;
        }
        self.events.publish_all(events);
        Ok(outcome)
    }

    /// Assign `task_id` onto the agent identified by `agent_host`/
    /// `agent_id`, recording its placement and driving the FSM from
    /// `PENDING` to `ASSIGNED` in the same transaction (spec §4.3
    /// `assignTask`). On success, calls the driver to actually launch the
    /// task against `offer_id`. The task scheduler calls this once `fit()`
    /// reports no vetoes for the pairing.
    ///
    /// `assignTask` must produce a single `ASSIGNED` transition (spec
    /// §4.3); a task racing out of `PENDING` between `fit()` and this call
    /// is a programming error, not a recoverable outcome, so anything
    /// other than `SUCCESS` is raised as `Error::Internal` (spec §7)
    /// instead of being handed back to the caller to ignore.
    pub async fn assign_task(
        &self,
        task_id: &TaskId,
        offer_id: &str,
        agent_host: impl Into<String>,
        agent_id: impl Into<String>,
        assigned_ports: std::collections::HashMap<String, u32>,
    ) -> Result<()> {
        let now = self.clock.now_millis();
        let scheduler_host = self.scheduler_host.clone();
        let retry_policy = self.retry_policy.as_ref();
        let flap_oracle = self.flap_oracle.as_ref();
        let agent_host = agent_host.into();
        let agent_id = agent_id.into();

        let (events, launched) = self.storage.write(|txn| {
            let Some(mut task) = txn.tasks.get(task_id) else {
                return Err(Error::internal(format!("assignTask: task {task_id} vanished before assignment")));
            };

            let prior = task.status;
            let result = fsm::transition(&task, Some(prior), Command::ChangeState(Status::Assigned), retry_policy, flap_oracle);
            if result.outcome != Outcome::Success {
                return Err(Error::internal(format!("assignTask: expected a single ASSIGNED transition for task {task_id} from {prior:?}, got {:?}", result.outcome)));
            }

            task.assignment = Some(scheduler_core::model::Assignment { agent_host, agent_id, assigned_ports });
            let (events, _kills, final_task) = apply_side_effects(txn, task, &result, now, &scheduler_host);
            Ok((events, final_task))
        })?;

        self.events.publish_all(events);
        self.driver.launch_task(&offer_id.to_string(), &launched).await;
        Ok(())
    }

    /// Remove tasks outright, bypassing the FSM (spec §4.3 `deleteTasks`,
    /// used for operator-forced cleanup of terminal or orphaned records).
    pub fn delete_tasks(&self, ids: &[TaskId]) -> Result<()> {
        let deleted = self.storage.write(|txn| {
            let mut deleted = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(task) = txn.tasks.get(id) {
                    txn.tasks.delete(id);
                    deleted.push(task);
                }
            }
            Ok(deleted)
        })?;
        if !deleted.is_empty() {
            self.events.publish(Event::TasksDeleted { tasks: deleted });
        }
        Ok(())
    }
}

fn check_quota(txn: &mut Transaction<'_>, role: &str, resources: &ResourceRequest, count: u64) -> Result<()> {
    let Some(limit) = txn.quotas.get(role) else {
        return Ok(());
    };

    let mut used = scheduler_core::quota::QuotaAggregate::default();
    for task in txn.tasks.query_by_status(&Status::active_stored()) {
        if task.job.role == role {
            used.add(&task.resources);
        }
    }

    for _ in 0..count {
        if !limit.fits(&used, resources) {
            return Err(Error::conflict(format!("role {role} would exceed its configured quota")));
        }
        used.add(resources);
    }
    Ok(())
}

/// Apply a successful `TransitionResult`'s side effects, in their already-
/// canonical order, against `task` under the live transaction. Returns the
/// events to publish after commit, the task ids the caller must ask the
/// driver to kill, and the task's final in-memory state.
fn apply_side_effects(txn: &mut Transaction<'_>, mut task: Task, result: &fsm::TransitionResult, now: u64, scheduler_host: &str) -> (Vec<Event>, Vec<TaskId>, Task) {
    let mut events = Vec::new();
    let mut kills = Vec::new();
    let previous_state = task.status;

    for effect in &result.side_effects {
        match effect {
            SideEffectKind::IncrementFailures => task.failure_count += 1,
            SideEffectKind::Kill => kills.push(task.id.clone()),
            SideEffectKind::TransitionToLost => {
                debug!("task {} command superseded by partition timeout, declaring LOST", task.id);
            }
            SideEffectKind::Reschedule => {
                let successor_status = result.reschedule_as.unwrap_or(Status::Pending);
                let mut successor = Task::new(Uuid::new_v4().to_string(), task.job.clone(), task.instance, task.tier, task.resources.clone());
                successor.constraints = task.constraints.clone();
                successor.status = successor_status;
                successor.ancestor_id = Some(task.id.clone());
                successor.events.push(TransitionEvent {
                    timestamp_millis: now,
                    status: successor_status,
                    message: result.message.clone(),
                    scheduler_host: scheduler_host.to_string(),
                });
                events.push(Event::TaskStateChange {
                    task: successor.clone(),
                    previous_state: Status::Init,
                });
                txn.tasks.save(successor);
            }
            SideEffectKind::SaveState => {
                let target = result.target_status.expect("Success outcome always carries a target status");
                task.status = target;
                let event = TransitionEvent {
                    timestamp_millis: now,
                    status: target,
                    message: result.message.clone(),
                    scheduler_host: scheduler_host.to_string(),
                };
                if target == Status::Partitioned {
                    fsm::append_partitioned_event(&mut task.events, event);
                } else {
                    task.events.push(event);
                }
                events.push(Event::TaskStateChange { task: task.clone(), previous_state });
                txn.tasks.save(task.clone());
            }
            SideEffectKind::Delete => {
                txn.tasks.delete(&task.id);
                events.push(Event::TasksDeleted { tasks: vec![task.clone()] });
            }
        }
    }

    (events, kills, task)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use scheduler_core::clock::fake::FakeClock;
    use scheduler_core::events::RecordingEventSink;
    use scheduler_core::model::{HostAttributes, JobKey, ResourceRequest};
    use scheduler_core::quota::{QuotaAggregate, QuotaByRole};
    use scheduler_core::traits::{AttributeStore, QuotaStore, SchedulerStore, Snapshot};

    #[derive(Default)]
    struct MemTasks(HashMap<TaskId, Task>);
    impl scheduler_core::traits::TaskStore for MemTasks {
        fn get(&self, id: &TaskId) -> Option<Task> {
            self.0.get(id).cloned()
        }
        fn get_active_by_instance(&self, job: &JobKey, instance: u32) -> Option<Task> {
            self.0.values().find(|t| &t.job == job && t.instance == instance && t.status.is_active()).cloned()
        }
        fn query_by_job(&self, job: &JobKey) -> Vec<Task> {
            self.0.values().filter(|t| &t.job == job).cloned().collect()
        }
        fn query_by_status(&self, statuses: &HashSet<Status>) -> Vec<Task> {
            self.0.values().filter(|t| statuses.contains(&t.status)).cloned().collect()
        }
        fn query_by_host(&self, host: &str) -> Vec<Task> {
            self.0.values().filter(|t| t.assignment.as_ref().map(|a| a.agent_host == host).unwrap_or(false)).cloned().collect()
        }
        fn query_slave_assigned(&self, statuses: &HashSet<Status>) -> Vec<Task> {
            self.0.values().filter(|t| t.assignment.is_some() && statuses.contains(&t.status)).cloned().collect()
        }
        fn save(&mut self, task: Task) {
            self.0.insert(task.id.clone(), task);
        }
        fn delete(&mut self, id: &TaskId) {
            self.0.remove(id);
        }
    }

    #[derive(Default)]
    struct MemAttributes(HashMap<String, HostAttributes>);
    impl AttributeStore for MemAttributes {
        fn get(&self, host: &str) -> Option<HostAttributes> {
            self.0.get(host).cloned()
        }
        fn save(&mut self, attributes: HostAttributes) {
            self.0.insert(attributes.host.clone(), attributes);
        }
        fn all(&self) -> Vec<HostAttributes> {
            self.0.values().cloned().collect()
        }
    }

    #[derive(Default)]
    struct MemQuotas(QuotaByRole);
    impl QuotaStore for MemQuotas {
        fn get(&self, role: &str) -> Option<QuotaAggregate> {
            self.0.get(role).cloned()
        }
        fn upsert(&mut self, role: &str, quota: QuotaAggregate) {
            self.0.insert(role.to_string(), quota);
        }
        fn all(&self) -> QuotaByRole {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MemScheduler(Option<String>);
    impl SchedulerStore for MemScheduler {
        fn get(&self) -> Option<String> {
            self.0.clone()
        }
        fn set(&mut self, framework_id: String) {
            self.0 = Some(framework_id);
        }
    }

    #[derive(Default)]
    struct MemStorage {
        inner: Mutex<(MemTasks, MemAttributes, MemQuotas, MemScheduler)>,
    }

    impl Storage for MemStorage {
        fn write<R>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<R>) -> Result<R> {
            let mut guard = self.inner.lock();
            let (tasks, attributes, quotas, scheduler) = &mut *guard;
            let mut txn = Transaction { tasks, attributes, quotas, scheduler };
            f(&mut txn)
        }

        fn read<R>(&self, f: impl FnOnce(&Snapshot<'_>) -> Result<R>) -> Result<R> {
            let guard = self.inner.lock();
            let (tasks, attributes, quotas, scheduler) = &*guard;
            let snapshot = Snapshot { tasks, attributes, quotas, scheduler };
            f(&snapshot)
        }
    }

    struct NoopDriver;

    #[async_trait]
    impl Driver for NoopDriver {
        async fn launch_task(&self, _offer_id: &String, _task: &Task) {}
        async fn kill_task(&self, _task_id: &String) {}
        async fn decline_offer(&self, _offer_id: &String, _filter_duration_ms: u64) {}
        async fn reconcile_tasks(&self, _statuses: Vec<Task>) {}
    }

    fn manager() -> (StateManager<MemStorage, NoopDriver>, Arc<RecordingEventSink>) {
        let events = Arc::new(RecordingEventSink::new());
        let mgr = StateManager::new(Arc::new(MemStorage::default()), Arc::new(NoopDriver), events.clone(), Arc::new(FakeClock::new(0)), "scheduler-1", false);
        (mgr, events)
    }

    fn resources() -> ResourceRequest {
        ResourceRequest {
            cpu_cores: 1.0,
            mem_mb: 256,
            disk_mb: 256,
            named_ports: Vec::new(),
        }
    }

    #[test]
    fn insert_pending_creates_tasks_and_emits_events() {
        let (mgr, events) = manager();
        let job = JobKey::new("role", "prod", "job");
        let ids = mgr.insert_pending(job, [0u32, 1u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new()).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(events.snapshot().len(), 2);
    }

    #[test]
    fn insert_pending_rejects_instance_collision() {
        let (mgr, _events) = manager();
        let job = JobKey::new("role", "prod", "job");
        mgr.insert_pending(job.clone(), [0u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new()).unwrap();
        let result = mgr.insert_pending(job, [0u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new());
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn quota_enforcement_rejects_over_quota_insert() {
        let events = Arc::new(RecordingEventSink::new());
        let storage = Arc::new(MemStorage::default());
        storage.write(|txn| {
            txn.quotas.upsert("role", QuotaAggregate { cpu_cores: 1.5, mem_mb: 1024, disk_mb: 1024 });
            Ok(())
        }).unwrap();
        let mgr = StateManager::new(storage, Arc::new(NoopDriver), events, Arc::new(FakeClock::new(0)), "scheduler-1", true);
        let job = JobKey::new("role", "prod", "job");
        let result = mgr.insert_pending(job, [0u32, 1u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new());
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn change_state_moves_pending_to_assigned_and_emits_event() {
        let (mgr, events) = manager();
        let job = JobKey::new("role", "prod", "job");
        let ids = mgr.insert_pending(job, [0u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new()).unwrap();
        events.drain();

        let outcome = mgr.change_state(&ids[0], Some(Status::Pending), Command::ChangeState(Status::Assigned)).await.unwrap();
        assert_eq!(outcome, Outcome::Success);
        let published = events.drain();
        assert_eq!(published.len(), 1);
        assert!(matches!(&published[0], Event::TaskStateChange { task, .. } if task.status == Status::Assigned));
    }

    #[tokio::test]
    async fn assign_task_records_placement_and_launches() {
        let (mgr, events) = manager();
        let job = JobKey::new("role", "prod", "job");
        let ids = mgr.insert_pending(job, [0u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new()).unwrap();
        events.drain();

        mgr.assign_task(&ids[0], "offer-1", "host-1", "agent-1", HashMap::new()).await.unwrap();
        let published = events.drain();
        assert_eq!(published.len(), 1);
        assert!(matches!(&published[0], Event::TaskStateChange { task, .. }
            if task.status == Status::Assigned && task.assignment.as_ref().map(|a| a.agent_host.as_str()) == Some("host-1")));
    }

    #[tokio::test]
    async fn change_state_rejects_wrong_expected_prior() {
        let (mgr, events) = manager();
        let job = JobKey::new("role", "prod", "job");
        let ids = mgr.insert_pending(job, [0u32].into_iter().collect(), Tier::Preferred, resources(), Vec::new()).unwrap();
        events.drain();

        let outcome = mgr.change_state(&ids[0], Some(Status::Running), Command::ChangeState(Status::Assigned)).await.unwrap();
        assert_eq!(outcome, Outcome::InvalidCas);
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn change_state_on_unknown_task_is_invalid_cas() {
        let (mgr, _events) = manager();
        let outcome = mgr.change_state(&"missing".to_string(), None, Command::ChangeState(Status::Assigned)).await.unwrap();
        assert_eq!(outcome, Outcome::InvalidCas);
    }
}
