//! Shared in-memory storage/driver test doubles for the integration
//! scenario tests (spec §8). Mirrors the doubles colocated with each
//! engine module's own unit tests, but exposed once here so the scenario
//! tests don't each redeclare them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use scheduler_core::error::Result;
use scheduler_core::model::{HostAttributes, JobKey, Status, Task, TaskId};
use scheduler_core::quota::{QuotaAggregate, QuotaByRole};
use scheduler_core::traits::{AttributeStore, Driver, QuotaStore, SchedulerStore, Snapshot, Storage, TaskStore, Transaction};

#[derive(Default)]
pub struct MemTasks(pub HashMap<TaskId, Task>);
impl TaskStore for MemTasks {
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
pub struct MemAttributes(pub HashMap<String, HostAttributes>);
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
pub struct MemQuotas(pub QuotaByRole);
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
pub struct MemScheduler(pub Option<String>);
impl SchedulerStore for MemScheduler {
    fn get(&self) -> Option<String> {
        self.0.clone()
    }
    fn set(&mut self, framework_id: String) {
        self.0 = Some(framework_id);
    }
}

#[derive(Default)]
pub struct MemStorage {
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

/// Records every kill/launch/decline the state manager/scheduler/preemptor
/// ask for, so scenario assertions can count them exactly.
#[derive(Default)]
pub struct RecordingDriver {
    pub launched: Mutex<Vec<(String, TaskId)>>,
    pub killed: Mutex<Vec<TaskId>>,
    pub declined: Mutex<Vec<(String, u64)>>,
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn launch_task(&self, offer_id: &String, task: &Task) {
        self.launched.lock().push((offer_id.clone(), task.id.clone()));
    }
    async fn kill_task(&self, task_id: &TaskId) {
        self.killed.lock().push(task_id.clone());
    }
    async fn decline_offer(&self, offer_id: &String, filter_duration_ms: u64) {
        self.declined.lock().push((offer_id.clone(), filter_duration_ms));
    }
    async fn reconcile_tasks(&self, _statuses: Vec<Task>) {}
}

pub fn storage() -> Arc<MemStorage> {
    Arc::new(MemStorage::default())
}

pub fn driver() -> Arc<RecordingDriver> {
    Arc::new(RecordingDriver::default())
}
