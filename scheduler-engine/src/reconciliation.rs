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

//! Reconciliation (spec §6, SPEC_FULL.md supplement 1): periodically tells
//! the driver what the scheduler believes about assigned tasks (explicit),
//! and periodically asks the driver to report back everything it knows
//! without a reference state (implicit), so the two converge independently
//! of any single dropped message.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;
use rand::Rng;

use scheduler_core::clock::Clock;
use scheduler_core::config::ReconciliationConfig;
use scheduler_core::error::Result;
use scheduler_core::model::{Status, Task};
use scheduler_core::traits::{Driver, Storage};

pub struct ReconciliationScheduler<S, D> {
    storage: Arc<S>,
    driver: Arc<D>,
    clock: Arc<dyn Clock>,
    config: ReconciliationConfig,
    last_explicit_millis: Mutex<Option<u64>>,
    last_implicit_millis: Mutex<Option<u64>>,
}

impl<S: Storage, D: Driver> ReconciliationScheduler<S, D> {
    pub fn new(storage: Arc<S>, driver: Arc<D>, clock: Arc<dyn Clock>, config: ReconciliationConfig) -> Self {
        Self {
            storage,
            driver,
            clock,
            config,
            last_explicit_millis: Mutex::new(None),
            last_implicit_millis: Mutex::new(None),
        }
    }

    /// Send the driver every slave-assigned task's known status, in
    /// batches with a delay between them so a large cluster doesn't
    /// saturate the driver's inbound queue in one burst (spec §6).
    pub async fn run_explicit(&self) -> Result<usize> {
        let tasks = self.slave_assigned_tasks()?;
        let batch_size = self.config.batch_size.max(1);
        let mut sent = 0;
        for batch in tasks.chunks(batch_size) {
            self.driver.reconcile_tasks(batch.to_vec()).await;
            sent += batch.len();
            if self.config.batch_delay_ms > 0 && sent < tasks.len() {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }
        *self.last_explicit_millis.lock() = Some(self.clock.now_millis());
        Ok(sent)
    }

    /// Ask the driver to report every task it knows about without being
    /// told the scheduler's own view first (spec §6). Modeled as a
    /// `reconcile_tasks` call carrying no reference state, since the
    /// driver collaborator's explicit/implicit distinction is about
    /// whether a reference state accompanies the request.
    pub async fn run_implicit(&self) -> Result<()> {
        self.driver.reconcile_tasks(Vec::new()).await;
        *self.last_implicit_millis.lock() = Some(self.clock.now_millis());
        Ok(())
    }

    fn slave_assigned_tasks(&self) -> Result<Vec<Task>> {
        self.storage.read(|snapshot| Ok(snapshot.tasks.query_slave_assigned(&Status::active_stored())))
    }

    pub fn last_explicit_millis(&self) -> Option<u64> {
        *self.last_explicit_millis.lock()
    }

    pub fn last_implicit_millis(&self) -> Option<u64> {
        *self.last_implicit_millis.lock()
    }

    /// Jittered startup delay before the first reconciliation pass, so a
    /// fleet of scheduler replicas restarted together don't reconcile in
    /// lockstep (spec §6: "reconciliation schedules are spread across a
    /// configurable window").
    fn initial_delay(&self) -> Duration {
        let jitter = if self.config.spread_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..self.config.spread_ms) };
        Duration::from_millis(self.config.initial_delay_ms + jitter)
    }

    /// Spawn the periodic explicit and implicit reconciliation loops.
    /// Returns their join handles so the wiring module can track them.
    pub fn spawn(self: Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let explicit = {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(this.initial_delay()).await;
                let mut ticker = tokio::time::interval(Duration::from_millis(this.config.explicit_interval_ms.max(1)));
                loop {
                    ticker.tick().await;
                    if let Err(err) = this.run_explicit().await {
                        warn!("explicit reconciliation pass failed: {err}");
                    }
                }
            })
        };
        let implicit = {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(this.initial_delay()).await;
                let mut ticker = tokio::time::interval(Duration::from_millis(this.config.implicit_interval_ms.max(1)));
                loop {
                    ticker.tick().await;
                    if let Err(err) = this.run_implicit().await {
                        warn!("implicit reconciliation pass failed: {err}");
                    }
                }
            })
        };
        (explicit, implicit)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use scheduler_core::clock::fake::FakeClock;
    use scheduler_core::model::{Assignment, JobKey, ResourceRequest, Tier};
    use scheduler_core::quota::{QuotaAggregate, QuotaByRole};
    use scheduler_core::traits::{AttributeStore, QuotaStore, SchedulerStore, Snapshot, TaskStore, Transaction};
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct MemTasks(HashMap<String, Task>);
    impl TaskStore for MemTasks {
        fn get(&self, id: &String) -> Option<Task> {
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
        fn delete(&mut self, id: &String) {
            self.0.remove(id);
        }
    }

    #[derive(Default)]
    struct MemAttributes;
    impl AttributeStore for MemAttributes {
        fn get(&self, _host: &str) -> Option<scheduler_core::model::HostAttributes> {
            None
        }
        fn save(&mut self, _attributes: scheduler_core::model::HostAttributes) {}
        fn all(&self) -> Vec<scheduler_core::model::HostAttributes> {
            Vec::new()
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

    #[derive(Default)]
    struct RecordingDriver {
        reconciled_batches: Mutex<Vec<Vec<Task>>>,
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        async fn launch_task(&self, _offer_id: &String, _task: &Task) {}
        async fn kill_task(&self, _task_id: &String) {}
        async fn decline_offer(&self, _offer_id: &String, _filter_duration_ms: u64) {}
        async fn reconcile_tasks(&self, statuses: Vec<Task>) {
            self.reconciled_batches.lock().push(statuses);
        }
    }

    fn running_task(id: &str, host: &str) -> Task {
        let mut t = Task::new(id, JobKey::new("role", "prod", "job"), 0, Tier::Preferred, ResourceRequest { cpu_cores: 1.0, mem_mb: 128, disk_mb: 128, named_ports: Vec::new() });
        t.status = Status::Running;
        t.assignment = Some(Assignment { agent_host: host.to_string(), agent_id: format!("agent-{host}"), assigned_ports: HashMap::new() });
        t
    }

    #[tokio::test]
    async fn run_explicit_batches_and_sends_slave_assigned_tasks() {
        let storage = Arc::new(MemStorage::default());
        storage
            .write(|txn| {
                for i in 0..3 {
                    txn.tasks.save(running_task(&format!("t{i}"), "host-1"));
                }
                Ok(())
            })
            .unwrap();
        let driver = Arc::new(RecordingDriver::default());
        let config = ReconciliationConfig { batch_size: 2, batch_delay_ms: 0, ..Default::default() };
        let scheduler = ReconciliationScheduler::new(storage, driver.clone(), Arc::new(FakeClock::new(0)), config);

        let sent = scheduler.run_explicit().await.unwrap();
        assert_eq!(sent, 3);
        assert_eq!(driver.reconciled_batches.lock().len(), 2); // batches of 2 then 1
        assert!(scheduler.last_explicit_millis().is_some());
    }

    #[tokio::test]
    async fn run_implicit_asks_without_reference_state() {
        let storage = Arc::new(MemStorage::default());
        let driver = Arc::new(RecordingDriver::default());
        let scheduler = ReconciliationScheduler::new(storage, driver.clone(), Arc::new(FakeClock::new(0)), ReconciliationConfig::default());

        scheduler.run_implicit().await.unwrap();
        let batches = driver.reconciled_batches.lock();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }
}
