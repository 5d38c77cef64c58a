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

//! External collaborator boundaries (spec §6): the cluster-message driver
//! and the storage engine. Both are out of scope to implement (spec §1)
//! but THE CORE is defined entirely in terms of these traits, so they live
//! here rather than in `scheduler-engine`.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{HostAttributes, JobKey, Status, Task, TaskId};
use crate::offer::OfferId;
use crate::quota::{QuotaAggregate, QuotaByRole};

/// Outbound calls to the cluster-message driver. Calls may fail
/// transiently; per spec §7 the driver collaborator is expected to retry
/// internally, so the core treats these as best-effort and relies on
/// reconciliation to converge.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch_task(&self, offer_id: &OfferId, task: &Task);
    async fn kill_task(&self, task_id: &TaskId);
    async fn decline_offer(&self, offer_id: &OfferId, filter_duration_ms: u64);
    async fn reconcile_tasks(&self, statuses: Vec<Task>);
}

/// CRUD + query surface over tasks (spec §6). Queries expose at minimum:
/// by id, by job, by instance range, by status set, by host, by
/// slave-assigned status set (tasks that currently have a non-null
/// assignment and whose status is in the given set).
pub trait TaskStore {
    fn get(&self, id: &TaskId) -> Option<Task>;
    fn get_active_by_instance(&self, job: &JobKey, instance: u32) -> Option<Task>;
    fn query_by_job(&self, job: &JobKey) -> Vec<Task>;
    fn query_by_status(&self, statuses: &HashSet<Status>) -> Vec<Task>;
    fn query_by_host(&self, host: &str) -> Vec<Task>;
    fn query_slave_assigned(&self, statuses: &HashSet<Status>) -> Vec<Task>;
    fn save(&mut self, task: Task);
    fn delete(&mut self, id: &TaskId);
}

pub trait AttributeStore {
    fn get(&self, host: &str) -> Option<HostAttributes>;
    fn save(&mut self, attributes: HostAttributes);
    fn all(&self) -> Vec<HostAttributes>;
}

pub trait QuotaStore {
    fn get(&self, role: &str) -> Option<QuotaAggregate>;
    fn upsert(&mut self, role: &str, quota: QuotaAggregate);
    fn all(&self) -> QuotaByRole;
}

/// Single-valued cluster-framework identifier (spec §3).
pub trait SchedulerStore {
    fn get(&self) -> Option<String>;
    fn set(&mut self, framework_id: String);
}

/// A live write transaction: the *only* way tasks, host attributes and
/// quotas may be mutated (spec §3 ownership rule, spec §5 single-writer
/// discipline).
pub struct Transaction<'a> {
    pub tasks: &'a mut dyn TaskStore,
    pub attributes: &'a mut dyn AttributeStore,
    pub quotas: &'a mut dyn QuotaStore,
    pub scheduler: &'a mut dyn SchedulerStore,
}

/// A read-only snapshot: executes concurrently with other readers but not
/// with a writer (spec §5 reader-writer discipline).
pub struct Snapshot<'a> {
    pub tasks: &'a dyn TaskStore,
    pub attributes: &'a dyn AttributeStore,
    pub quotas: &'a dyn QuotaStore,
    pub scheduler: &'a dyn SchedulerStore,
}

/// The storage collaborator (spec §6): `write`/`read` with typed
/// sub-stores. `write` is a single atomic unit (spec §9 design note): a
/// transient failure aborts without partial commit, an implementation must
/// not expose partially-applied mutations on error.
pub trait Storage: Send + Sync {
    fn write<R>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<R>) -> Result<R>;
    fn read<R>(&self, f: impl FnOnce(&Snapshot<'_>) -> Result<R>) -> Result<R>;
}
