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

//! Data model (spec §3): tasks, host attributes, and the small value types
//! shared by every component of the core.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// `{role, environment, name}` tuple identifying a job. Cheap to clone;
/// tasks within a job are addressed by `(JobKey, instance)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub role: String,
    pub environment: String,
    pub name: String,
}

impl JobKey {
    pub fn new(role: impl Into<String>, environment: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            environment: environment.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.role, self.environment, self.name)
    }
}

/// Tier label controlling preemption eligibility and revocability (GLOSSARY).
/// Ordering matters: `Preferred > Preemptible > Revocable`, lower tiers are
/// eligible to be preempted to make room for higher ones (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Revocable,
    Preemptible,
    Preferred,
}

impl Tier {
    /// True if `self` may be preempted to admit `other`.
    pub fn preemptable_by(&self, other: Tier) -> bool {
        *self < other
    }
}

/// CPU/memory/disk/port resource request, plus the consumed view of an
/// offer's available resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu_cores: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
    pub named_ports: Vec<String>,
}

impl ResourceRequest {
    pub fn num_ports(&self) -> usize {
        self.named_ports.len()
    }
}

/// A placement constraint (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// `attr = one-of{values}` (or its negation).
    Value {
        attribute: String,
        values: BTreeSet<String>,
        negated: bool,
    },
    /// `attr <= limit`, evaluated against a caller-supplied running-count
    /// oracle keyed by attribute value.
    Limit { attribute: String, limit: u32 },
}

impl Constraint {
    pub fn value(attribute: impl Into<String>, values: impl IntoIterator<Item = String>, negated: bool) -> Self {
        Constraint::Value {
            attribute: attribute.into(),
            values: values.into_iter().collect(),
            negated,
        }
    }

    pub fn limit(attribute: impl Into<String>, limit: u32) -> Self {
        Constraint::Limit {
            attribute: attribute.into(),
            limit,
        }
    }
}

/// Task lifecycle state (spec §4.2). `THROTTLED` appears once; the spec's
/// listing repeats it, which we treat as a transcription artifact rather
/// than two distinct states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Init,
    Pending,
    Throttled,
    Assigned,
    Starting,
    Running,
    Partitioned,
    Preempting,
    Restarting,
    Draining,
    Killing,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished | Status::Failed | Status::Killed | Status::Lost)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Every status a *persisted* task can hold while occupying resources.
    /// `INIT` is excluded: a task is only ever saved once `insertPending`
    /// has already moved it to `PENDING` (or `THROTTLED`), so no stored
    /// task is ever observed in `INIT`.
    pub fn active_stored() -> HashSet<Status> {
        use Status::*;
        [Pending, Throttled, Assigned, Starting, Running, Partitioned, Preempting, Restarting, Draining, Killing].into_iter().collect()
    }
}

/// Append-only transition record (spec §3: "task events are monotonically
/// non-decreasing in timestamp").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub timestamp_millis: u64,
    pub status: Status,
    pub message: Option<String>,
    pub scheduler_host: String,
}

/// Where a task landed, once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub agent_host: String,
    pub agent_id: String,
    pub assigned_ports: HashMap<String, u32>,
}

/// A task, as owned by the storage collaborator (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub job: JobKey,
    pub instance: u32,
    pub tier: Tier,
    pub resources: ResourceRequest,
    pub constraints: Vec<Constraint>,
    pub status: Status,
    pub failure_count: u32,
    pub times_partitioned: u32,
    pub ancestor_id: Option<String>,
    pub assignment: Option<Assignment>,
    pub events: Vec<TransitionEvent>,
}

impl Task {
    pub fn new(id: impl Into<String>, job: JobKey, instance: u32, tier: Tier, resources: ResourceRequest) -> Self {
        Self {
            id: id.into(),
            job,
            instance,
            tier,
            resources,
            constraints: Vec::new(),
            status: Status::Init,
            failure_count: 0,
            times_partitioned: 0,
            ancestor_id: None,
            assignment: None,
            events: Vec::new(),
        }
    }

    pub fn resource_signature(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.job,
            self.resources.cpu_cores,
            self.resources.mem_mb,
            self.resources.disk_mb,
            self.resources.num_ports()
        )
    }
}

/// Per-agent drain mode (spec §3). Ordered so `NONE < DRAINING < DRAINED`
/// is meaningful if a caller ever needs to compare severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMode {
    None,
    Draining,
    Drained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: BTreeSet<String>,
}

/// Per-agent attribute record. Construction enforces "no attribute may have
/// an empty value set" (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAttributes {
    pub host: String,
    pub mode: HostMode,
    pub attributes: HashMap<String, Attribute>,
}

impl HostAttributes {
    pub fn new(host: impl Into<String>, mode: HostMode, attributes: Vec<Attribute>) -> Self {
        let attributes = attributes
            .into_iter()
            .filter(|a| !a.values.is_empty())
            .map(|a| (a.name.clone(), a))
            .collect();
        Self {
            host: host.into(),
            mode,
            attributes,
        }
    }

    pub fn values_of(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.attributes.get(attribute).map(|a| &a.values)
    }
}

/// Merge a freshly-reported `HostAttributes` record with the previously
/// stored one. Per spec §3: "Merging a new attribute record with the
/// previous one preserves the previous mode when the new record omits it."
/// We model "omits it" as the new record's mode being `HostMode::None` while
/// the previous mode was something else -- a fresh report that is silent on
/// drain state should not clobber an operator-initiated drain.
pub fn merge_host_attributes(previous: Option<&HostAttributes>, incoming: HostAttributes) -> HostAttributes {
    match previous {
        Some(prev) if incoming.mode == HostMode::None && prev.mode != HostMode::None => HostAttributes {
            mode: prev.mode,
            ..incoming
        },
        _ => incoming,
    }
}

/// Count oracle the caller supplies to the scheduling filter for limit
/// constraints: running-task counts per `(job, host-attribute-value)`.
pub trait LimitOracle {
    fn sibling_count(&self, job: &JobKey, attribute: &str, value: &str) -> u32;
}

/// Simple in-memory implementation built from a snapshot of active tasks,
/// useful for tests and as the default the state manager builds per pass.
#[derive(Debug, Default)]
pub struct SnapshotLimitOracle {
    counts: HashMap<(JobKey, String, String), u32>,
}

impl SnapshotLimitOracle {
    pub fn build<'a>(tasks: impl IntoIterator<Item = &'a Task>, attributes_of_host: impl Fn(&str) -> Option<&'a HostAttributes>) -> Self {
        let mut counts: HashMap<(JobKey, String, String), u32> = HashMap::new();
        for task in tasks {
            if !task.status.is_active() {
                continue;
            }
            let Some(assignment) = task.assignment.as_ref() else {
                continue;
            };
            let Some(host_attrs) = attributes_of_host(&assignment.agent_host) else {
                continue;
            };
            for attr in host_attrs.attributes.values() {
                for value in &attr.values {
                    *counts
                        .entry((task.job.clone(), attr.name.clone(), value.clone()))
                        .or_insert(0) += 1;
                }
            }
        }
        Self { counts }
    }
}

impl LimitOracle for SnapshotLimitOracle {
    fn sibling_count(&self, job: &JobKey, attribute: &str, value: &str) -> u32 {
        self.counts
            .get(&(job.clone(), attribute.to_string(), value.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

/// Flap-penalty oracle consulted by `RESCHEDULE` (spec §4.2): returns a
/// nonzero penalty in milliseconds when the task's ancestor chain has been
/// flapping, routing the new task through `THROTTLED`.
pub trait FlapOracle {
    fn penalty_millis(&self, job: &JobKey) -> u64;
}

#[derive(Debug, Default)]
pub struct NoFlapOracle;

impl FlapOracle for NoFlapOracle {
    fn penalty_millis(&self, _job: &JobKey) -> u64 {
        0
    }
}

impl FlapOracle for Box<dyn FlapOracle> {
    fn penalty_millis(&self, job: &JobKey) -> u64 {
        (**self).penalty_millis(job)
    }
}

/// Dedicated-constraint helper: returns the set of attribute values that
/// make a host "dedicated" to a role, if any. Used by the scheduling filter
/// for `MAINTENANCE`/`DEDICATED_CONSTRAINT_MISMATCH` vetoes.
pub fn is_dedicated_to(host_attrs: &HostAttributes, role: &str) -> bool {
    match host_attrs.values_of("dedicated") {
        Some(values) => values.contains(role) || values.iter().any(|v| v == "*"),
        None => true,
    }
}

pub type TaskId = String;
pub type OfferId = String;

/// A batch of instance indices requested by an `insertPending` call.
pub type InstanceIds = HashSet<u32>;
