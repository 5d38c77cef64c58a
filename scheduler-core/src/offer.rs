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

//! Offer data model (spec §3). Offers themselves are owned in memory by the
//! offer manager (`scheduler-engine::offer`); this module only defines the
//! shared shape so the filter, scheduler and preemptor can all speak of an
//! offer without depending on the engine crate.

use serde::{Deserialize, Serialize};

use crate::model::OfferId;

/// An inclusive port range `[begin, end]` as advertised by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub begin: u32,
    pub end: u32,
}

impl PortRange {
    pub fn count(&self) -> u32 {
        self.end.saturating_sub(self.begin) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResources {
    pub cpu_cores: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
    pub port_ranges: Vec<PortRange>,
}

impl OfferResources {
    pub fn available_ports(&self) -> u32 {
        self.port_ranges.iter().map(|r| r.count()).sum()
    }
}

/// A scheduled maintenance window during which the agent will stop
/// accepting new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnavailabilityWindow {
    pub start_millis: u64,
    pub duration_millis: u64,
}

impl UnavailabilityWindow {
    pub fn starts_within(&self, now_millis: u64, threshold_millis: u64) -> bool {
        self.start_millis <= now_millis.saturating_add(threshold_millis)
    }
}

/// An agent's snapshot of available resources at a moment (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: OfferId,
    pub agent_id: String,
    pub host: String,
    pub resources: OfferResources,
    pub unavailability: Option<UnavailabilityWindow>,
    /// Whether this offer's resources are revocable capacity (spec §4.4
    /// `REVOCABLE_FIRST` ordering). Set by the driver from agent metadata at
    /// offer-arrival time; the scheduling core never infers it.
    pub revocable: bool,
}

/// Tuple `{offer-id, task-group-key}` asserting "this offer was proven
/// insufficient for this task-group" (spec §3). A task-group key groups
/// tasks that would be vetoed identically, typically `(job, resource
/// signature)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StaticBanKey {
    pub offer_id: OfferId,
    pub task_group_key: String,
}

impl StaticBanKey {
    pub fn new(offer_id: impl Into<String>, task_group_key: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            task_group_key: task_group_key.into(),
        }
    }
}

/// Offer ordering policy (spec §4.4). Composites apply criteria in list
/// order, breaking ties with the next criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCriterion {
    Random,
    Fifo,
    Cpu,
    Memory,
    Disk,
    RevocableFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPolicy(pub Vec<OrderCriterion>);

impl OrderPolicy {
    pub fn single(criterion: OrderCriterion) -> Self {
        Self(vec![criterion])
    }
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self(vec![OrderCriterion::Fifo])
    }
}
