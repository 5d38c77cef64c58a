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

//! Typed configuration aggregate (spec §6). Grounded on the teacher's
//! `SchedulerConfig`/`ClusterStorageConfig` pattern in `cluster/mod.rs`:
//! small, independently-deserializable structs assembled into one
//! top-level config, rather than the `configure_me`/`clap` binary-argument
//! codegen the teacher uses for its standalone binary (out of scope here,
//! see SPEC_FULL.md).

use serde::{Deserialize, Serialize};

use crate::offer::{OrderCriterion, OrderPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferConfig {
    pub min_hold_ms: u64,
    pub jitter_window_ms: u64,
    pub order: OrderPolicy,
    pub unavailability_threshold_ms: u64,
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            min_hold_ms: 5_000,
            jitter_window_ms: 1_000,
            order: OrderPolicy(vec![OrderCriterion::RevocableFirst, OrderCriterion::Cpu]),
            unavailability_threshold_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanConfig {
    pub max_cache_size: u64,
    pub expire_after_ms: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 100_000,
            expire_after_ms: 2 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub batch_size: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { batch_size: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptorConfig {
    pub enabled: bool,
    pub search_interval_ms: u64,
    pub delay_ms: u64,
    pub reservation_max_batch_size: usize,
}

impl Default for PreemptorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_interval_ms: 60 * 1000,
            delay_ms: 5 * 1000,
            reservation_max_batch_size: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub explicit_interval_ms: u64,
    pub implicit_interval_ms: u64,
    pub initial_delay_ms: u64,
    pub spread_ms: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            explicit_interval_ms: 60 * 60 * 1000,
            implicit_interval_ms: 180 * 60 * 1000,
            initial_delay_ms: 10 * 60 * 1000,
            spread_ms: 30 * 60 * 1000,
            batch_size: 500,
            batch_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerCoreConfig {
    pub offer: OfferConfig,
    pub ban: BanConfig,
    pub schedule: ScheduleConfig,
    pub preemptor: PreemptorConfig,
    pub reconciliation: ReconciliationConfig,
    /// Whether `insertPending` enforces role quota against non-revocable
    /// tiers (SPEC_FULL.md supplement 2). On by default; a cluster with no
    /// quota policy can disable this instead of populating an unbounded
    /// `QuotaStore`.
    pub quota_enforced: bool,
}

impl Default for SchedulerCoreConfig {
    fn default() -> Self {
        Self {
            offer: OfferConfig::default(),
            ban: BanConfig::default(),
            schedule: ScheduleConfig::default(),
            preemptor: PreemptorConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            quota_enforced: true,
        }
    }
}
