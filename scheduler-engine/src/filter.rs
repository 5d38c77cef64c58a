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

//! Scheduling filter (spec §4.1): a pure function deciding whether a task
//! fits an offer on a given agent. Evaluation is order-independent; every
//! applicable veto is reported, the caller decides whether one veto is
//! sufficient to reject the pairing.

use scheduler_core::model::{is_dedicated_to, Constraint, HostAttributes, LimitOracle, Task};
use scheduler_core::offer::OfferResources;

/// A single reason the filter rejects a (task, offer) pairing (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VetoReason {
    InsufficientCpu,
    InsufficientMem,
    InsufficientDisk,
    InsufficientPorts,
    UnsatisfiedValueConstraint(String),
    UnsatisfiedLimitConstraint(String),
    Maintenance,
    DedicatedConstraintMismatch,
}

/// Outcome of `fit`: either the pairing is acceptable, or every applicable
/// veto is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitOutcome {
    Fit,
    Veto(Vec<VetoReason>),
}

impl FitOutcome {
    pub fn is_fit(&self) -> bool {
        matches!(self, FitOutcome::Fit)
    }

    pub fn vetoes(&self) -> &[VetoReason] {
        match self {
            FitOutcome::Fit => &[],
            FitOutcome::Veto(v) => v,
        }
    }
}

/// Evaluate whether `task` can run on an agent advertising `offer` with
/// `agent_attributes`, using `limit_oracle` for limit-constraint counts.
///
/// Pure and order-independent: every veto that applies is collected before
/// returning, so the caller (the task scheduler, which bans the offer on
/// any veto) never needs a second pass to find out why a pairing failed.
pub fn fit(task: &Task, offer: &OfferResources, agent_attributes: &HostAttributes, limit_oracle: &dyn LimitOracle) -> FitOutcome {
    let mut vetoes = Vec::new();

    if agent_attributes.mode != scheduler_core::model::HostMode::None {
        vetoes.push(VetoReason::Maintenance);
    }

    if !is_dedicated_to(agent_attributes, &task.job.role) {
        vetoes.push(VetoReason::DedicatedConstraintMismatch);
    }

    if task.resources.cpu_cores > offer.cpu_cores {
        vetoes.push(VetoReason::InsufficientCpu);
    }
    if task.resources.mem_mb > offer.mem_mb {
        vetoes.push(VetoReason::InsufficientMem);
    }
    if task.resources.disk_mb > offer.disk_mb {
        vetoes.push(VetoReason::InsufficientDisk);
    }
    if task.resources.num_ports() as u32 > offer.available_ports() {
        vetoes.push(VetoReason::InsufficientPorts);
    }

    for constraint in &task.constraints {
        match constraint {
            Constraint::Value { attribute, values, negated } => {
                let matches = agent_attributes
                    .values_of(attribute)
                    .map(|agent_values| !agent_values.is_disjoint(values))
                    .unwrap_or(false);
                let satisfied = if *negated { !matches } else { matches };
                if !satisfied {
                    vetoes.push(VetoReason::UnsatisfiedValueConstraint(attribute.clone()));
                }
            }
            Constraint::Limit { attribute, limit } => {
                let satisfied = match agent_attributes.values_of(attribute) {
                    Some(agent_values) => agent_values
                        .iter()
                        .all(|value| limit_oracle.sibling_count(&task.job, attribute, value) < *limit),
                    None => true,
                };
                if !satisfied {
                    vetoes.push(VetoReason::UnsatisfiedLimitConstraint(attribute.clone()));
                }
            }
        }
    }

    if vetoes.is_empty() {
        FitOutcome::Fit
    } else {
        FitOutcome::Veto(vetoes)
    }
}
