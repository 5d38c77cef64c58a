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

//! Task state machine (spec §4.2): the authoritative lifecycle of every
//! task. `transition` is a pure function -- it never touches storage or the
//! driver itself, it only decides what *should* happen; `StateManager`
//! (`crate::state_manager`) is the only caller and is responsible for
//! actually applying the returned side effects under a write transaction.

mod compaction;
mod policy;
mod table;

pub use compaction::compact_partition_events;
pub use policy::{MaxFailuresRetryPolicy, RetryPolicy};

use scheduler_core::model::{FlapOracle, Status, Task, TransitionEvent};

/// What drove this call into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// An explicit target requested by a caller (insertion, assignment,
    /// operator kill, kill confirmation, ...).
    ChangeState(Status),
    /// The agent reported this status for the task.
    AgentReport(Status),
    /// The agent stopped heartbeating.
    HeartbeatLost,
    /// The agent resumed heartbeating after a partition.
    HeartbeatRestored,
    /// The partition wait policy elapsed without the agent reappearing.
    PartitionTimeout,
}

/// Result of a CAS-guarded or unconditional state change attempt (spec
/// §4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Illegal,
    Noop,
    InvalidCas,
}

/// Side effects the state machine asks the caller to perform, in the order
/// they must be applied (spec §4.2's canonical action order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectKind {
    IncrementFailures,
    Kill,
    TransitionToLost,
    Reschedule,
    SaveState,
    Delete,
}

/// Canonical total order of side effect kinds. The machine emits side
/// effects already sorted by this key regardless of the order an
/// individual transition handler produced them in (spec §4.2: "the total
/// order is significant").
fn order_key(kind: SideEffectKind) -> u8 {
    match kind {
        SideEffectKind::IncrementFailures => 0,
        SideEffectKind::Kill => 1,
        SideEffectKind::TransitionToLost => 2,
        SideEffectKind::Reschedule => 3,
        SideEffectKind::SaveState => 4,
        SideEffectKind::Delete => 5,
    }
}

/// Output of a single `transition` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub outcome: Outcome,
    /// The status this transition moves into, when `outcome == Success`.
    /// Used by the `SaveState` side effect and for event emission.
    pub target_status: Option<Status>,
    /// Human-readable reason, attached to the saved event (e.g. the flap
    /// penalty reason) or to an `Illegal`/`InvalidCas` outcome.
    pub message: Option<String>,
    /// If `Reschedule` is present, the status the successor task should be
    /// inserted with (`Pending`, or `Throttled` if the flap oracle returned
    /// a nonzero penalty).
    pub reschedule_as: Option<Status>,
    pub side_effects: Vec<SideEffectKind>,
}

impl TransitionResult {
    fn illegal(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Illegal,
            target_status: None,
            message: Some(message.into()),
            reschedule_as: None,
            side_effects: Vec::new(),
        }
    }

    fn noop() -> Self {
        Self {
            outcome: Outcome::Noop,
            target_status: None,
            message: None,
            reschedule_as: None,
            side_effects: Vec::new(),
        }
    }

    fn invalid_cas() -> Self {
        Self {
            outcome: Outcome::InvalidCas,
            target_status: None,
            message: None,
            reschedule_as: None,
            side_effects: Vec::new(),
        }
    }

    fn success(target_status: Status, mut side_effects: Vec<SideEffectKind>) -> Self {
        side_effects.sort_by_key(|k| order_key(*k));
        Self {
            outcome: Outcome::Success,
            target_status: Some(target_status),
            message: None,
            reschedule_as: None,
            side_effects,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_reschedule_as(mut self, status: Status) -> Self {
        self.reschedule_as = Some(status);
        self
    }
}

/// Drive `task` through one transition.
///
/// `expected_prior`, if given, is a CAS guard (spec §4.3): if the task's
/// current status doesn't match, or the task doesn't exist, the outcome is
/// `InvalidCas` and no side effects fire. `task` being absent from storage
/// is represented by the caller simply not invoking `transition` (a
/// missing task is itself an `InvalidCas`, handled by `StateManager`), so
/// this function always receives a real task.
pub fn transition(
    task: &Task,
    expected_prior: Option<Status>,
    command: Command,
    retry_policy: &dyn RetryPolicy,
    flap_oracle: &dyn FlapOracle,
) -> TransitionResult {
    if let Some(expected) = expected_prior {
        if task.status != expected {
            return TransitionResult::invalid_cas();
        }
    }

    if task.status.is_terminal() {
        // Terminal tasks are never mutated except for deletion (spec §3);
        // any further command is illegal, not silently dropped, so the
        // caller notices a stale reference to a terminal task.
        return TransitionResult::illegal(format!("task {} is already terminal ({:?})", task.id, task.status));
    }

    // A command arriving while PARTITIONED is superseded by declaring the
    // task LOST first (spec §4.2: "if a command arrives while PARTITIONED,
    // emit TRANSITION_TO_LOST before applying"). PartitionTimeout/
    // HeartbeatRestored are the only commands that drive *out* of
    // PARTITIONED normally and are handled by the table below instead.
    if task.status == Status::Partitioned && !matches!(command, Command::PartitionTimeout | Command::HeartbeatRestored) {
        let mut lost = table::lost_transition(task, retry_policy, flap_oracle);
        lost.side_effects.insert(0, SideEffectKind::TransitionToLost);
        lost.side_effects.sort_by_key(|k| order_key(*k));
        return lost;
    }

    table::dispatch(task, command, retry_policy, flap_oracle)
}

/// Apply the partition-event compaction rule (spec §4.2) and append the new
/// `PARTITIONED` event: if the prior two events form the cycle
/// `X -> PARTITIONED -> X`, drop them so the existing `X` remains,
/// bounding event history on flapping agents.
pub fn append_partitioned_event(events: &mut Vec<TransitionEvent>, new_event: TransitionEvent) {
    debug_assert_eq!(new_event.status, Status::Partitioned);
    compaction::compact_partition_events(events);
    events.push(new_event);
}
