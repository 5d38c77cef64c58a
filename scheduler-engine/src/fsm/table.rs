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

use scheduler_core::model::{FlapOracle, Status, Task};

use super::policy::RetryPolicy;
use super::{Command, SideEffectKind, TransitionResult};

/// Where a rescheduled successor should be inserted: `PENDING`, unless the
/// flap oracle reports a nonzero penalty, in which case `THROTTLED` with a
/// human-readable reason (spec §4.2 flap detection).
fn reschedule_target(job: &scheduler_core::model::JobKey, flap_oracle: &dyn FlapOracle) -> (Status, Option<String>) {
    let penalty = flap_oracle.penalty_millis(job);
    if penalty > 0 {
        (Status::Throttled, Some(format!("flapping detected, throttled for {penalty}ms")))
    } else {
        (Status::Pending, None)
    }
}

fn reschedule_result(task: &Task, target_status: Status, flap_oracle: &dyn FlapOracle, reschedule: bool, increment_failures: bool) -> TransitionResult {
    let mut effects = vec![SideEffectKind::SaveState, SideEffectKind::Delete];
    if !reschedule {
        return TransitionResult::success(target_status, effects);
    }

    effects.push(SideEffectKind::Reschedule);
    if increment_failures {
        effects.push(SideEffectKind::IncrementFailures);
    }
    let (reschedule_as, reason) = reschedule_target(&task.job, flap_oracle);
    let mut result = TransitionResult::success(target_status, effects).with_reschedule_as(reschedule_as);
    if let Some(reason) = reason {
        result = result.with_message(reason);
    }
    result
}

/// Declare `task` LOST: used both for `PartitionTimeout` and for the
/// "command arrived while PARTITIONED" supersession path in
/// `fsm::transition`.
pub(super) fn lost_transition(task: &Task, retry_policy: &dyn RetryPolicy, flap_oracle: &dyn FlapOracle) -> TransitionResult {
    let reschedule = retry_policy.should_reschedule(task);
    reschedule_result(task, Status::Lost, flap_oracle, reschedule, reschedule)
}

pub(super) fn dispatch(task: &Task, command: Command, retry_policy: &dyn RetryPolicy, flap_oracle: &dyn FlapOracle) -> TransitionResult {
    use Command::*;
    use Status::*;

    match (task.status, &command) {
        // Idempotent no-ops: asking for the state the task is already in.
        (current, ChangeState(target)) if current == *target => TransitionResult::noop(),
        (current, AgentReport(reported)) if current == *reported => TransitionResult::noop(),

        (Init, ChangeState(Pending)) => TransitionResult::success(Pending, vec![SideEffectKind::SaveState]),

        (Pending, ChangeState(Assigned)) => TransitionResult::success(Assigned, vec![SideEffectKind::SaveState]),

        (Throttled, ChangeState(Pending)) => TransitionResult::success(Pending, vec![SideEffectKind::SaveState]),

        (Assigned, AgentReport(Starting)) => TransitionResult::success(Starting, vec![SideEffectKind::SaveState]),
        (Assigned, AgentReport(Running)) => TransitionResult::success(Running, vec![SideEffectKind::SaveState]),
        (Starting, AgentReport(Running)) => TransitionResult::success(Running, vec![SideEffectKind::SaveState]),

        (Running, HeartbeatLost) => TransitionResult::success(Partitioned, vec![SideEffectKind::SaveState]),
        (Partitioned, HeartbeatRestored) => TransitionResult::success(Running, vec![SideEffectKind::SaveState]),
        (Partitioned, PartitionTimeout) => lost_transition(task, retry_policy, flap_oracle),

        (Running, AgentReport(Failed)) => {
            let reschedule = retry_policy.should_reschedule(task);
            reschedule_result(task, Failed, flap_oracle, reschedule, reschedule)
        }

        (Running, AgentReport(Finished)) => TransitionResult::success(Finished, vec![SideEffectKind::SaveState, SideEffectKind::Delete]),

        (Running, ChangeState(Killing)) | (Assigned, ChangeState(Killing)) | (Starting, ChangeState(Killing)) => {
            TransitionResult::success(Killing, vec![SideEffectKind::Kill, SideEffectKind::SaveState])
        }
        (Killing, AgentReport(Killed)) => TransitionResult::success(Killed, vec![SideEffectKind::SaveState, SideEffectKind::Delete]),

        (Running, ChangeState(Preempting)) | (Assigned, ChangeState(Preempting)) | (Starting, ChangeState(Preempting)) => {
            TransitionResult::success(Preempting, vec![SideEffectKind::Kill, SideEffectKind::SaveState])
        }
        (Preempting, ChangeState(Killing)) => TransitionResult::success(Killing, vec![SideEffectKind::SaveState]),

        (Running, ChangeState(Draining)) => TransitionResult::success(Draining, vec![SideEffectKind::SaveState]),
        (Draining, ChangeState(Killing)) => TransitionResult::success(Killing, vec![SideEffectKind::Kill, SideEffectKind::SaveState]),

        (Running, ChangeState(Restarting)) | (Assigned, ChangeState(Restarting)) | (Starting, ChangeState(Restarting)) => {
            TransitionResult::success(Restarting, vec![SideEffectKind::Kill, SideEffectKind::SaveState])
        }
        (Restarting, AgentReport(Finished)) => reschedule_result(task, Finished, flap_oracle, true, false),

        _ => TransitionResult::illegal(format!("no transition from {:?} via {:?}", task.status, command)),
    }
}
