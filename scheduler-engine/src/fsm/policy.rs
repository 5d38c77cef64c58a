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

use scheduler_core::model::Task;

/// Decides whether a failed/lost task is rescheduled (spec §4.2: "if retry
/// policy allows, emit INCREMENT_FAILURES then RESCHEDULE").
pub trait RetryPolicy: Send + Sync {
    fn should_reschedule(&self, task: &Task) -> bool;
}

/// Reschedule as long as the task's failure count, after this failure,
/// would still be under the configured ceiling.
#[derive(Debug, Clone, Copy)]
pub struct MaxFailuresRetryPolicy {
    pub max_failures: u32,
}

impl Default for MaxFailuresRetryPolicy {
    fn default() -> Self {
        Self { max_failures: 10 }
    }
}

impl RetryPolicy for MaxFailuresRetryPolicy {
    fn should_reschedule(&self, task: &Task) -> bool {
        task.failure_count + 1 < self.max_failures
    }
}

impl RetryPolicy for Box<dyn RetryPolicy> {
    fn should_reschedule(&self, task: &Task) -> bool {
        (**self).should_reschedule(task)
    }
}
