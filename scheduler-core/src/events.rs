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

//! Event sink (spec §6, §9). The source uses a subscribe-by-type bus; the
//! replacement exposes one typed event per category, delivered synchronously
//! in commit order to whatever sink the caller wires in at construction.

use crate::model::{HostAttributes, Status, Task};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A task's status changed. Carries the full post-transition task and
    /// the status it moved from.
    TaskStateChange { task: Task, previous_state: Status },
    /// One or more tasks were deleted from durable state.
    TasksDeleted { tasks: Vec<Task> },
    /// A host's attribute record changed (including drain-mode changes).
    HostAttributesChanged { attributes: HostAttributes },
    /// Published once, after explicit wiring completes and before the
    /// task-scheduler/preemptor workers start (SPEC_FULL.md supplement 3).
    SchedulerActive,
}

/// A sink events are published to. `publish` is synchronous: the state
/// manager calls it once per transaction, after commit, in the order
/// events were generated (spec §5: "events published by one transaction
/// are delivered to subscribers in commit order").
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);

    fn publish_all(&self, events: impl IntoIterator<Item = Event>)
    where
        Self: Sized,
    {
        for event in events {
            self.publish(event);
        }
    }
}

/// No-op sink, useful for tests that don't care about events.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: Event) {}
}

/// Records every event in order; used by tests to assert on ordering and
/// content (spec §8 scenario 1: "10 TaskStateChange events emitted in
/// input order").
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: parking_lot::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: Event) {
        self.events.lock().push(event);
    }
}
