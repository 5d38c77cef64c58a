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

use scheduler_core::model::{Status, TransitionEvent};

/// Partition-event compaction (spec §4.2, scenario 6): called immediately
/// before appending a new `PARTITIONED` event. If the last two recorded
/// events together with the one before them form the cycle
/// `X -> PARTITIONED -> X`, the `PARTITIONED -> X` pair is dropped so the
/// existing `X` remains -- bounding event history on flapping agents while
/// preserving every *unique* transition.
///
/// Idempotent: once the trailing cycle is removed, the list no longer ends
/// in the pattern this function looks for, so calling it again is a no-op
/// (spec §8 testable property).
pub fn compact_partition_events(events: &mut Vec<TransitionEvent>) {
    let len = events.len();
    if len < 3 {
        return;
    }
    let x_before = &events[len - 3];
    let partitioned = &events[len - 2];
    let x_after = &events[len - 1];

    if partitioned.status == Status::Partitioned && x_before.status == x_after.status && x_before.status != Status::Partitioned {
        events.truncate(len - 2);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(status: Status, t: u64) -> TransitionEvent {
        TransitionEvent {
            timestamp_millis: t,
            status,
            message: None,
            scheduler_host: "scheduler-1".into(),
        }
    }

    #[test]
    fn compacts_x_partitioned_x_cycle() {
        let mut events = vec![
            event(Status::Init, 0),
            event(Status::Pending, 1),
            event(Status::Assigned, 2),
            event(Status::Running, 10),
            event(Status::Partitioned, 20),
            event(Status::Running, 30),
        ];
        compact_partition_events(&mut events);
        assert_eq!(
            events,
            vec![
                event(Status::Init, 0),
                event(Status::Pending, 1),
                event(Status::Assigned, 2),
                event(Status::Running, 10),
            ]
        );
    }

    #[test]
    fn idempotent_when_applied_twice() {
        let mut events = vec![event(Status::Running, 10), event(Status::Partitioned, 20), event(Status::Running, 30)];
        compact_partition_events(&mut events);
        let once = events.clone();
        compact_partition_events(&mut events);
        assert_eq!(events, once);
    }

    #[test]
    fn does_not_compact_non_cycle() {
        let mut events = vec![event(Status::Running, 10), event(Status::Assigned, 20), event(Status::Running, 30)];
        let before = events.clone();
        compact_partition_events(&mut events);
        assert_eq!(events, before);
    }

    #[test]
    fn scenario_6_full_sequence() {
        // […, RUNNING@t1, PARTITIONED@t2, RUNNING@t3] transitions to
        // PARTITIONED@t4. Expected post-state: […, RUNNING@t1, PARTITIONED@t4].
        let mut events = vec![event(Status::Starting, 0), event(Status::Running, 1), event(Status::Partitioned, 2), event(Status::Running, 3)];
        compact_partition_events(&mut events);
        events.push(event(Status::Partitioned, 4));
        assert_eq!(events, vec![event(Status::Starting, 0), event(Status::Running, 1), event(Status::Partitioned, 4)]);
    }
}
