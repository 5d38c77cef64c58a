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

//! Scheduling filter, task state machine, offer manager, task scheduler,
//! preemptor and reconciliation loop for the cluster workload scheduler
//! core. `scheduler-core` owns the data model and collaborator traits;
//! this crate owns everything that decides what happens to a task.

pub mod filter;
pub mod fsm;
pub mod offer;
pub mod preemptor;
pub mod reconciliation;
pub mod scheduler;
pub mod state_manager;
pub mod wiring;

pub use preemptor::Preemptor;
pub use reconciliation::ReconciliationScheduler;
pub use scheduler::TaskScheduler;
pub use state_manager::StateManager;
pub use wiring::SchedulerCore;
