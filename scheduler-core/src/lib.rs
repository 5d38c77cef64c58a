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

//! Shared domain model, error type, configuration, clock abstraction and
//! external-collaborator traits for the cluster workload scheduler core.
//!
//! Mirrors `ballista-core`'s role in the teacher repository: the crate
//! every scheduling component depends on, with no scheduling logic of its
//! own.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod offer;
pub mod quota;
pub mod traits;

pub use error::{Error, Result};
