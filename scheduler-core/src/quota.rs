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

//! Quota store data model (spec §3): mapping from role to resource
//! aggregate, upsert semantics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaAggregate {
    pub cpu_cores: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
}

impl QuotaAggregate {
    pub fn fits(&self, used: &QuotaAggregate, request: &crate::model::ResourceRequest) -> bool {
        used.cpu_cores + request.cpu_cores <= self.cpu_cores
            && used.mem_mb + request.mem_mb <= self.mem_mb
            && used.disk_mb + request.disk_mb <= self.disk_mb
    }

    pub fn add(&mut self, request: &crate::model::ResourceRequest) {
        self.cpu_cores += request.cpu_cores;
        self.mem_mb += request.mem_mb;
        self.disk_mb += request.disk_mb;
    }
}

pub type QuotaByRole = BTreeMap<String, QuotaAggregate>;
