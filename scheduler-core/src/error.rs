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

use std::fmt;

/// Crate-wide result alias, mirroring the teacher's `ballista_core::error::Result`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds per spec §7.
///
/// `Conflict` and the CAS-style outcomes are expected, caller-visible
/// conditions and are usually returned as part of a structured outcome
/// enum rather than through this type. `Error` itself is reserved for
/// transient collaborator failures and invariant violations (fatal bugs,
/// not runtime conditions).
#[derive(Debug)]
pub enum Error {
    /// An instance-id collision, a CAS mismatch, or a quota rejection:
    /// surfaced to the caller, never retried internally.
    Conflict(String),
    /// The storage collaborator's `write`/`read` failed transiently; the
    /// caller's scheduling pass aborts without partial commit.
    Storage(String),
    /// An unknown host was referenced during startup resolution.
    UnknownHost(String),
    /// An invariant the state machine or state manager is supposed to
    /// guarantee did not hold (e.g. `assignTask` returned a non-SUCCESS
    /// outcome, or `SAVE_STATE` was asked to save a task that no longer
    /// exists). Indicates a bug, not a runtime condition.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Conflict(msg) => write!(f, "conflict: {msg}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::UnknownHost(msg) => write!(f, "unknown host: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(format!("{err:#}"))
    }
}

impl Error {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}
