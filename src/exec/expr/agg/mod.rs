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
//! Aggregate function kernels and their state storage.
//!
//! Responsibilities:
//! - Resolves plan-level function descriptors into typed kernel specs with a
//!   fixed accumulator layout computed once at preparation time.
//! - Provides init/update/merge/serialize/finalize over per-group state
//!   records allocated from a budget-checked arena.
//!
//! Key exported interfaces:
//! - Types: `AggKernelSet`, `AggKernelEntry`, `AggStateArena`, `AggStateRef`.

mod views;
pub use views::*;
mod spec;
use spec::*;
mod kernel;
pub use kernel::*;

mod specialized;
pub use specialized::SpecializedUpdate;

mod state_types;
use state_types::*;
mod functions;
pub(in crate::exec::expr::agg) use functions::AggKind;
