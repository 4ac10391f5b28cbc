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
//! Immutable plan descriptors for the aggregation node.
//!
//! These are produced by the embedding engine's plan lowering and treated as
//! validated, read-only inputs at operator preparation time.

use crate::common::ids::SlotId;
use crate::exec::expr::ExprId;
use arrow::datatypes::DataType;

/// Planner-declared type signature of one aggregate function.
#[derive(Clone, Debug)]
pub struct AggTypeSignature {
    pub intermediate_type: Option<DataType>,
    pub output_type: Option<DataType>,
    /// The declared type of the first input argument, when the planner
    /// needs to pin it (e.g. sum over boolean inputs).
    pub input_arg_type: Option<DataType>,
}

/// One aggregate function instance in the plan.
#[derive(Clone, Debug)]
pub struct AggFunction {
    /// Lowercased function name (e.g. "sum", "count").
    pub name: String,
    /// Input expressions for aggregate arguments; empty means COUNT(*)-style aggregate.
    pub inputs: Vec<ExprId>,
    /// Whether this aggregate consumes intermediate states from a previous
    /// aggregation stage (merge semantics instead of update semantics).
    pub input_is_intermediate: bool,
    pub types: Option<AggTypeSignature>,
}

/// Plan fragment configuration for one aggregation node.
///
/// `output_slots` carries the slot ids of the output schema in
/// [grouping columns..][aggregate columns..] order.
#[derive(Clone, Debug)]
pub struct AggregatePlan {
    pub group_by: Vec<ExprId>,
    pub functions: Vec<AggFunction>,
    /// False selects the serialize path: accumulator state is emitted in its
    /// intermediate representation for a later merge stage.
    pub need_finalize: bool,
    pub output_slots: Vec<SlotId>,
}
