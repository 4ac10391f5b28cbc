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
//! Type-specialized update routine for the aggregate hot loop.
//!
//! Construction succeeds only for a signature the fused code covers exactly;
//! every covered op mutates accumulator state with the same statements as the
//! interpreted kernel, so the two paths stay bit-identical.

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::DataType;

use super::functions::AggKind;
use super::state_types::{I64State, SumIntState};
use super::{AggKernelEntry, AggStateArena, AggStateRef};

enum SpecOp {
    CountStar { offset: usize },
    CountNonNull { offset: usize },
    SumInt64 { offset: usize },
    MinInt64 { offset: usize },
    MaxInt64 { offset: usize },
}

/// Fused update over all configured aggregate functions, monomorphized for
/// 64-bit integer inputs. Replaces the per-kernel view dispatch when every
/// function in the operator is covered.
pub struct SpecializedUpdate {
    ops: Vec<SpecOp>,
}

impl SpecializedUpdate {
    /// Returns `None` when any function's kind or input type falls outside
    /// the specialized surface; the caller falls back to the interpreted path.
    pub fn try_new(entries: &[AggKernelEntry]) -> Option<Self> {
        let mut ops = Vec::with_capacity(entries.len());
        for entry in entries {
            let offset = entry.state.offset;
            let op = match &entry.spec.kind {
                AggKind::Count => {
                    if entry.spec.count_all {
                        SpecOp::CountStar { offset }
                    } else {
                        SpecOp::CountNonNull { offset }
                    }
                }
                AggKind::SumInt => {
                    if entry.spec.input_arg_type != Some(DataType::Int64) {
                        return None;
                    }
                    SpecOp::SumInt64 { offset }
                }
                AggKind::MinInt => {
                    if entry.spec.input_arg_type != Some(DataType::Int64) {
                        return None;
                    }
                    SpecOp::MinInt64 { offset }
                }
                AggKind::MaxInt => {
                    if entry.spec.input_arg_type != Some(DataType::Int64) {
                        return None;
                    }
                    SpecOp::MaxInt64 { offset }
                }
                _ => return None,
            };
            ops.push(op);
        }
        Some(Self { ops })
    }

    pub fn update(
        &self,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        agg_arrays: &[Option<ArrayRef>],
    ) -> Result<(), String> {
        if agg_arrays.len() != self.ops.len() {
            return Err("specialized update arity mismatch".to_string());
        }
        for (op, array) in self.ops.iter().zip(agg_arrays.iter()) {
            match op {
                SpecOp::CountStar { offset } => {
                    for &base in states {
                        *arena.state_mut::<i64>(base, *offset) += 1;
                    }
                }
                SpecOp::CountNonNull { offset } => {
                    let array = array
                        .as_ref()
                        .ok_or_else(|| "count input missing".to_string())?;
                    if array.null_count() == 0 {
                        for &base in states {
                            *arena.state_mut::<i64>(base, *offset) += 1;
                        }
                    } else {
                        for (row, &base) in states.iter().enumerate() {
                            if !array.is_null(row) {
                                *arena.state_mut::<i64>(base, *offset) += 1;
                            }
                        }
                    }
                }
                SpecOp::SumInt64 { offset } => {
                    let arr = int64_input(array)?;
                    for (row, &base) in states.iter().enumerate() {
                        if arr.is_null(row) {
                            continue;
                        }
                        let state = arena.state_mut::<SumIntState>(base, *offset);
                        state.sum += arr.value(row);
                        state.has_value = true;
                    }
                }
                SpecOp::MinInt64 { offset } => {
                    let arr = int64_input(array)?;
                    for (row, &base) in states.iter().enumerate() {
                        if arr.is_null(row) {
                            continue;
                        }
                        let v = arr.value(row);
                        let state = arena.state_mut::<I64State>(base, *offset);
                        if !state.has_value || v < state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                SpecOp::MaxInt64 { offset } => {
                    let arr = int64_input(array)?;
                    for (row, &base) in states.iter().enumerate() {
                        if arr.is_null(row) {
                            continue;
                        }
                        let v = arr.value(row);
                        let state = arena.state_mut::<I64State>(base, *offset);
                        if !state.has_value || v > state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn int64_input<'a>(array: &'a Option<ArrayRef>) -> Result<&'a Int64Array, String> {
    let array = array
        .as_ref()
        .ok_or_else(|| "specialized input missing".to_string())?;
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| "specialized input is not Int64".to_string())
}
