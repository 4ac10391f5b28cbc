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
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Builder, Int64Builder};
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;

use super::super::*;
use super::AggregateFunction;

pub(super) struct SumAgg;

fn sum_spec_from_type(data_type: &DataType) -> Result<AggSpec, String> {
    match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Ok(AggSpec {
            kind: AggKind::SumInt,
            output_type: DataType::Int64,
            intermediate_type: DataType::Int64,
            input_arg_type: None,
            count_all: false,
        }),
        DataType::Boolean => Ok(AggSpec {
            kind: AggKind::SumInt,
            output_type: DataType::Int64,
            intermediate_type: DataType::Int64,
            input_arg_type: None,
            count_all: false,
        }),
        DataType::Float32 | DataType::Float64 => Ok(AggSpec {
            kind: AggKind::SumFloat,
            output_type: DataType::Float64,
            intermediate_type: DataType::Float64,
            input_arg_type: None,
            count_all: false,
        }),
        other => Err(format!("sum unsupported input type: {:?}", other)),
    }
}

impl AggregateFunction for SumAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "sum input type missing".to_string())?;
        sum_spec_from_type(data_type)
    }

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize) {
        match kind {
            AggKind::SumInt => (
                std::mem::size_of::<SumIntState>(),
                std::mem::align_of::<SumIntState>(),
            ),
            AggKind::SumFloat => (
                std::mem::size_of::<SumFloatState>(),
                std::mem::align_of::<SumFloatState>(),
            ),
            other => unreachable!("unexpected kind for sum: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        match spec.kind {
            AggKind::SumInt => {
                let arr = array
                    .as_ref()
                    .ok_or_else(|| "sum input missing".to_string())?;
                if arr.data_type() == &DataType::Boolean {
                    let arr = arr
                        .as_any()
                        .downcast_ref::<arrow::array::BooleanArray>()
                        .ok_or_else(|| "failed to downcast to BooleanArray".to_string())?;
                    Ok(AggInputView::Bool(arr))
                } else {
                    Ok(AggInputView::Int(IntArrayView::new(arr)?))
                }
            }
            AggKind::SumFloat => {
                let arr = array
                    .as_ref()
                    .ok_or_else(|| "sum input missing".to_string())?;
                Ok(AggInputView::Float(FloatArrayView::new(arr)?))
            }
            _ => Err("sum input type mismatch".to_string()),
        }
    }

    fn build_merge_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        // The sum intermediate matches the output type, so merge reuses the
        // update kernels over the already-widened representation.
        match spec.kind {
            AggKind::SumInt => {
                let arr = array
                    .as_ref()
                    .ok_or_else(|| "sum intermediate input missing".to_string())?;
                Ok(AggInputView::Int(IntArrayView::new(arr)?))
            }
            AggKind::SumFloat => {
                let arr = array
                    .as_ref()
                    .ok_or_else(|| "sum intermediate input missing".to_string())?;
                Ok(AggInputView::Float(FloatArrayView::new(arr)?))
            }
            _ => Err("sum input type mismatch".to_string()),
        }
    }

    fn init_state(&self, spec: &AggSpec, ptr: *mut u8) {
        match spec.kind {
            AggKind::SumInt => unsafe {
                std::ptr::write(
                    ptr as *mut SumIntState,
                    SumIntState {
                        sum: 0,
                        has_value: false,
                    },
                );
            },
            AggKind::SumFloat => unsafe {
                std::ptr::write(
                    ptr as *mut SumFloatState,
                    SumFloatState {
                        sum: 0.0,
                        has_value: false,
                    },
                );
            },
            _ => {}
        }
    }

    fn drop_state(&self, _spec: &AggSpec, _ptr: *mut u8) {}

    fn update_batch(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        match spec.kind {
            AggKind::SumInt => update_sum_int(offset, arena, states, input),
            AggKind::SumFloat => update_sum_float(offset, arena, states, input),
            _ => Err("sum update kind mismatch".to_string()),
        }
    }

    fn merge_batch(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        // sum merge == sum update
        self.update_batch(spec, offset, arena, states, input)
    }

    fn build_array(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        _output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        match spec.kind {
            AggKind::SumInt => build_sum_int_array(offset, arena, group_states),
            AggKind::SumFloat => build_sum_float_array(offset, arena, group_states),
            _ => Err("sum output kind mismatch".to_string()),
        }
    }
}

fn update_sum_int(
    offset: usize,
    arena: &mut AggStateArena,
    states: &[AggStateRef],
    input: &AggInputView,
) -> Result<(), String> {
    match input {
        AggInputView::Int(view) => {
            for (row, &base) in states.iter().enumerate() {
                if let Some(v) = view.value_at(row) {
                    let state = arena.state_mut::<SumIntState>(base, offset);
                    state.sum += v;
                    state.has_value = true;
                }
            }
            Ok(())
        }
        AggInputView::Bool(arr) => {
            for (row, &base) in states.iter().enumerate() {
                if arr.is_null(row) {
                    continue;
                }
                let state = arena.state_mut::<SumIntState>(base, offset);
                state.sum += i64::from(arr.value(row));
                state.has_value = true;
            }
            Ok(())
        }
        _ => Err("sum int input type mismatch".to_string()),
    }
}

fn update_sum_float(
    offset: usize,
    arena: &mut AggStateArena,
    states: &[AggStateRef],
    input: &AggInputView,
) -> Result<(), String> {
    match input {
        AggInputView::Float(view) => {
            for (row, &base) in states.iter().enumerate() {
                if let Some(v) = view.value_at(row) {
                    let state = arena.state_mut::<SumFloatState>(base, offset);
                    state.sum += v;
                    state.has_value = true;
                }
            }
            Ok(())
        }
        _ => Err("sum float input type mismatch".to_string()),
    }
}

fn build_sum_int_array(
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
) -> Result<ArrayRef, String> {
    let mut builder = Int64Builder::with_capacity(group_states.len());
    for &base in group_states {
        let state = arena.state::<SumIntState>(base, offset);
        if state.has_value {
            builder.append_value(state.sum);
        } else {
            builder.append_null();
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn build_sum_float_array(
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
) -> Result<ArrayRef, String> {
    let mut builder = Float64Builder::with_capacity(group_states.len());
    for &base in group_states {
        let state = arena.state::<SumFloatState>(base, offset);
        if state.has_value {
            builder.append_value(state.sum);
        } else {
            builder.append_null();
        }
    }
    Ok(Arc::new(builder.finish()))
}
