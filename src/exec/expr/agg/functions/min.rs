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
use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;

use super::super::*;
use super::common;
use super::AggregateFunction;

pub(super) struct MinAgg;

fn min_spec_from_type(data_type: &DataType) -> Result<AggSpec, String> {
    let kind = match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => AggKind::MinInt,
        DataType::Float32 | DataType::Float64 => AggKind::MinFloat,
        DataType::Boolean => AggKind::MinBool,
        DataType::Utf8 => AggKind::MinUtf8,
        DataType::Date32 => AggKind::MinDate32,
        DataType::Timestamp(_, _) => AggKind::MinTimestamp,
        other => return Err(format!("min unsupported input type: {:?}", other)),
    };
    Ok(AggSpec {
        kind,
        output_type: data_type.clone(),
        intermediate_type: data_type.clone(),
        input_arg_type: None,
        count_all: false,
    })
}

impl AggregateFunction for MinAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "min input type missing".to_string())?;
        min_spec_from_type(data_type)
    }

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize) {
        minmax_state_layout(kind)
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        build_minmax_view(&spec.kind, array)
    }

    fn build_merge_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        // min intermediate == input representation; merge reuses update.
        build_minmax_view(&spec.kind, array)
    }

    fn init_state(&self, spec: &AggSpec, ptr: *mut u8) {
        init_minmax_state(&spec.kind, ptr);
    }

    fn drop_state(&self, spec: &AggSpec, ptr: *mut u8) {
        drop_minmax_state(&spec.kind, ptr);
    }

    fn update_batch(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        match (&spec.kind, input) {
            (AggKind::MinInt, AggInputView::Int(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<I64State>(base, offset);
                        if !state.has_value || v < state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            (AggKind::MinFloat, AggInputView::Float(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<F64State>(base, offset);
                        if !state.has_value || v < state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            (AggKind::MinBool, AggInputView::Bool(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<BoolState>(base, offset);
                    if !state.has_value || (!v & state.value) {
                        state.value = v;
                        state.has_value = true;
                    }
                }
                Ok(())
            }
            (AggKind::MinUtf8, AggInputView::Utf8(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<Utf8State>(base, offset);
                    match state.value.as_deref() {
                        Some(current) if current <= v => {}
                        _ => state.value = Some(v.to_string()),
                    }
                }
                Ok(())
            }
            (AggKind::MinDate32, AggInputView::Date32(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<I32State>(base, offset);
                    if !state.has_value || v < state.value {
                        state.value = v;
                        state.has_value = true;
                    }
                }
                Ok(())
            }
            (AggKind::MinTimestamp, AggInputView::Timestamp(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<I64State>(base, offset);
                        if !state.has_value || v < state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            _ => Err("min input type mismatch".to_string()),
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
        self.update_batch(spec, offset, arena, states, input)
    }

    fn build_array(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        let target_type = if output_intermediate {
            &spec.intermediate_type
        } else {
            &spec.output_type
        };
        build_minmax_array(&spec.kind, target_type, offset, arena, group_states)
    }
}

pub(super) fn minmax_state_layout(kind: &AggKind) -> (usize, usize) {
    match kind {
        AggKind::MinInt | AggKind::MaxInt | AggKind::MinTimestamp | AggKind::MaxTimestamp => (
            std::mem::size_of::<I64State>(),
            std::mem::align_of::<I64State>(),
        ),
        AggKind::MinFloat | AggKind::MaxFloat => (
            std::mem::size_of::<F64State>(),
            std::mem::align_of::<F64State>(),
        ),
        AggKind::MinBool | AggKind::MaxBool => (
            std::mem::size_of::<BoolState>(),
            std::mem::align_of::<BoolState>(),
        ),
        AggKind::MinUtf8 | AggKind::MaxUtf8 => (
            std::mem::size_of::<Utf8State>(),
            std::mem::align_of::<Utf8State>(),
        ),
        AggKind::MinDate32 | AggKind::MaxDate32 => (
            std::mem::size_of::<I32State>(),
            std::mem::align_of::<I32State>(),
        ),
        other => unreachable!("unexpected kind for min/max: {:?}", other),
    }
}

pub(super) fn build_minmax_view<'a>(
    kind: &AggKind,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    let arr = array
        .as_ref()
        .ok_or_else(|| "min/max input missing".to_string())?;
    match kind {
        AggKind::MinInt | AggKind::MaxInt => Ok(AggInputView::Int(IntArrayView::new(arr)?)),
        AggKind::MinFloat | AggKind::MaxFloat => {
            Ok(AggInputView::Float(FloatArrayView::new(arr)?))
        }
        AggKind::MinBool | AggKind::MaxBool => {
            let arr = arr
                .as_any()
                .downcast_ref::<arrow::array::BooleanArray>()
                .ok_or_else(|| "failed to downcast to BooleanArray".to_string())?;
            Ok(AggInputView::Bool(arr))
        }
        AggKind::MinUtf8 | AggKind::MaxUtf8 => {
            let arr = arr
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .ok_or_else(|| "failed to downcast to StringArray".to_string())?;
            Ok(AggInputView::Utf8(arr))
        }
        AggKind::MinDate32 | AggKind::MaxDate32 => {
            let arr = arr
                .as_any()
                .downcast_ref::<arrow::array::Date32Array>()
                .ok_or_else(|| "failed to downcast to Date32Array".to_string())?;
            Ok(AggInputView::Date32(arr))
        }
        AggKind::MinTimestamp | AggKind::MaxTimestamp => {
            Ok(AggInputView::Timestamp(TimestampArrayView::new(arr)?))
        }
        other => Err(format!("unexpected kind for min/max view: {:?}", other)),
    }
}

pub(super) fn init_minmax_state(kind: &AggKind, ptr: *mut u8) {
    match kind {
        AggKind::MinInt | AggKind::MaxInt | AggKind::MinTimestamp | AggKind::MaxTimestamp => unsafe {
            std::ptr::write(ptr as *mut I64State, I64State::default());
        },
        AggKind::MinFloat | AggKind::MaxFloat => unsafe {
            std::ptr::write(ptr as *mut F64State, F64State::default());
        },
        AggKind::MinBool | AggKind::MaxBool => unsafe {
            std::ptr::write(ptr as *mut BoolState, BoolState::default());
        },
        AggKind::MinUtf8 | AggKind::MaxUtf8 => unsafe {
            std::ptr::write(ptr as *mut Utf8State, Utf8State::default());
        },
        AggKind::MinDate32 | AggKind::MaxDate32 => unsafe {
            std::ptr::write(ptr as *mut I32State, I32State::default());
        },
        _ => {}
    }
}

pub(super) fn drop_minmax_state(kind: &AggKind, ptr: *mut u8) {
    if matches!(kind, AggKind::MinUtf8 | AggKind::MaxUtf8) {
        unsafe {
            std::ptr::drop_in_place(ptr as *mut Utf8State);
        }
    }
}

pub(super) fn build_minmax_array(
    kind: &AggKind,
    target_type: &DataType,
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
) -> Result<ArrayRef, String> {
    match kind {
        AggKind::MinInt | AggKind::MaxInt => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<I64State>(base, offset);
                values.push(state.has_value.then_some(state.value));
            }
            common::build_int_array(target_type, values)
        }
        AggKind::MinFloat | AggKind::MaxFloat => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<F64State>(base, offset);
                values.push(state.has_value.then_some(state.value));
            }
            common::build_float_array(target_type, values)
        }
        AggKind::MinBool | AggKind::MaxBool => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<BoolState>(base, offset);
                values.push(state.has_value.then_some(state.value));
            }
            common::build_bool_array(values)
        }
        AggKind::MinUtf8 | AggKind::MaxUtf8 => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<Utf8State>(base, offset);
                values.push(state.value.clone());
            }
            common::build_utf8_array(values)
        }
        AggKind::MinDate32 | AggKind::MaxDate32 => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<I32State>(base, offset);
                values.push(state.has_value.then_some(state.value));
            }
            common::build_date32_array(values)
        }
        AggKind::MinTimestamp | AggKind::MaxTimestamp => {
            let mut values = Vec::with_capacity(group_states.len());
            for &base in group_states {
                let state = arena.state::<I64State>(base, offset);
                values.push(state.has_value.then_some(state.value));
            }
            common::build_timestamp_array(target_type, values)
        }
        other => Err(format!("unexpected kind for min/max output: {:?}", other)),
    }
}
