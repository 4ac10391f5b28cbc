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
use super::min::{
    build_minmax_array, build_minmax_view, drop_minmax_state, init_minmax_state,
    minmax_state_layout,
};
use super::AggregateFunction;

pub(super) struct MaxAgg;

fn max_spec_from_type(data_type: &DataType) -> Result<AggSpec, String> {
    let kind = match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => AggKind::MaxInt,
        DataType::Float32 | DataType::Float64 => AggKind::MaxFloat,
        DataType::Boolean => AggKind::MaxBool,
        DataType::Utf8 => AggKind::MaxUtf8,
        DataType::Date32 => AggKind::MaxDate32,
        DataType::Timestamp(_, _) => AggKind::MaxTimestamp,
        other => return Err(format!("max unsupported input type: {:?}", other)),
    };
    Ok(AggSpec {
        kind,
        output_type: data_type.clone(),
        intermediate_type: data_type.clone(),
        input_arg_type: None,
        count_all: false,
    })
}

impl AggregateFunction for MaxAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "max input type missing".to_string())?;
        max_spec_from_type(data_type)
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
            (AggKind::MaxInt, AggInputView::Int(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<I64State>(base, offset);
                        if !state.has_value || v > state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            (AggKind::MaxFloat, AggInputView::Float(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<F64State>(base, offset);
                        if !state.has_value || v > state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            (AggKind::MaxBool, AggInputView::Bool(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<BoolState>(base, offset);
                    if !state.has_value || (v & !state.value) {
                        state.value = v;
                        state.has_value = true;
                    }
                }
                Ok(())
            }
            (AggKind::MaxUtf8, AggInputView::Utf8(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<Utf8State>(base, offset);
                    match state.value.as_deref() {
                        Some(current) if current >= v => {}
                        _ => state.value = Some(v.to_string()),
                    }
                }
                Ok(())
            }
            (AggKind::MaxDate32, AggInputView::Date32(arr)) => {
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let v = arr.value(row);
                    let state = arena.state_mut::<I32State>(base, offset);
                    if !state.has_value || v > state.value {
                        state.value = v;
                        state.has_value = true;
                    }
                }
                Ok(())
            }
            (AggKind::MaxTimestamp, AggInputView::Timestamp(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<I64State>(base, offset);
                        if !state.has_value || v > state.value {
                            state.value = v;
                            state.has_value = true;
                        }
                    }
                }
                Ok(())
            }
            _ => Err("max input type mismatch".to_string()),
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
