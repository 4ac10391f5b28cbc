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

use arrow::array::{ArrayRef, Float64Array, Float64Builder, Int64Array, StructArray};
use arrow::datatypes::{DataType, Field, Fields};

use crate::exec::node::aggregate::AggFunction;

use super::super::*;
use super::AggregateFunction;

pub(super) struct AvgAgg;

fn avg_intermediate_type() -> DataType {
    DataType::Struct(Fields::from(vec![
        Field::new("sum", DataType::Float64, true),
        Field::new("count", DataType::Int64, true),
    ]))
}

fn avg_spec_from_type(data_type: &DataType) -> Result<AggSpec, String> {
    let kind = match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => AggKind::AvgInt,
        DataType::Float32 | DataType::Float64 => AggKind::AvgFloat,
        other => return Err(format!("avg unsupported input type: {:?}", other)),
    };
    Ok(AggSpec {
        kind,
        output_type: DataType::Float64,
        intermediate_type: avg_intermediate_type(),
        input_arg_type: None,
        count_all: false,
    })
}

fn avg_spec_from_intermediate_type(data_type: &DataType) -> Result<AggSpec, String> {
    let DataType::Struct(fields) = data_type else {
        return Err(format!(
            "avg intermediate unsupported input type: {:?}",
            data_type
        ));
    };
    if fields.len() != 2 {
        return Err("avg intermediate expects 2 fields".to_string());
    }
    if !matches!(fields[0].data_type(), DataType::Float64) {
        return Err(format!(
            "avg intermediate sum type mismatch: {:?}",
            fields[0].data_type()
        ));
    }
    if !matches!(fields[1].data_type(), DataType::Int64) {
        return Err(format!(
            "avg intermediate count type mismatch: {:?}",
            fields[1].data_type()
        ));
    }
    Ok(AggSpec {
        kind: AggKind::AvgFloat,
        output_type: DataType::Float64,
        intermediate_type: data_type.clone(),
        input_arg_type: None,
        count_all: false,
    })
}

impl AggregateFunction for AvgAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        let data_type = input_type.ok_or_else(|| "avg input type missing".to_string())?;
        if input_is_intermediate {
            avg_spec_from_intermediate_type(data_type)
        } else {
            avg_spec_from_type(data_type)
        }
    }

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize) {
        match kind {
            AggKind::AvgInt | AggKind::AvgFloat => (
                std::mem::size_of::<AvgState>(),
                std::mem::align_of::<AvgState>(),
            ),
            other => unreachable!("unexpected kind for avg: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "avg input missing".to_string())?;
        match spec.kind {
            AggKind::AvgInt => Ok(AggInputView::Int(IntArrayView::new(arr)?)),
            AggKind::AvgFloat => Ok(AggInputView::Float(FloatArrayView::new(arr)?)),
            _ => Err("avg input type mismatch".to_string()),
        }
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "avg intermediate input missing".to_string())?;
        Ok(AggInputView::AvgState(AvgStateView::from_struct(arr)?))
    }

    fn init_state(&self, _spec: &AggSpec, ptr: *mut u8) {
        unsafe {
            std::ptr::write(ptr as *mut AvgState, AvgState { sum: 0.0, count: 0 });
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
        match (&spec.kind, input) {
            (AggKind::AvgInt, AggInputView::Int(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<AvgState>(base, offset);
                        state.sum += v as f64;
                        state.count += 1;
                    }
                }
                Ok(())
            }
            (AggKind::AvgFloat, AggInputView::Float(view)) => {
                for (row, &base) in states.iter().enumerate() {
                    if let Some(v) = view.value_at(row) {
                        let state = arena.state_mut::<AvgState>(base, offset);
                        state.sum += v;
                        state.count += 1;
                    }
                }
                Ok(())
            }
            _ => Err("avg update input type mismatch".to_string()),
        }
    }

    fn merge_batch(
        &self,
        _spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        let AggInputView::AvgState(view) = input else {
            return Err("avg merge input type mismatch".to_string());
        };
        for (row, &base) in states.iter().enumerate() {
            if let Some((sum, count)) = view.value_at(row) {
                let state = arena.state_mut::<AvgState>(base, offset);
                state.sum += sum;
                state.count += count;
            }
        }
        Ok(())
    }

    fn build_array(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        if output_intermediate {
            build_avg_intermediate_array(spec, offset, arena, group_states)
        } else {
            build_avg_array(offset, arena, group_states)
        }
    }
}

fn build_avg_intermediate_array(
    spec: &AggSpec,
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
) -> Result<ArrayRef, String> {
    let DataType::Struct(fields) = &spec.intermediate_type else {
        return Err("avg intermediate type is not a struct".to_string());
    };
    let mut sums = Vec::with_capacity(group_states.len());
    let mut counts = Vec::with_capacity(group_states.len());
    for &base in group_states {
        let state = arena.state::<AvgState>(base, offset);
        sums.push(Some(state.sum));
        counts.push(Some(state.count));
    }
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(sums)),
        Arc::new(Int64Array::from(counts)),
    ];
    let array = StructArray::try_new(fields.clone(), arrays, None).map_err(|e| e.to_string())?;
    Ok(Arc::new(array))
}

fn build_avg_array(
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
) -> Result<ArrayRef, String> {
    let mut builder = Float64Builder::with_capacity(group_states.len());
    for &base in group_states {
        let state = arena.state::<AvgState>(base, offset);
        if state.count > 0 {
            builder.append_value(state.sum / state.count as f64);
        } else {
            builder.append_null();
        }
    }
    Ok(Arc::new(builder.finish()))
}
