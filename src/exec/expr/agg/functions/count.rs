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

use arrow::array::{Array, ArrayRef, Int64Builder};
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;

use super::super::*;
use super::AggregateFunction;

pub(super) struct CountAgg;

impl AggregateFunction for CountAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        Ok(AggSpec {
            kind: AggKind::Count,
            output_type: DataType::Int64,
            intermediate_type: DataType::Int64,
            input_arg_type: None,
            count_all: input_type.is_none(),
        })
    }

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize) {
        match kind {
            AggKind::Count => (std::mem::size_of::<i64>(), std::mem::align_of::<i64>()),
            other => unreachable!("unexpected kind for count: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        if spec.count_all {
            Ok(AggInputView::None)
        } else {
            let arr = array
                .as_ref()
                .ok_or_else(|| "count input missing".to_string())?;
            Ok(AggInputView::Any(arr))
        }
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "count intermediate input missing".to_string())?;
        Ok(AggInputView::Int(IntArrayView::new(arr)?))
    }

    fn init_state(&self, _spec: &AggSpec, ptr: *mut u8) {
        unsafe {
            std::ptr::write(ptr as *mut i64, 0);
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
        match input {
            AggInputView::None => {
                for &base in states {
                    *arena.state_mut::<i64>(base, offset) += 1;
                }
                Ok(())
            }
            AggInputView::Any(array) => {
                if spec.count_all || array.null_count() == 0 {
                    for &base in states {
                        *arena.state_mut::<i64>(base, offset) += 1;
                    }
                } else {
                    for (row, &base) in states.iter().enumerate() {
                        if !array.is_null(row) {
                            *arena.state_mut::<i64>(base, offset) += 1;
                        }
                    }
                }
                Ok(())
            }
            _ => Err("count batch input type mismatch".to_string()),
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
        let AggInputView::Int(view) = input else {
            return Err("count merge batch input type mismatch".to_string());
        };
        for (row, &base) in states.iter().enumerate() {
            if let Some(v) = view.value_at(row) {
                *arena.state_mut::<i64>(base, offset) += v;
            }
        }
        Ok(())
    }

    fn build_array(
        &self,
        _spec: &AggSpec,
        offset: usize,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        _output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        let mut builder = Int64Builder::with_capacity(group_states.len());
        for &base in group_states {
            builder.append_value(*arena.state::<i64>(base, offset));
        }
        Ok(Arc::new(builder.finish()))
    }
}
