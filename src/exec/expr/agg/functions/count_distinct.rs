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
use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, BooleanArray, Date32Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int64Builder, Int8Array, StringArray,
};
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;

use super::super::*;
use super::AggregateFunction;

type DistinctSet = HashSet<Vec<u8>>;

pub(super) struct CountDistinctAgg;

// The state slot holds an owning pointer to the heap set, created lazily on
// the first non-null value.
fn set_slot(ptr: *mut u8) -> *mut *mut DistinctSet {
    ptr as *mut *mut DistinctSet
}

unsafe fn get_or_init_set<'a>(ptr: *mut u8) -> &'a mut DistinctSet {
    let slot = set_slot(ptr);
    let raw = unsafe { *slot };
    if raw.is_null() {
        let boxed: Box<DistinctSet> = Box::new(HashSet::new());
        let raw = Box::into_raw(boxed);
        unsafe {
            *slot = raw;
            &mut *raw
        }
    } else {
        unsafe { &mut *raw }
    }
}

unsafe fn take_set(ptr: *mut u8) -> Option<Box<DistinctSet>> {
    let slot = set_slot(ptr);
    let raw = unsafe { *slot };
    if raw.is_null() {
        None
    } else {
        unsafe {
            *slot = std::ptr::null_mut();
            Some(Box::from_raw(raw))
        }
    }
}

fn encode_le<T: Copy>(v: T) -> Vec<u8> {
    // Only used for plain-old-data numeric scalars.
    unsafe {
        std::slice::from_raw_parts((&v as *const T) as *const u8, std::mem::size_of::<T>()).to_vec()
    }
}

fn serialize_set(set: &DistinctSet) -> Vec<u8> {
    let mut out = Vec::new();
    let count = set.len() as u32;
    out.extend_from_slice(&count.to_le_bytes());
    for v in set.iter() {
        let len = v.len() as u32;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(v);
    }
    out
}

fn deserialize_set(bytes: &[u8]) -> Result<Vec<Vec<u8>>, String> {
    if bytes.len() < 4 {
        return Err("invalid distinct set encoding".to_string());
    }
    let mut pos = 0usize;
    let count = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let mut vals = Vec::with_capacity(count);
    for _ in 0..count {
        if pos + 4 > bytes.len() {
            return Err("invalid distinct set encoding".to_string());
        }
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + len > bytes.len() {
            return Err("invalid distinct set encoding".to_string());
        }
        vals.push(bytes[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(vals)
}

impl AggregateFunction for CountDistinctAgg {
    fn build_spec_from_type(
        &self,
        _func: &AggFunction,
        input_type: Option<&DataType>,
        _input_is_intermediate: bool,
    ) -> Result<AggSpec, String> {
        if input_type.is_none() {
            return Err("count_distinct requires 1 argument".to_string());
        }
        Ok(AggSpec {
            kind: AggKind::CountDistinct,
            output_type: DataType::Int64,
            intermediate_type: DataType::Binary,
            input_arg_type: None,
            count_all: false,
        })
    }

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize) {
        match kind {
            AggKind::CountDistinct => (
                std::mem::size_of::<*mut DistinctSet>(),
                std::mem::align_of::<*mut DistinctSet>(),
            ),
            other => unreachable!("unexpected kind for count_distinct: {:?}", other),
        }
    }

    fn build_input_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "count_distinct input missing".to_string())?;
        Ok(AggInputView::Any(arr))
    }

    fn build_merge_view<'a>(
        &self,
        _spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        let arr = array
            .as_ref()
            .ok_or_else(|| "count_distinct intermediate input missing".to_string())?;
        let binary = arr
            .as_any()
            .downcast_ref::<BinaryArray>()
            .ok_or_else(|| "failed to downcast to BinaryArray".to_string())?;
        Ok(AggInputView::Binary(binary))
    }

    fn init_state(&self, _spec: &AggSpec, ptr: *mut u8) {
        unsafe {
            std::ptr::write(ptr as *mut *mut DistinctSet, std::ptr::null_mut());
        }
    }

    fn drop_state(&self, _spec: &AggSpec, ptr: *mut u8) {
        unsafe {
            let _ = take_set(ptr);
        }
    }

    fn update_batch(
        &self,
        _spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        let AggInputView::Any(array) = input else {
            return Err("count_distinct batch input type mismatch".to_string());
        };

        macro_rules! insert_primitive {
            ($arr_ty:ty, $encode:expr) => {{
                let arr = array
                    .as_any()
                    .downcast_ref::<$arr_ty>()
                    .ok_or_else(|| {
                        format!("failed to downcast to {}", stringify!($arr_ty))
                    })?;
                for (row, &base) in states.iter().enumerate() {
                    if arr.is_null(row) {
                        continue;
                    }
                    let ptr = arena.state_ptr(base, offset, std::mem::size_of::<*mut DistinctSet>());
                    let set = unsafe { get_or_init_set(ptr) };
                    set.insert($encode(arr.value(row)));
                }
                Ok(())
            }};
        }

        match array.data_type() {
            DataType::Int64 => insert_primitive!(Int64Array, encode_le),
            DataType::Int32 => insert_primitive!(Int32Array, encode_le),
            DataType::Int16 => insert_primitive!(Int16Array, encode_le),
            DataType::Int8 => insert_primitive!(Int8Array, encode_le),
            DataType::Date32 => insert_primitive!(Date32Array, encode_le),
            DataType::Float64 => insert_primitive!(Float64Array, |v: f64| encode_le(v.to_bits())),
            DataType::Float32 => insert_primitive!(Float32Array, |v: f32| encode_le(v.to_bits())),
            DataType::Boolean => insert_primitive!(BooleanArray, |v: bool| vec![v as u8]),
            DataType::Utf8 => {
                insert_primitive!(StringArray, |v: &str| v.as_bytes().to_vec())
            }
            DataType::Binary => insert_primitive!(BinaryArray, |v: &[u8]| v.to_vec()),
            other => Err(format!(
                "unsupported count_distinct input type: {:?}",
                other
            )),
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
        let AggInputView::Binary(arr) = input else {
            return Err("count_distinct merge input type mismatch".to_string());
        };

        for (row, &base) in states.iter().enumerate() {
            if arr.is_null(row) {
                continue;
            }
            let vals = deserialize_set(arr.value(row))?;
            let ptr = arena.state_ptr(base, offset, std::mem::size_of::<*mut DistinctSet>());
            let set = unsafe { get_or_init_set(ptr) };
            for v in vals {
                set.insert(v);
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
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        if output_intermediate {
            let mut builder = BinaryBuilder::new();
            for &base in group_states {
                let raw = *arena.state::<*mut DistinctSet>(base, offset);
                if raw.is_null() {
                    builder.append_value(0u32.to_le_bytes());
                } else {
                    let set = unsafe { &*raw };
                    builder.append_value(serialize_set(set));
                }
            }
            return Ok(Arc::new(builder.finish()));
        }

        let mut builder = Int64Builder::with_capacity(group_states.len());
        for &base in group_states {
            let raw = *arena.state::<*mut DistinctSet>(base, offset);
            let count = if raw.is_null() {
                0
            } else {
                unsafe { (*raw).len() }
            };
            builder.append_value(count as i64);
        }
        Ok(Arc::new(builder.finish()))
    }
}
