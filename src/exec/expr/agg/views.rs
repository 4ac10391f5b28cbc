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
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, StringArray, StructArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};

/// Typed per-batch view over one aggregate input column.
///
/// Built once per batch by the owning kernel; per-row access is a plain
/// match with no further downcasts.
pub enum AggInputView<'a> {
    None,
    Any(&'a ArrayRef),
    Int(IntArrayView<'a>),
    Float(FloatArrayView<'a>),
    Bool(&'a BooleanArray),
    Utf8(&'a StringArray),
    Binary(&'a BinaryArray),
    Date32(&'a Date32Array),
    Timestamp(TimestampArrayView<'a>),
    AvgState(AvgStateView<'a>),
}

#[derive(Clone, Debug)]
pub enum IntArrayView<'a> {
    Int64(&'a Int64Array),
    Int32(&'a Int32Array),
    Int16(&'a Int16Array),
    Int8(&'a Int8Array),
}

impl<'a> IntArrayView<'a> {
    pub fn new(array: &'a ArrayRef) -> Result<Self, String> {
        match array.data_type() {
            DataType::Int64 => array
                .as_any()
                .downcast_ref::<Int64Array>()
                .map(Self::Int64)
                .ok_or_else(|| "failed to downcast to Int64Array".to_string()),
            DataType::Int32 => array
                .as_any()
                .downcast_ref::<Int32Array>()
                .map(Self::Int32)
                .ok_or_else(|| "failed to downcast to Int32Array".to_string()),
            DataType::Int16 => array
                .as_any()
                .downcast_ref::<Int16Array>()
                .map(Self::Int16)
                .ok_or_else(|| "failed to downcast to Int16Array".to_string()),
            DataType::Int8 => array
                .as_any()
                .downcast_ref::<Int8Array>()
                .map(Self::Int8)
                .ok_or_else(|| "failed to downcast to Int8Array".to_string()),
            other => Err(format!("unsupported int input type: {:?}", other)),
        }
    }

    pub fn value_at(&self, row: usize) -> Option<i64> {
        match self {
            IntArrayView::Int64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            IntArrayView::Int32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            IntArrayView::Int16(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            IntArrayView::Int8(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
        }
    }
}

#[derive(Clone, Debug)]
pub enum FloatArrayView<'a> {
    Float64(&'a Float64Array),
    Float32(&'a Float32Array),
}

impl<'a> FloatArrayView<'a> {
    pub fn new(array: &'a ArrayRef) -> Result<Self, String> {
        match array.data_type() {
            DataType::Float64 => array
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(Self::Float64)
                .ok_or_else(|| "failed to downcast to Float64Array".to_string()),
            DataType::Float32 => array
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(Self::Float32)
                .ok_or_else(|| "failed to downcast to Float32Array".to_string()),
            other => Err(format!("unsupported float input type: {:?}", other)),
        }
    }

    pub fn value_at(&self, row: usize) -> Option<f64> {
        match self {
            FloatArrayView::Float64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            FloatArrayView::Float32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as f64),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TimestampArrayView<'a> {
    Second(&'a TimestampSecondArray),
    Millisecond(&'a TimestampMillisecondArray),
    Microsecond(&'a TimestampMicrosecondArray),
    Nanosecond(&'a TimestampNanosecondArray),
}

impl<'a> TimestampArrayView<'a> {
    pub fn new(array: &'a ArrayRef) -> Result<Self, String> {
        let DataType::Timestamp(unit, _) = array.data_type() else {
            return Err(format!(
                "unsupported timestamp input type: {:?}",
                array.data_type()
            ));
        };
        match unit {
            TimeUnit::Second => array
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .map(Self::Second)
                .ok_or_else(|| "failed to downcast to TimestampSecondArray".to_string()),
            TimeUnit::Millisecond => array
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .map(Self::Millisecond)
                .ok_or_else(|| "failed to downcast to TimestampMillisecondArray".to_string()),
            TimeUnit::Microsecond => array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .map(Self::Microsecond)
                .ok_or_else(|| "failed to downcast to TimestampMicrosecondArray".to_string()),
            TimeUnit::Nanosecond => array
                .as_any()
                .downcast_ref::<TimestampNanosecondArray>()
                .map(Self::Nanosecond)
                .ok_or_else(|| "failed to downcast to TimestampNanosecondArray".to_string()),
        }
    }

    pub fn value_at(&self, row: usize) -> Option<i64> {
        match self {
            TimestampArrayView::Second(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            TimestampArrayView::Millisecond(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            TimestampArrayView::Microsecond(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            TimestampArrayView::Nanosecond(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
        }
    }
}

/// View over a [sum, count] struct column carrying avg intermediate state.
pub struct AvgStateView<'a> {
    pub(crate) sums: FloatArrayView<'a>,
    pub(crate) counts: IntArrayView<'a>,
}

impl<'a> AvgStateView<'a> {
    pub(crate) fn from_struct(array: &'a ArrayRef) -> Result<Self, String> {
        let arr = array
            .as_any()
            .downcast_ref::<StructArray>()
            .ok_or_else(|| "failed to downcast to StructArray".to_string())?;
        if arr.num_columns() != 2 {
            return Err(format!(
                "avg intermediate expects 2 fields, got {}",
                arr.num_columns()
            ));
        }
        let sums = FloatArrayView::new(arr.column(0))?;
        let counts = IntArrayView::new(arr.column(1))?;
        Ok(Self { sums, counts })
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<(f64, i64)> {
        let sum = self.sums.value_at(row)?;
        let count = self.counts.value_at(row)?;
        Some((sum, count))
    }
}
