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

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};

/// Build an integer output array in the declared output width, narrowing the
/// 64-bit accumulator representation back down.
pub(super) fn build_int_array(
    output_type: &DataType,
    values: Vec<Option<i64>>,
) -> Result<ArrayRef, String> {
    let array: ArrayRef = match output_type {
        DataType::Int64 => Arc::new(Int64Array::from(values)),
        DataType::Int32 => Arc::new(Int32Array::from(narrow::<i32>(values, output_type)?)),
        DataType::Int16 => Arc::new(Int16Array::from(narrow::<i16>(values, output_type)?)),
        DataType::Int8 => Arc::new(Int8Array::from(narrow::<i8>(values, output_type)?)),
        other => return Err(format!("int output type mismatch: {:?}", other)),
    };
    Ok(array)
}

fn narrow<T: TryFrom<i64>>(
    values: Vec<Option<i64>>,
    output_type: &DataType,
) -> Result<Vec<Option<T>>, String> {
    values
        .into_iter()
        .map(|v| match v {
            None => Ok(None),
            Some(v) => T::try_from(v)
                .map(Some)
                .map_err(|_| format!("aggregate value {} out of range for {:?}", v, output_type)),
        })
        .collect()
}

pub(super) fn build_float_array(
    output_type: &DataType,
    values: Vec<Option<f64>>,
) -> Result<ArrayRef, String> {
    let array: ArrayRef = match output_type {
        DataType::Float64 => Arc::new(Float64Array::from(values)),
        DataType::Float32 => Arc::new(Float32Array::from(
            values
                .into_iter()
                .map(|v| v.map(|v| v as f32))
                .collect::<Vec<_>>(),
        )),
        other => return Err(format!("float output type mismatch: {:?}", other)),
    };
    Ok(array)
}

pub(super) fn build_bool_array(values: Vec<Option<bool>>) -> Result<ArrayRef, String> {
    Ok(Arc::new(BooleanArray::from(values)))
}

pub(super) fn build_utf8_array(values: Vec<Option<String>>) -> Result<ArrayRef, String> {
    Ok(Arc::new(StringArray::from(values)))
}

pub(super) fn build_date32_array(values: Vec<Option<i32>>) -> Result<ArrayRef, String> {
    Ok(Arc::new(Date32Array::from(values)))
}

pub(super) fn build_timestamp_array(
    output_type: &DataType,
    values: Vec<Option<i64>>,
) -> Result<ArrayRef, String> {
    let DataType::Timestamp(unit, tz) = output_type else {
        return Err(format!("timestamp output type mismatch: {:?}", output_type));
    };
    let array: ArrayRef = match unit {
        TimeUnit::Second => {
            let arr = TimestampSecondArray::from(values);
            match tz {
                Some(tz) => Arc::new(arr.with_timezone(Arc::clone(tz))),
                None => Arc::new(arr),
            }
        }
        TimeUnit::Millisecond => {
            let arr = TimestampMillisecondArray::from(values);
            match tz {
                Some(tz) => Arc::new(arr.with_timezone(Arc::clone(tz))),
                None => Arc::new(arr),
            }
        }
        TimeUnit::Microsecond => {
            let arr = TimestampMicrosecondArray::from(values);
            match tz {
                Some(tz) => Arc::new(arr.with_timezone(Arc::clone(tz))),
                None => Arc::new(arr),
            }
        }
        TimeUnit::Nanosecond => {
            let arr = TimestampNanosecondArray::from(values);
            match tz {
                Some(tz) => Arc::new(arr.with_timezone(Arc::clone(tz))),
                None => Arc::new(arr),
            }
        }
    };
    Ok(array)
}
