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
    Array, ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

use crate::common::ids::SlotId;
use crate::exec::chunk::field_with_slot_id;
use crate::exec::expr::agg::AggKernelEntry;
use crate::exec::hash_table::hash::{canonical_f32_bits, canonical_f64_bits};
use crate::exec::hash_table::key_builder::GroupKeyArrayView;

/// Columnar storage for the grouping values of every group, in dense
/// group-id order. Values are appended exactly once, when the owning key is
/// first inserted, and never mutated afterwards.
pub(crate) enum KeyColumn {
    Int8 { values: Vec<Option<i8>> },
    Int16 { values: Vec<Option<i16>> },
    Int32 { values: Vec<Option<i32>> },
    Int64 { values: Vec<Option<i64>> },
    Float32 { values: Vec<Option<f32>> },
    Float64 { values: Vec<Option<f64>> },
    Boolean { values: Vec<Option<bool>> },
    Utf8 { values: Vec<Option<String>> },
    Date32 { values: Vec<Option<i32>> },
    Timestamp {
        unit: TimeUnit,
        tz: Option<Arc<str>>,
        values: Vec<Option<i64>>,
    },
}

pub(crate) fn key_column_from_type(data_type: &DataType) -> Result<KeyColumn, String> {
    let column = match data_type {
        DataType::Int8 => KeyColumn::Int8 { values: Vec::new() },
        DataType::Int16 => KeyColumn::Int16 { values: Vec::new() },
        DataType::Int32 => KeyColumn::Int32 { values: Vec::new() },
        DataType::Int64 => KeyColumn::Int64 { values: Vec::new() },
        DataType::Float32 => KeyColumn::Float32 { values: Vec::new() },
        DataType::Float64 => KeyColumn::Float64 { values: Vec::new() },
        DataType::Boolean => KeyColumn::Boolean { values: Vec::new() },
        DataType::Utf8 => KeyColumn::Utf8 { values: Vec::new() },
        DataType::Date32 => KeyColumn::Date32 { values: Vec::new() },
        DataType::Timestamp(unit, tz) => KeyColumn::Timestamp {
            unit: *unit,
            tz: tz.clone(),
            values: Vec::new(),
        },
        other => return Err(format!("unsupported group by type: {:?}", other)),
    };
    Ok(column)
}

impl KeyColumn {
    pub(crate) fn len(&self) -> usize {
        match self {
            KeyColumn::Int8 { values } => values.len(),
            KeyColumn::Int16 { values } => values.len(),
            KeyColumn::Int32 { values } => values.len(),
            KeyColumn::Int64 { values } => values.len(),
            KeyColumn::Float32 { values } => values.len(),
            KeyColumn::Float64 { values } => values.len(),
            KeyColumn::Boolean { values } => values.len(),
            KeyColumn::Utf8 { values } => values.len(),
            KeyColumn::Date32 { values } => values.len(),
            KeyColumn::Timestamp { values, .. } => values.len(),
        }
    }

    pub(crate) fn data_type(&self) -> DataType {
        match self {
            KeyColumn::Int8 { .. } => DataType::Int8,
            KeyColumn::Int16 { .. } => DataType::Int16,
            KeyColumn::Int32 { .. } => DataType::Int32,
            KeyColumn::Int64 { .. } => DataType::Int64,
            KeyColumn::Float32 { .. } => DataType::Float32,
            KeyColumn::Float64 { .. } => DataType::Float64,
            KeyColumn::Boolean { .. } => DataType::Boolean,
            KeyColumn::Utf8 { .. } => DataType::Utf8,
            KeyColumn::Date32 { .. } => DataType::Date32,
            KeyColumn::Timestamp { unit, tz, .. } => DataType::Timestamp(*unit, tz.clone()),
        }
    }

    /// Append the value at `row` of the evaluated key column.
    /// Returns the approximate number of bytes the append retains.
    pub(crate) fn push_value_from_view(
        &mut self,
        view: &GroupKeyArrayView<'_>,
        row: usize,
    ) -> Result<usize, String> {
        match (self, view) {
            (KeyColumn::Int8 { values }, GroupKeyArrayView::Int8(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(2)
            }
            (KeyColumn::Int16 { values }, GroupKeyArrayView::Int16(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(3)
            }
            (KeyColumn::Int32 { values }, GroupKeyArrayView::Int32(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(5)
            }
            (KeyColumn::Int64 { values }, GroupKeyArrayView::Int64(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(9)
            }
            (KeyColumn::Float32 { values }, GroupKeyArrayView::Float32(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(5)
            }
            (KeyColumn::Float64 { values }, GroupKeyArrayView::Float64(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(9)
            }
            (KeyColumn::Boolean { values }, GroupKeyArrayView::Boolean(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(2)
            }
            (KeyColumn::Utf8 { values }, GroupKeyArrayView::Utf8(arr)) => {
                if arr.is_null(row) {
                    values.push(None);
                    Ok(1)
                } else {
                    let v = arr.value(row).to_string();
                    let bytes = v.len() + 1;
                    values.push(Some(v));
                    Ok(bytes)
                }
            }
            (KeyColumn::Date32 { values }, GroupKeyArrayView::Date32(arr)) => {
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
                Ok(5)
            }
            (KeyColumn::Timestamp { unit, values, .. }, GroupKeyArrayView::Other(arr)) => {
                values.push(timestamp_value_at(arr, *unit, row)?);
                Ok(9)
            }
            _ => Err("group key column/view type mismatch".to_string()),
        }
    }

    /// Compare the stored value of `group_id` against the evaluated value at
    /// `row`. NULLs compare equal to NULLs; every float NaN compares equal so
    /// NaN keys form a single group.
    pub(crate) fn value_equals(
        &self,
        group_id: usize,
        view: &GroupKeyArrayView<'_>,
        row: usize,
    ) -> Result<bool, String> {
        let out_of_bounds = || format!("group id {} out of bounds", group_id);
        match (self, view) {
            (KeyColumn::Int8 { values }, GroupKeyArrayView::Int8(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            (KeyColumn::Int16 { values }, GroupKeyArrayView::Int16(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            (KeyColumn::Int32 { values }, GroupKeyArrayView::Int32(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            (KeyColumn::Int64 { values }, GroupKeyArrayView::Int64(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            (KeyColumn::Float32 { values }, GroupKeyArrayView::Float32(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                let probe = (!arr.is_null(row)).then(|| arr.value(row));
                Ok(match (stored, probe) {
                    (None, None) => true,
                    (Some(a), Some(b)) => canonical_f32_bits(*a) == canonical_f32_bits(b),
                    _ => false,
                })
            }
            (KeyColumn::Float64 { values }, GroupKeyArrayView::Float64(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                let probe = (!arr.is_null(row)).then(|| arr.value(row));
                Ok(match (stored, probe) {
                    (None, None) => true,
                    (Some(a), Some(b)) => canonical_f64_bits(*a) == canonical_f64_bits(b),
                    _ => false,
                })
            }
            (KeyColumn::Boolean { values }, GroupKeyArrayView::Boolean(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            (KeyColumn::Date32 { values }, GroupKeyArrayView::Date32(arr)) => {
                let stored = values.get(group_id).ok_or_else(out_of_bounds)?;
                Ok(*stored == (!arr.is_null(row)).then(|| arr.value(row)))
            }
            _ => Err("group key column/view type mismatch".to_string()),
        }
    }

    /// Materialize `len` stored grouping values starting at `start` as an
    /// Arrow array, used to re-project output chunks batch by batch.
    pub(crate) fn to_array_range(&self, start: usize, len: usize) -> Result<ArrayRef, String> {
        let end = start + len;
        if end > self.len() {
            return Err(format!(
                "group key range {}..{} out of bounds (groups={})",
                start,
                end,
                self.len()
            ));
        }
        let array: ArrayRef = match self {
            KeyColumn::Int8 { values } => Arc::new(Int8Array::from(values[start..end].to_vec())),
            KeyColumn::Int16 { values } => Arc::new(Int16Array::from(values[start..end].to_vec())),
            KeyColumn::Int32 { values } => Arc::new(Int32Array::from(values[start..end].to_vec())),
            KeyColumn::Int64 { values } => Arc::new(Int64Array::from(values[start..end].to_vec())),
            KeyColumn::Float32 { values } => {
                Arc::new(Float32Array::from(values[start..end].to_vec()))
            }
            KeyColumn::Float64 { values } => {
                Arc::new(Float64Array::from(values[start..end].to_vec()))
            }
            KeyColumn::Boolean { values } => {
                Arc::new(BooleanArray::from(values[start..end].to_vec()))
            }
            KeyColumn::Utf8 { values } => Arc::new(StringArray::from(values[start..end].to_vec())),
            KeyColumn::Date32 { values } => {
                Arc::new(Date32Array::from(values[start..end].to_vec()))
            }
            KeyColumn::Timestamp { unit, tz, values } => {
                let slice = values[start..end].to_vec();
                timestamp_array_from(slice, *unit, tz.clone())
            }
        };
        Ok(array)
    }
}

fn timestamp_value_at(
    array: &ArrayRef,
    unit: TimeUnit,
    row: usize,
) -> Result<Option<i64>, String> {
    if array.is_null(row) {
        return Ok(None);
    }
    let value = match unit {
        TimeUnit::Second => array
            .as_any()
            .downcast_ref::<TimestampSecondArray>()
            .ok_or_else(|| "failed to downcast to TimestampSecondArray".to_string())?
            .value(row),
        TimeUnit::Millisecond => array
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .ok_or_else(|| "failed to downcast to TimestampMillisecondArray".to_string())?
            .value(row),
        TimeUnit::Microsecond => array
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| "failed to downcast to TimestampMicrosecondArray".to_string())?
            .value(row),
        TimeUnit::Nanosecond => array
            .as_any()
            .downcast_ref::<TimestampNanosecondArray>()
            .ok_or_else(|| "failed to downcast to TimestampNanosecondArray".to_string())?
            .value(row),
    };
    Ok(Some(value))
}

fn timestamp_array_from(values: Vec<Option<i64>>, unit: TimeUnit, tz: Option<Arc<str>>) -> ArrayRef {
    match unit {
        TimeUnit::Second => {
            let arr = TimestampSecondArray::from(values);
            Arc::new(match tz {
                Some(tz) => arr.with_timezone(tz),
                None => arr,
            })
        }
        TimeUnit::Millisecond => {
            let arr = TimestampMillisecondArray::from(values);
            Arc::new(match tz {
                Some(tz) => arr.with_timezone(tz),
                None => arr,
            })
        }
        TimeUnit::Microsecond => {
            let arr = TimestampMicrosecondArray::from(values);
            Arc::new(match tz {
                Some(tz) => arr.with_timezone(tz),
                None => arr,
            })
        }
        TimeUnit::Nanosecond => {
            let arr = TimestampNanosecondArray::from(values);
            Arc::new(match tz {
                Some(tz) => arr.with_timezone(tz),
                None => arr,
            })
        }
    }
}

/// Build the output chunk schema: grouping columns first, then one column per
/// aggregate kernel, with slot ids taken from the plan's output slot list.
pub(crate) fn build_output_schema(
    key_columns: &[KeyColumn],
    kernels: &[AggKernelEntry],
    output_intermediate: bool,
    output_slots: &[SlotId],
) -> Result<SchemaRef, String> {
    let total = key_columns.len() + kernels.len();
    if output_slots.len() != total {
        return Err(format!(
            "output slot count mismatch: keys={} aggregates={} output_slots={}",
            key_columns.len(),
            kernels.len(),
            output_slots.len()
        ));
    }
    let mut fields = Vec::with_capacity(total);
    for (idx, column) in key_columns.iter().enumerate() {
        let slot_id = output_slots[idx];
        fields.push(field_with_slot_id(
            Field::new(format!("col_{}", slot_id), column.data_type(), true),
            slot_id,
        ));
    }
    for (idx, kernel) in kernels.iter().enumerate() {
        let slot_id = output_slots[key_columns.len() + idx];
        fields.push(field_with_slot_id(
            Field::new(
                format!("col_{}", slot_id),
                kernel.output_type(output_intermediate),
                true,
            ),
            slot_id,
        ));
    }
    Ok(Arc::new(Schema::new(fields)))
}
