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
    Array, ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, StringArray,
};
use arrow::datatypes::DataType;

use crate::exec::hash_table::hash::{
    canonical_f32_bits, canonical_f64_bits, hash_bytes_with_seed, hash_null_with_seed,
    hash_u64_with_seed,
};

/// Typed per-batch view over one evaluated grouping column.
///
/// Downcast happens once per batch; per-row access is branch-only. Columns of
/// types without a dedicated variant stay `Other` and are only touched through
/// the serialized-row path.
pub(crate) enum GroupKeyArrayView<'a> {
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Boolean(&'a BooleanArray),
    Utf8(&'a StringArray),
    Date32(&'a Date32Array),
    Other(&'a ArrayRef),
}

impl<'a> GroupKeyArrayView<'a> {
    pub(crate) fn from_array(array: &'a ArrayRef) -> Result<Self, String> {
        let view = match array.data_type() {
            DataType::Int8 => Self::Int8(downcast(array)?),
            DataType::Int16 => Self::Int16(downcast(array)?),
            DataType::Int32 => Self::Int32(downcast(array)?),
            DataType::Int64 => Self::Int64(downcast(array)?),
            DataType::Float32 => Self::Float32(downcast(array)?),
            DataType::Float64 => Self::Float64(downcast(array)?),
            DataType::Boolean => Self::Boolean(downcast(array)?),
            DataType::Utf8 => Self::Utf8(downcast(array)?),
            DataType::Date32 => Self::Date32(downcast(array)?),
            _ => Self::Other(array),
        };
        Ok(view)
    }

    pub(crate) fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Int8(arr) => arr.is_null(row),
            Self::Int16(arr) => arr.is_null(row),
            Self::Int32(arr) => arr.is_null(row),
            Self::Int64(arr) => arr.is_null(row),
            Self::Float32(arr) => arr.is_null(row),
            Self::Float64(arr) => arr.is_null(row),
            Self::Boolean(arr) => arr.is_null(row),
            Self::Utf8(arr) => arr.is_null(row),
            Self::Date32(arr) => arr.is_null(row),
            Self::Other(arr) => arr.is_null(row),
        }
    }

    /// Canonical 64-bit image of the value for hashing; `None` for NULL.
    /// Floats are canonicalized so that every NaN hashes identically.
    pub(crate) fn canonical_u64(&self, row: usize) -> Result<Option<u64>, String> {
        if self.is_null(row) {
            return Ok(None);
        }
        let bits = match self {
            Self::Int8(arr) => arr.value(row) as i64 as u64,
            Self::Int16(arr) => arr.value(row) as i64 as u64,
            Self::Int32(arr) => arr.value(row) as i64 as u64,
            Self::Int64(arr) => arr.value(row) as u64,
            Self::Float32(arr) => canonical_f32_bits(arr.value(row)) as u64,
            Self::Float64(arr) => canonical_f64_bits(arr.value(row)),
            Self::Boolean(arr) => arr.value(row) as u64,
            Self::Date32(arr) => arr.value(row) as i64 as u64,
            Self::Utf8(_) | Self::Other(_) => {
                return Err("canonical_u64 on non-numeric group key".to_string());
            }
        };
        Ok(Some(bits))
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef) -> Result<&'a T, String> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        format!(
            "failed to downcast group key array of type {:?}",
            array.data_type()
        )
    })
}

pub(crate) fn build_group_key_views<'a>(
    arrays: &'a [ArrayRef],
) -> Result<Vec<GroupKeyArrayView<'a>>, String> {
    let mut views = Vec::with_capacity(arrays.len());
    for array in arrays {
        views.push(GroupKeyArrayView::from_array(array)?);
    }
    Ok(views)
}

pub(crate) fn build_one_number_hashes(
    view: &GroupKeyArrayView<'_>,
    num_rows: usize,
    seed: u64,
) -> Result<Vec<u64>, String> {
    let mut hashes = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let hash = match view.canonical_u64(row)? {
            Some(bits) => hash_u64_with_seed(seed, bits),
            None => hash_null_with_seed(seed),
        };
        hashes.push(hash);
    }
    Ok(hashes)
}

pub(crate) fn build_one_string_hashes(
    view: &GroupKeyArrayView<'_>,
    num_rows: usize,
    seed: u64,
) -> Result<Vec<u64>, String> {
    let GroupKeyArrayView::Utf8(arr) = view else {
        return Err("one string key expects Utf8 view".to_string());
    };
    let mut hashes = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let hash = if arr.is_null(row) {
            hash_null_with_seed(seed)
        } else {
            hash_bytes_with_seed(seed, arr.value(row).as_bytes())
        };
        hashes.push(hash);
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn nan_keys_hash_identically() {
        let array: ArrayRef = Arc::new(Float64Array::from(vec![
            Some(f64::NAN),
            Some(-f64::NAN),
            Some(1.5),
        ]));
        let view = GroupKeyArrayView::from_array(&array).unwrap();
        let hashes = build_one_number_hashes(&view, 3, 42).unwrap();
        assert_eq!(hashes[0], hashes[1]);
        assert_ne!(hashes[0], hashes[2]);
    }

    #[test]
    fn null_hash_is_stable() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![None, None, Some(7)]));
        let view = GroupKeyArrayView::from_array(&array).unwrap();
        let hashes = build_one_number_hashes(&view, 3, 7).unwrap();
        assert_eq!(hashes[0], hashes[1]);
    }
}
