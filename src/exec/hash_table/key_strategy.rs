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
use arrow::datatypes::DataType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GroupKeyStrategy {
    /// No grouping keys (scalar aggregation).
    Scalar,
    /// Single fixed-width numeric, boolean or date key.
    OneNumber,
    /// Single UTF-8 key stored directly in the key storage.
    OneString,
    /// Variable-length serialized row key (fallback for mixed or wide keys).
    Serialized,
}

pub(crate) fn pick_group_key_strategy(types: &[DataType]) -> GroupKeyStrategy {
    if types.is_empty() {
        return GroupKeyStrategy::Scalar;
    }
    if types.len() == 1 {
        if matches!(types[0], DataType::Utf8) {
            return GroupKeyStrategy::OneString;
        }
        if is_one_number_key_type(&types[0]) {
            return GroupKeyStrategy::OneNumber;
        }
    }
    GroupKeyStrategy::Serialized
}

pub(crate) fn is_one_number_key_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
            | DataType::Date32
    )
}

pub(crate) fn is_supported_key_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
            | DataType::Date32
            | DataType::Utf8
            | DataType::Timestamp(_, _)
    )
}

pub(crate) fn fixed_width_size(data_type: &DataType) -> Option<usize> {
    let width = match data_type {
        DataType::Int8 => 1,
        DataType::Int16 => 2,
        DataType::Int32 => 4,
        DataType::Int64 => 8,
        DataType::Float32 => 4,
        DataType::Float64 => 8,
        DataType::Boolean => 1,
        DataType::Date32 => 4,
        DataType::Timestamp(_, _) => 8,
        _ => return None,
    };
    Some(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_selection() {
        assert_eq!(pick_group_key_strategy(&[]), GroupKeyStrategy::Scalar);
        assert_eq!(
            pick_group_key_strategy(&[DataType::Int64]),
            GroupKeyStrategy::OneNumber
        );
        assert_eq!(
            pick_group_key_strategy(&[DataType::Utf8]),
            GroupKeyStrategy::OneString
        );
        assert_eq!(
            pick_group_key_strategy(&[DataType::Int64, DataType::Utf8]),
            GroupKeyStrategy::Serialized
        );
        assert_eq!(
            pick_group_key_strategy(&[DataType::Timestamp(
                arrow::datatypes::TimeUnit::Microsecond,
                None
            )]),
            GroupKeyStrategy::Serialized
        );
    }
}
