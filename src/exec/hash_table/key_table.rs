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
use arrow::row::{RowConverter, Rows, SortField};
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::raw::RawTable;
use std::sync::Arc;

use crate::exec::hash_table::hash::{hash_bytes_with_seed, seed_from_hasher};
use crate::exec::hash_table::key_builder::{
    build_one_number_hashes, build_one_string_hashes, GroupKeyArrayView,
};
use crate::exec::hash_table::key_column::{key_column_from_type, KeyColumn};
use crate::exec::hash_table::key_storage::{RowKey, RowStorage};
use crate::exec::hash_table::key_strategy::{
    is_supported_key_type, pick_group_key_strategy, GroupKeyStrategy,
};
use crate::runtime::mem_tracker::MemTracker;

#[derive(Clone, Copy, Debug)]
struct KeyEntry {
    group_id: usize,
    hash: u64,
}

// Rough per-insert charge for hash table slots, covering growth slack.
const ENTRY_OVERHEAD_BYTES: usize = 2 * std::mem::size_of::<KeyEntry>();

pub(crate) struct KeyLookup {
    pub(crate) group_id: usize,
    pub(crate) is_new: bool,
}

/// Maps evaluated grouping keys to dense group ids.
///
/// Probe-or-insert is one table pass per row; equality is a full tuple-wise
/// comparison consistent with the seeded hashes produced by `key_builder`.
/// The dense id range `0..group_count()` doubles as the output iteration
/// order.
pub(crate) struct KeyTable {
    key_strategy: GroupKeyStrategy,
    key_columns: Vec<KeyColumn>,
    one_number_table: RawTable<KeyEntry>,
    varlen_table: RawTable<KeyEntry>,
    one_string_null: Option<usize>,
    row_storage: RowStorage,
    varlen_keys: Vec<RowKey>,
    row_converter: Option<RowConverter>,
    hash_seed: u64,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl KeyTable {
    pub(crate) fn new(key_types: Vec<DataType>) -> Result<Self, String> {
        for data_type in &key_types {
            if !is_supported_key_type(data_type) {
                return Err(format!("unsupported group by type: {:?}", data_type));
            }
        }
        let key_strategy = pick_group_key_strategy(&key_types);
        let mut key_columns = Vec::with_capacity(key_types.len());
        for data_type in &key_types {
            key_columns.push(key_column_from_type(data_type)?);
        }
        let mut row_converter = None;
        if key_strategy == GroupKeyStrategy::Serialized && !key_types.is_empty() {
            let fields = key_types
                .iter()
                .cloned()
                .map(SortField::new)
                .collect::<Vec<_>>();
            let converter = RowConverter::new(fields)
                .map_err(|e| format!("group key row converter init failed: {}", e))?;
            row_converter = Some(converter);
        }
        Ok(Self {
            key_strategy,
            key_columns,
            one_number_table: RawTable::new(),
            varlen_table: RawTable::new(),
            one_string_null: None,
            row_storage: RowStorage::new(64 * 1024),
            varlen_keys: Vec::new(),
            row_converter,
            hash_seed: seed_from_hasher(&DefaultHashBuilder::default()),
            mem_tracker: None,
            accounted_bytes: 0,
        })
    }

    pub(crate) fn key_strategy(&self) -> GroupKeyStrategy {
        self.key_strategy
    }

    pub(crate) fn key_columns(&self) -> &[KeyColumn] {
        &self.key_columns
    }

    pub(crate) fn group_count(&self) -> usize {
        self.key_columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub(crate) fn bucket_count(&self) -> usize {
        match self.key_strategy {
            GroupKeyStrategy::OneNumber => self.one_number_table.buckets(),
            _ => self.varlen_table.buckets(),
        }
    }

    pub(crate) fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        let row_storage = MemTracker::new_child("RowStorage", &tracker);
        self.row_storage.set_mem_tracker(row_storage);
        self.mem_tracker = Some(tracker);
    }

    pub(crate) fn build_rows(&self, arrays: &[ArrayRef]) -> Result<Rows, String> {
        let converter = self
            .row_converter
            .as_ref()
            .ok_or_else(|| "row converter not initialized".to_string())?;
        converter.convert_columns(arrays).map_err(|e| e.to_string())
    }

    pub(crate) fn row_hash(&self, row_bytes: &[u8]) -> u64 {
        hash_bytes_with_seed(self.hash_seed, row_bytes)
    }

    pub(crate) fn build_one_number_hashes(
        &self,
        view: &GroupKeyArrayView<'_>,
        num_rows: usize,
    ) -> Result<Vec<u64>, String> {
        build_one_number_hashes(view, num_rows, self.hash_seed)
    }

    pub(crate) fn build_one_string_hashes(
        &self,
        view: &GroupKeyArrayView<'_>,
        num_rows: usize,
    ) -> Result<Vec<u64>, String> {
        build_one_string_hashes(view, num_rows, self.hash_seed)
    }

    pub(crate) fn find_or_insert_one_number(
        &mut self,
        view: &GroupKeyArrayView<'_>,
        row: usize,
        hash: u64,
    ) -> Result<KeyLookup, String> {
        let mut error = None;
        let result = {
            let key_columns = &self.key_columns;
            let table = &mut self.one_number_table;
            table.find_or_find_insert_slot(
                hash,
                |entry| match key_columns.first() {
                    Some(col) => match col.value_equals(entry.group_id, view, row) {
                        Ok(equal) => equal,
                        Err(err) => {
                            error = Some(err);
                            false
                        }
                    },
                    None => {
                        error = Some("one number key column missing".to_string());
                        false
                    }
                },
                |entry| entry.hash,
            )
        };
        if let Some(err) = error {
            return Err(err);
        }

        match result {
            Ok(bucket) => Ok(KeyLookup {
                group_id: unsafe { bucket.as_ref().group_id },
                is_new: false,
            }),
            Err(slot) => {
                let col = self
                    .key_columns
                    .get_mut(0)
                    .ok_or_else(|| "one number key column missing".to_string())?;
                let value_bytes = col.push_value_from_view(view, row)?;
                let group_id = self.alloc_group(value_bytes)?;
                let entry = KeyEntry { group_id, hash };
                unsafe {
                    self.one_number_table.insert_in_slot(hash, slot, entry);
                }
                Ok(KeyLookup {
                    group_id,
                    is_new: true,
                })
            }
        }
    }

    pub(crate) fn find_or_insert_one_string(
        &mut self,
        view: &GroupKeyArrayView<'_>,
        row: usize,
        hash: u64,
    ) -> Result<KeyLookup, String> {
        let GroupKeyArrayView::Utf8(arr) = view else {
            return Err("one string key expects Utf8 view".to_string());
        };
        if arr.is_null(row) {
            // The NULL group has no key bytes; it gets a dedicated slot.
            if let Some(group_id) = self.one_string_null {
                return Ok(KeyLookup {
                    group_id,
                    is_new: false,
                });
            }
            let col = self
                .key_columns
                .get_mut(0)
                .ok_or_else(|| "one string key column missing".to_string())?;
            let value_bytes = col.push_value_from_view(view, row)?;
            let group_id = self.alloc_group(value_bytes)?;
            self.one_string_null = Some(group_id);
            return Ok(KeyLookup {
                group_id,
                is_new: true,
            });
        }

        let key_bytes = arr.value(row).as_bytes();
        let mut error = None;
        let result = {
            let keys = &self.varlen_keys;
            let table = &mut self.varlen_table;
            table.find_or_find_insert_slot(
                hash,
                |entry| match keys.get(entry.group_id) {
                    Some(stored) => stored.as_slice() == key_bytes,
                    None => {
                        error = Some("group key index out of bounds".to_string());
                        false
                    }
                },
                |entry| entry.hash,
            )
        };
        if let Some(err) = error {
            return Err(err);
        }
        match result {
            Ok(bucket) => Ok(KeyLookup {
                group_id: unsafe { bucket.as_ref().group_id },
                is_new: false,
            }),
            Err(slot) => {
                let col = self
                    .key_columns
                    .get_mut(0)
                    .ok_or_else(|| "one string key column missing".to_string())?;
                let value_bytes = col.push_value_from_view(view, row)?;
                let group_id = self.alloc_group(value_bytes)?;
                let stored_key = self.row_storage.alloc_copy(key_bytes)?;
                self.store_varlen_key(group_id, stored_key)?;
                let entry = KeyEntry { group_id, hash };
                unsafe {
                    self.varlen_table.insert_in_slot(hash, slot, entry);
                }
                Ok(KeyLookup {
                    group_id,
                    is_new: true,
                })
            }
        }
    }

    pub(crate) fn find_or_insert_from_row(
        &mut self,
        views: &[GroupKeyArrayView<'_>],
        row: usize,
        row_bytes: &[u8],
        hash: u64,
    ) -> Result<KeyLookup, String> {
        let mut error = None;
        let result = {
            let keys = &self.varlen_keys;
            let table = &mut self.varlen_table;
            table.find_or_find_insert_slot(
                hash,
                |entry| match keys.get(entry.group_id) {
                    Some(stored) => stored.as_slice() == row_bytes,
                    None => {
                        error = Some("group key index out of bounds".to_string());
                        false
                    }
                },
                |entry| entry.hash,
            )
        };
        if let Some(err) = error {
            return Err(err);
        }

        match result {
            Ok(bucket) => Ok(KeyLookup {
                group_id: unsafe { bucket.as_ref().group_id },
                is_new: false,
            }),
            Err(slot) => {
                if views.len() != self.key_columns.len() {
                    return Err("group key length mismatch".to_string());
                }
                let mut value_bytes = 0usize;
                for (col, view) in self.key_columns.iter_mut().zip(views.iter()) {
                    value_bytes += col.push_value_from_view(view, row)?;
                }
                let group_id = self.alloc_group(value_bytes)?;
                let stored_key = self.row_storage.alloc_copy(row_bytes)?;
                self.store_varlen_key(group_id, stored_key)?;
                let entry = KeyEntry { group_id, hash };
                unsafe {
                    self.varlen_table.insert_in_slot(hash, slot, entry);
                }
                Ok(KeyLookup {
                    group_id,
                    is_new: true,
                })
            }
        }
    }

    fn store_varlen_key(&mut self, group_id: usize, key: RowKey) -> Result<(), String> {
        if let Some(slot_key) = self.varlen_keys.get_mut(group_id) {
            *slot_key = key;
            Ok(())
        } else {
            Err("group key index out of bounds".to_string())
        }
    }

    fn alloc_group(&mut self, value_bytes: usize) -> Result<usize, String> {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            let bytes = i64::try_from(ENTRY_OVERHEAD_BYTES + value_bytes).unwrap_or(i64::MAX);
            tracker.try_consume(bytes)?;
            self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
        }
        let group_id = self.varlen_keys.len();
        self.varlen_keys.push(RowKey::empty());
        Ok(group_id)
    }
}

impl Drop for KeyTable {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use std::sync::Arc;

    fn one_number_lookup(table: &mut KeyTable, array: &ArrayRef, row: usize) -> KeyLookup {
        let view = GroupKeyArrayView::from_array(array).unwrap();
        let hashes = table.build_one_number_hashes(&view, array.len()).unwrap();
        table
            .find_or_insert_one_number(&view, row, hashes[row])
            .unwrap()
    }

    #[test]
    fn one_number_keys_deduplicate() {
        let mut table = KeyTable::new(vec![DataType::Int64]).unwrap();
        let array: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(1), None, None]));
        let ids: Vec<(usize, bool)> = (0..5)
            .map(|row| {
                let lookup = one_number_lookup(&mut table, &array, row);
                (lookup.group_id, lookup.is_new)
            })
            .collect();
        assert_eq!(ids[0], (0, true));
        assert_eq!(ids[1], (1, true));
        assert_eq!(ids[2], (0, false));
        // NULL forms its own group, equal to later NULLs.
        assert_eq!(ids[3], (2, true));
        assert_eq!(ids[4], (2, false));
        assert_eq!(table.group_count(), 3);
    }

    #[test]
    fn one_string_null_and_values() {
        let mut table = KeyTable::new(vec![DataType::Utf8]).unwrap();
        let array: ArrayRef = Arc::new(StringArray::from(vec![
            Some("a"),
            None,
            Some("b"),
            Some("a"),
            None,
        ]));
        let view = GroupKeyArrayView::from_array(&array).unwrap();
        let hashes = table.build_one_string_hashes(&view, array.len()).unwrap();
        let ids: Vec<usize> = (0..5)
            .map(|row| {
                table
                    .find_or_insert_one_string(&view, row, hashes[row])
                    .unwrap()
                    .group_id
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1]);
        assert_eq!(table.group_count(), 3);
    }

    #[test]
    fn serialized_multi_column_keys() {
        let mut table = KeyTable::new(vec![DataType::Int64, DataType::Utf8]).unwrap();
        assert_eq!(table.key_strategy(), GroupKeyStrategy::Serialized);
        let a: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), Some(1), Some(2)]));
        let b: ArrayRef = Arc::new(StringArray::from(vec![Some("x"), Some("x"), Some("x")]));
        let arrays = vec![a, b];
        let views = crate::exec::hash_table::key_builder::build_group_key_views(&arrays).unwrap();
        let rows = table.build_rows(&arrays).unwrap();
        let mut ids = Vec::new();
        for row in 0..3 {
            let bytes = rows.row(row).data().to_vec();
            let hash = table.row_hash(&bytes);
            let lookup = table
                .find_or_insert_from_row(&views, row, &bytes, hash)
                .unwrap();
            ids.push(lookup.group_id);
        }
        assert_eq!(ids, vec![0, 0, 1]);
    }

    #[test]
    fn budget_breach_on_insert_is_reported() {
        let tracker = MemTracker::new_root_with_limit("table", 64);
        let mut table = KeyTable::new(vec![DataType::Int64]).unwrap();
        table.set_mem_tracker(tracker);
        let values: Vec<Option<i64>> = (0..100).map(Some).collect();
        let array: ArrayRef = Arc::new(Int64Array::from(values));
        let view = GroupKeyArrayView::from_array(&array).unwrap();
        let hashes = table.build_one_number_hashes(&view, array.len()).unwrap();
        let mut failed = false;
        for row in 0..array.len() {
            if let Err(err) = table.find_or_insert_one_number(&view, row, hashes[row]) {
                assert!(err.contains("memory limit exceeded"), "err={}", err);
                failed = true;
                break;
            }
        }
        assert!(failed, "expected an out-of-memory failure");
    }
}
