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
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};

use basalt::exec::chunk::{field_with_slot_id, Chunk};
use basalt::exec::operators::ChunkSource;
use basalt::SlotId;

/// Upstream source over a fixed list of chunks.
pub struct TestSource {
    chunks: std::vec::IntoIter<Chunk>,
}

impl TestSource {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

impl ChunkSource for TestSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, String> {
        Ok(self.chunks.next())
    }
}

/// Upstream source that fails after yielding its chunks.
pub struct FailingSource {
    chunks: std::vec::IntoIter<Chunk>,
    error: String,
}

impl FailingSource {
    pub fn new(chunks: Vec<Chunk>, error: impl Into<String>) -> Self {
        Self {
            chunks: chunks.into_iter(),
            error: error.into(),
        }
    }
}

impl ChunkSource for FailingSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, String> {
        match self.chunks.next() {
            Some(chunk) => Ok(Some(chunk)),
            None => Err(self.error.clone()),
        }
    }
}

/// Build a chunk from (name, slot id, type, array) column specs.
pub fn chunk_of(columns: Vec<(&str, u32, DataType, ArrayRef)>) -> Chunk {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, slot, data_type, _)| {
            field_with_slot_id(
                Field::new(*name, data_type.clone(), true),
                SlotId::new(*slot),
            )
        })
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, _, _, a)| a).collect();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema, arrays).expect("record batch");
    Chunk::new(batch)
}
