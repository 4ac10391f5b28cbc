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
use std::ptr::NonNull;
use std::sync::Arc;

use crate::runtime::mem_tracker::MemTracker;

/// Reference to key bytes stored in [`RowStorage`].
///
/// Valid for the lifetime of the owning storage; the storage never frees
/// individual keys.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowKey {
    ptr: usize,
    len: usize,
}

impl RowKey {
    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    pub(crate) fn empty() -> Self {
        Self {
            ptr: NonNull::<u8>::dangling().as_ptr() as usize,
            len: 0,
        }
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for RowKey {}

/// Bump storage for variable-length key bytes, charged against the memory
/// budget block by block. No individual deallocation; dropping the storage
/// releases everything at once.
pub(crate) struct RowStorage {
    blocks: Vec<Box<[u8]>>,
    cursor: usize,
    block_size: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl RowStorage {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
            mem_tracker: None,
            accounted_bytes: 0,
        }
    }

    pub(crate) fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.blocks.iter().map(|b| b.len()).sum::<usize>();
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        tracker.consume(bytes);
        self.mem_tracker = Some(tracker);
        self.accounted_bytes = bytes;
    }

    pub(crate) fn alloc_copy(&mut self, bytes: &[u8]) -> Result<RowKey, String> {
        let needed = bytes.len().max(1);
        let current_block_len = self.blocks.last().map(|b| b.len()).unwrap_or(0);
        if self.blocks.is_empty() || self.cursor + needed > current_block_len {
            let block_size = self.block_size.max(needed);
            if let Some(tracker) = self.mem_tracker.as_ref() {
                let block_bytes = i64::try_from(block_size).unwrap_or(i64::MAX);
                tracker.try_consume(block_bytes)?;
                self.accounted_bytes = self.accounted_bytes.saturating_add(block_bytes);
            }
            self.blocks.push(vec![0u8; block_size].into_boxed_slice());
            self.block_size = self.block_size.max(block_size);
            self.cursor = 0;
        }
        let block = self.blocks.last_mut().expect("row storage block");
        let start = self.cursor;
        let end = start + bytes.len();
        block[start..end].copy_from_slice(bytes);
        self.cursor = end;
        let ptr = block.as_mut_ptr().wrapping_add(start) as usize;
        Ok(RowKey {
            ptr,
            len: bytes.len(),
        })
    }
}

impl Drop for RowStorage {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_copy_round_trips_bytes() {
        let mut storage = RowStorage::new(16);
        let a = storage.alloc_copy(b"alpha").expect("alloc");
        let b = storage.alloc_copy(b"beta").expect("alloc");
        assert_eq!(a.as_slice(), b"alpha");
        assert_eq!(b.as_slice(), b"beta");
    }

    #[test]
    fn budget_breach_fails_allocation() {
        let tracker = MemTracker::new_root_with_limit("keys", 32);
        let mut storage = RowStorage::new(16);
        storage.set_mem_tracker(tracker);
        storage.alloc_copy(&[1u8; 16]).expect("first block fits");
        storage.alloc_copy(&[2u8; 16]).expect("second block fits");
        let err = storage.alloc_copy(&[3u8; 16]).expect_err("over budget");
        assert!(err.contains("memory limit exceeded"), "err={}", err);
    }
}
