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

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;
use crate::runtime::mem_tracker::MemTracker;

use super::functions;
use super::*;

// Accumulator states are plain records with at most pointer alignment; the
// arena blocks are word-aligned to match.
const MAX_STATE_ALIGN: usize = std::mem::align_of::<u64>();

/// Index-based handle to one aggregate state record in an [`AggStateArena`].
///
/// Handles stay valid until the arena is released as a whole; they are never
/// raw addresses, so arena-internal reallocation of the block list cannot
/// invalidate them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggStateRef {
    block: u32,
    offset: u32,
}

/// Location of one function's accumulator inside the state record.
#[derive(Clone, Debug)]
pub struct AggStateDesc {
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

/// Fixed layout of the whole state record: one slot per aggregate function,
/// computed once when the kernel set is built.
#[derive(Clone, Debug)]
pub struct AggStateLayout {
    pub total_size: usize,
    pub max_align: usize,
    pub descs: Vec<AggStateDesc>,
}

#[derive(Clone, Debug)]
pub struct AggKernelEntry {
    pub(super) spec: AggSpec,
    pub(super) state: AggStateDesc,
}

#[derive(Clone, Debug)]
pub struct AggKernelSet {
    pub entries: Vec<AggKernelEntry>,
    pub layout: AggStateLayout,
}

// Word-backed so every state record base is 8-byte aligned.
#[derive(Debug)]
struct ArenaBlock {
    words: Box<[u64]>,
}

impl ArenaBlock {
    fn new(byte_len: usize) -> Self {
        let words = byte_len.div_ceil(std::mem::size_of::<u64>());
        Self {
            words: vec![0u64; words].into_boxed_slice(),
        }
    }

    fn byte_len(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr() as *const u8
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as *mut u8
    }
}

/// Bump arena owning every aggregate state record of one operator instance.
///
/// Allocation is charged against the memory budget and fails on breach; there
/// is no individual deallocation. Dropping or releasing the arena invalidates
/// every handle at once.
#[derive(Debug)]
pub struct AggStateArena {
    blocks: Vec<ArenaBlock>,
    cursor: usize,
    block_size: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl AggStateArena {
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
            mem_tracker: None,
            accounted_bytes: 0,
        }
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.blocks.iter().map(|b| b.byte_len()).sum::<usize>();
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        tracker.consume(bytes);
        self.mem_tracker = Some(tracker);
        self.accounted_bytes = bytes;
    }

    pub fn alloc(&mut self, size: usize, align: usize) -> Result<AggStateRef, String> {
        if align > MAX_STATE_ALIGN {
            return Err(format!(
                "aggregate state alignment {} exceeds arena alignment {}",
                align, MAX_STATE_ALIGN
            ));
        }
        let align_mask = align.saturating_sub(1);
        let needed = size.max(1);

        let mut cursor = (self.cursor + align_mask) & !align_mask;
        let current_block_len = self.blocks.last().map(|b| b.byte_len()).unwrap_or(0);
        if self.blocks.is_empty() || cursor + needed > current_block_len {
            let block_size = self.block_size.max(needed);
            let block = ArenaBlock::new(block_size);
            if let Some(tracker) = self.mem_tracker.as_ref() {
                let bytes = i64::try_from(block.byte_len()).unwrap_or(i64::MAX);
                tracker.try_consume(bytes)?;
                self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
            }
            self.blocks.push(block);
            self.block_size = self.block_size.max(block_size);
            cursor = 0;
        }
        let block_idx = self.blocks.len() - 1;
        self.cursor = cursor + needed;
        Ok(AggStateRef {
            block: u32::try_from(block_idx).map_err(|_| "arena block index overflow".to_string())?,
            offset: u32::try_from(cursor).map_err(|_| "arena offset overflow".to_string())?,
        })
    }

    /// Raw pointer to a field of the state record, for placement init/drop.
    pub(crate) fn state_ptr(&mut self, base: AggStateRef, offset: usize, len: usize) -> *mut u8 {
        let block = &mut self.blocks[base.block as usize];
        let start = base.offset as usize + offset;
        assert!(start + len <= block.byte_len(), "state access out of bounds");
        unsafe { block.as_mut_ptr().add(start) }
    }

    /// Typed read access to one accumulator slot.
    ///
    /// The caller must request the same type the slot was initialized with;
    /// kernel specs guarantee this by construction.
    pub(crate) fn state<T>(&self, base: AggStateRef, offset: usize) -> &T {
        let block = &self.blocks[base.block as usize];
        let start = base.offset as usize + offset;
        assert!(
            start + std::mem::size_of::<T>() <= block.byte_len(),
            "state access out of bounds"
        );
        debug_assert_eq!(start % std::mem::align_of::<T>(), 0);
        unsafe { &*(block.as_ptr().add(start) as *const T) }
    }

    /// Typed write access to one accumulator slot.
    pub(crate) fn state_mut<T>(&mut self, base: AggStateRef, offset: usize) -> &mut T {
        let block = &mut self.blocks[base.block as usize];
        let start = base.offset as usize + offset;
        assert!(
            start + std::mem::size_of::<T>() <= block.byte_len(),
            "state access out of bounds"
        );
        debug_assert_eq!(start % std::mem::align_of::<T>(), 0);
        unsafe { &mut *(block.as_mut_ptr().add(start) as *mut T) }
    }

    /// Drop all blocks and un-account them, invalidating every handle.
    pub fn release_all(&mut self) {
        self.blocks.clear();
        self.cursor = 0;
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
        self.accounted_bytes = 0;
    }
}

impl Drop for AggStateArena {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

pub fn build_kernel_set(
    functions: &[AggFunction],
    input_types: &[Option<DataType>],
) -> Result<AggKernelSet, String> {
    if input_types.len() != functions.len() {
        return Err("aggregate input type length mismatch".to_string());
    }

    let mut entries = Vec::with_capacity(functions.len());
    let mut descs = Vec::with_capacity(functions.len());
    let mut offset = 0usize;
    let mut max_align = 1usize;

    for (idx, func) in functions.iter().enumerate() {
        let spec =
            build_spec_from_type(func, input_types[idx].as_ref(), func.input_is_intermediate)?;
        let (size, align) = functions::state_layout_for_kind(&spec.kind);
        if align > MAX_STATE_ALIGN {
            return Err(format!(
                "aggregate state alignment {} unsupported for {}",
                align, func.name
            ));
        }
        let align_mask = align.saturating_sub(1);
        offset = (offset + align_mask) & !align_mask;
        let state = AggStateDesc {
            offset,
            size,
            align,
        };
        offset += size;
        max_align = max_align.max(align);
        descs.push(state.clone());
        entries.push(AggKernelEntry { spec, state });
    }

    Ok(AggKernelSet {
        entries,
        layout: AggStateLayout {
            total_size: offset.max(1),
            max_align,
            descs,
        },
    })
}

impl AggKernelEntry {
    pub fn build_input_view<'a>(
        &self,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        functions::build_input_view(&self.spec, array)
    }

    pub fn build_merge_view<'a>(
        &self,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String> {
        functions::build_merge_view(&self.spec, array)
    }

    pub fn output_type(&self, output_intermediate: bool) -> DataType {
        if output_intermediate {
            self.spec.intermediate_type.clone()
        } else {
            self.spec.output_type.clone()
        }
    }

    pub fn state_align(&self) -> usize {
        self.state.align
    }

    pub fn state_offset(&self) -> usize {
        self.state.offset
    }

    pub fn init_state(&self, arena: &mut AggStateArena, base: AggStateRef) {
        let ptr = arena.state_ptr(base, self.state.offset, self.state.size);
        functions::init_state(&self.spec, ptr);
    }

    pub fn drop_state(&self, arena: &mut AggStateArena, base: AggStateRef) {
        let ptr = arena.state_ptr(base, self.state.offset, self.state.size);
        functions::drop_state(&self.spec, ptr);
    }

    pub fn update_batch(
        &self,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        functions::update_batch(&self.spec, self.state.offset, arena, states, input)
    }

    pub fn merge_batch(
        &self,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String> {
        functions::merge_batch(&self.spec, self.state.offset, arena, states, input)
    }

    pub fn build_array(
        &self,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String> {
        functions::build_array(
            &self.spec,
            self.state.offset,
            arena,
            group_states,
            output_intermediate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_handles_survive_block_growth() {
        let mut arena = AggStateArena::new(32);
        let mut refs = Vec::new();
        for _ in 0..100 {
            refs.push(arena.alloc(16, 8).expect("alloc"));
        }
        for (idx, &base) in refs.iter().enumerate() {
            *arena.state_mut::<u64>(base, 0) = idx as u64;
        }
        for (idx, &base) in refs.iter().enumerate() {
            assert_eq!(*arena.state::<u64>(base, 0), idx as u64);
        }
    }

    #[test]
    fn arena_respects_memory_budget() {
        let tracker = MemTracker::new_root_with_limit("arena", 128);
        let mut arena = AggStateArena::new(64);
        arena.set_mem_tracker(tracker);
        arena.alloc(64, 8).expect("first block");
        arena.alloc(64, 8).expect("second block");
        let err = arena.alloc(64, 8).expect_err("over budget");
        assert!(err.contains("memory limit exceeded"), "err={}", err);
    }

    #[test]
    fn release_all_returns_budget() {
        let tracker = MemTracker::new_root_with_limit("arena", 128);
        let mut arena = AggStateArena::new(64);
        arena.set_mem_tracker(Arc::clone(&tracker));
        arena.alloc(64, 8).expect("alloc");
        assert!(tracker.current() > 0);
        arena.release_all();
        assert_eq!(tracker.current(), 0);
        arena.alloc(64, 8).expect("alloc after release");
    }
}
