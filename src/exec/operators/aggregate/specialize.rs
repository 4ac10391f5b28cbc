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
//! Pluggable specialization of the per-batch aggregation routine.
//!
//! A specializer inspects the operator's semantic signature (grouping key
//! shape plus function kinds) and either returns a batch routine with the
//! exact observable behavior of the interpreted path, or reports the
//! signature as unsupported. Failure to specialize is never an error.

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::exec::expr::agg::{AggKernelSet, AggStateArena, AggStateRef, SpecializedUpdate};
use crate::exec::hash_table::key_builder::GroupKeyArrayView;
use crate::exec::hash_table::key_table::KeyTable;
use crate::exec::node::aggregate::AggFunction;

/// Mutable build-phase state handed to a batch routine.
pub struct BuildContext<'a> {
    pub(crate) key_table: Option<&'a mut KeyTable>,
    pub(crate) state_arena: &'a mut AggStateArena,
    pub(crate) group_states: &'a mut Vec<AggStateRef>,
    pub(crate) state_refs: &'a mut Vec<AggStateRef>,
    pub(crate) kernels: &'a AggKernelSet,
}

impl BuildContext<'_> {
    /// Allocate and initialize the state record for a newly inserted group.
    pub(crate) fn alloc_group_state(&mut self) -> Result<AggStateRef, String> {
        let layout = &self.kernels.layout;
        let base = self.state_arena.alloc(layout.total_size, layout.max_align)?;
        for kernel in &self.kernels.entries {
            kernel.init_state(self.state_arena, base);
        }
        self.group_states.push(base);
        Ok(base)
    }

    /// Create the singleton state for ungrouped aggregation if absent.
    pub(crate) fn ensure_scalar_group(&mut self) -> Result<(), String> {
        if self.group_states.is_empty() {
            self.alloc_group_state()?;
        }
        Ok(())
    }
}

/// Evaluated inputs of one batch.
pub struct BatchInput<'a> {
    pub group_arrays: &'a [ArrayRef],
    pub agg_arrays: &'a [Option<ArrayRef>],
    pub num_rows: usize,
}

pub type SpecializedBatchFn =
    Box<dyn Fn(&mut BuildContext<'_>, &BatchInput<'_>) -> Result<(), String> + Send + Sync>;

/// Semantic signature of the update routine to specialize.
pub struct SpecializeSignature<'a> {
    pub group_types: &'a [DataType],
    pub functions: &'a [AggFunction],
    pub kernels: &'a AggKernelSet,
}

/// External specialization engine boundary.
///
/// `specialize` never alters behavior: it returns a routine equivalent to the
/// interpreted path, or `None` for unsupported signatures.
pub trait UpdateSpecializer: Send + Sync {
    fn name(&self) -> &str;
    fn specialize(&self, sig: &SpecializeSignature<'_>) -> Option<SpecializedBatchFn>;
}

/// Built-in engine covering the common integer fast path: ungrouped or a
/// single Int64 grouping key, with count/sum/min/max over Int64 inputs.
pub struct BuiltinSpecializer;

impl UpdateSpecializer for BuiltinSpecializer {
    fn name(&self) -> &str {
        "builtin"
    }

    fn specialize(&self, sig: &SpecializeSignature<'_>) -> Option<SpecializedBatchFn> {
        if sig.functions.iter().any(|f| f.input_is_intermediate) {
            return None;
        }
        let update = SpecializedUpdate::try_new(&sig.kernels.entries)?;
        match sig.group_types {
            [] => Some(Box::new(
                move |ctx: &mut BuildContext<'_>, input: &BatchInput<'_>| {
                    ctx.ensure_scalar_group()?;
                    let state = ctx.group_states[0];
                    ctx.state_refs.clear();
                    ctx.state_refs.resize(input.num_rows, state);
                    update.update(ctx.state_arena, ctx.state_refs, input.agg_arrays)
                },
            )),
            [DataType::Int64] => Some(Box::new(
                move |ctx: &mut BuildContext<'_>, input: &BatchInput<'_>| {
                    let table = ctx
                        .key_table
                        .as_deref_mut()
                        .ok_or_else(|| "aggregate key table missing".to_string())?;
                    let array = input
                        .group_arrays
                        .first()
                        .ok_or_else(|| "group key array missing".to_string())?;
                    let view = GroupKeyArrayView::from_array(array)?;
                    let hashes = table.build_one_number_hashes(&view, input.num_rows)?;
                    ctx.state_refs.clear();
                    ctx.state_refs.reserve(input.num_rows);
                    for row in 0..input.num_rows {
                        let lookup = table.find_or_insert_one_number(&view, row, hashes[row])?;
                        if lookup.is_new {
                            let layout = &ctx.kernels.layout;
                            let base =
                                ctx.state_arena.alloc(layout.total_size, layout.max_align)?;
                            for kernel in &ctx.kernels.entries {
                                kernel.init_state(ctx.state_arena, base);
                            }
                            ctx.group_states.push(base);
                        }
                        let state = *ctx
                            .group_states
                            .get(lookup.group_id)
                            .ok_or_else(|| "aggregate state missing".to_string())?;
                        ctx.state_refs.push(state);
                    }
                    update.update(ctx.state_arena, ctx.state_refs, input.agg_arrays)
                },
            )),
            _ => None,
        }
    }
}
