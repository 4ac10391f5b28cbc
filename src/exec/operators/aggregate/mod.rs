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
//! Hash-aggregation operator for grouped and global aggregate execution.
//!
//! Responsibilities:
//! - Builds and updates a group-key hash table with aggregate kernels over a
//!   blocking build phase, then finalizes in-memory aggregate states into
//!   bounded output chunks.
//! - Tracks memory against the operator budget; a breach aborts the build
//!   with an out-of-memory error before any output is produced.
//!
//! Key exported interfaces:
//! - Types: `AggregateOperatorFactory`, `AggregationOperator`, `AggPhase`.
//!
//! One logical thread drives an operator instance; parallelism is achieved
//! externally by creating independent instances over disjoint inputs.

pub mod specialize;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{DataType, Schema, SchemaRef};

use crate::common::config::ExecConfig;
use crate::exec::chunk::Chunk;
use crate::exec::expr::agg::{self, AggKernelSet, AggStateArena, AggStateRef};
use crate::exec::expr::{ExprArena, ExprId};
use crate::exec::hash_table::key_builder::build_group_key_views;
use crate::exec::hash_table::key_column::build_output_schema;
use crate::exec::hash_table::key_strategy::GroupKeyStrategy;
use crate::exec::hash_table::key_table::KeyTable;
use crate::exec::node::aggregate::{AggFunction, AggregatePlan};
use crate::exec::operators::ChunkSource;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::profile::{CounterUnit, RuntimeProfile};

use specialize::{
    BatchInput, BuildContext, BuiltinSpecializer, SpecializeSignature, SpecializedBatchFn,
    UpdateSpecializer,
};

/// Operator lifecycle phase.
///
/// `prepare` validates configuration, the build phase consumes the entire
/// input stream, and the produce phase drains groups in bounded chunks.
/// `close` is legal from any phase, including mid-build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggPhase {
    Uninitialized,
    Prepared,
    Building,
    Producing,
    Closed,
}

impl fmt::Display for AggPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggPhase::Uninitialized => "UNINITIALIZED",
            AggPhase::Prepared => "PREPARED",
            AggPhase::Building => "BUILDING",
            AggPhase::Producing => "PRODUCING",
            AggPhase::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

enum BatchStrategy {
    Unselected,
    UngroupedInterpreted,
    GroupedInterpreted,
    Specialized(SpecializedBatchFn),
}

/// Creates independent aggregation operator instances from one immutable plan
/// fragment. Instances share nothing mutable; running several of them over
/// disjoint row streams is the external parallelism model.
pub struct AggregateOperatorFactory {
    name: String,
    arena: Arc<ExprArena>,
    plan: Arc<AggregatePlan>,
    config: ExecConfig,
}

impl AggregateOperatorFactory {
    pub fn new(
        node_id: i32,
        arena: Arc<ExprArena>,
        plan: Arc<AggregatePlan>,
        config: ExecConfig,
    ) -> Result<Self, String> {
        config.validate()?;
        let name = if node_id >= 0 {
            format!("AGGREGATE (id={node_id})")
        } else {
            "AGGREGATE".to_string()
        };
        Ok(Self {
            name,
            arena,
            plan,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create(&self) -> AggregationOperator {
        AggregationOperator {
            name: self.name.clone(),
            arena: Arc::clone(&self.arena),
            plan: Arc::clone(&self.plan),
            chunk_size: self.config.chunk_size,
            enable_specialization: self.config.enable_specialization,
            phase: AggPhase::Uninitialized,
            key_table: None,
            state_arena: AggStateArena::new(self.config.state_arena_block_size),
            group_states: Vec::new(),
            state_refs: Vec::new(),
            kernels: None,
            strategy: BatchStrategy::Unselected,
            group_types: Vec::new(),
            agg_input_types: Vec::new(),
            output_schema: None,
            output_cursor: 0,
            saw_input: false,
            zero_width_emitted: false,
            data_initialized: false,
            specializer: Arc::new(BuiltinSpecializer),
            profile: None,
            profile_initialized: false,
            mem_tracker: None,
        }
    }
}

pub struct AggregationOperator {
    name: String,
    arena: Arc<ExprArena>,
    plan: Arc<AggregatePlan>,
    chunk_size: usize,
    enable_specialization: bool,
    phase: AggPhase,
    key_table: Option<KeyTable>,
    state_arena: AggStateArena,
    group_states: Vec<AggStateRef>,
    state_refs: Vec<AggStateRef>,
    kernels: Option<AggKernelSet>,
    strategy: BatchStrategy,
    group_types: Vec<DataType>,
    agg_input_types: Vec<Option<DataType>>,
    output_schema: Option<SchemaRef>,
    output_cursor: usize,
    saw_input: bool,
    zero_width_emitted: bool,
    data_initialized: bool,
    specializer: Arc<dyn UpdateSpecializer>,
    profile: Option<RuntimeProfile>,
    profile_initialized: bool,
    mem_tracker: Option<Arc<MemTracker>>,
}

impl AggregationOperator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> AggPhase {
        self.phase
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        let arena_tracker = MemTracker::new_child("AggStateArena", &tracker);
        self.state_arena.set_mem_tracker(arena_tracker);
        if let Some(table) = self.key_table.as_mut() {
            table.set_mem_tracker(MemTracker::new_child("KeyTable", &tracker));
        }
        self.mem_tracker = Some(tracker);
    }

    pub fn set_profile(&mut self, profile: RuntimeProfile) {
        self.profile = Some(profile);
    }

    pub fn set_specializer(&mut self, specializer: Arc<dyn UpdateSpecializer>) {
        self.specializer = specializer;
    }

    /// Validate the plan fragment and build the kernel set, key table and
    /// output schema. Reads no input. Configuration errors surface here.
    pub fn prepare(&mut self) -> Result<(), String> {
        if self.phase != AggPhase::Uninitialized {
            return Err(format!(
                "{}: prepare called in phase {}",
                self.name, self.phase
            ));
        }

        let expected = self.plan.group_by.len() + self.plan.functions.len();
        if self.plan.output_slots.len() != expected {
            return Err(format!(
                "{}: output slot count mismatch: group_by={} functions={} output_slots={}",
                self.name,
                self.plan.group_by.len(),
                self.plan.functions.len(),
                self.plan.output_slots.len()
            ));
        }

        let mut seen_slots = std::collections::HashSet::new();
        for slot_id in &self.plan.output_slots {
            if !seen_slots.insert(*slot_id) {
                return Err(format!(
                    "{}: duplicate output slot id {}",
                    self.name, slot_id
                ));
            }
        }

        self.group_types = self.expected_group_types()?;
        self.agg_input_types = self.expected_agg_input_types()?;

        if !self.group_types.is_empty() {
            let mut table = KeyTable::new(self.group_types.clone())?;
            if let Some(tracker) = self.mem_tracker.as_ref() {
                table.set_mem_tracker(MemTracker::new_child("KeyTable", tracker));
            }
            self.key_table = Some(table);
        }

        let kernels = agg::build_kernel_set(&self.plan.functions, &self.agg_input_types)?;
        let key_columns = self
            .key_table
            .as_ref()
            .map(|table| table.key_columns())
            .unwrap_or(&[]);
        self.output_schema = Some(build_output_schema(
            key_columns,
            &kernels.entries,
            !self.plan.need_finalize,
            &self.plan.output_slots,
        )?);
        self.kernels = Some(kernels);
        self.phase = AggPhase::Prepared;
        Ok(())
    }

    /// Consume one input chunk during the build phase. The first chunk moves
    /// the operator into the build phase and selects the batch strategy.
    pub fn push_chunk(&mut self, chunk: Chunk) -> Result<(), String> {
        match self.phase {
            AggPhase::Prepared => self.enter_building(),
            AggPhase::Building => {}
            other => {
                return Err(format!(
                    "{}: received input in phase {}",
                    self.name, other
                ));
            }
        }
        self.init_profile_if_needed();
        let started = Instant::now();
        let result = self.process(chunk);
        if let Some(profile) = self.profile.as_ref() {
            profile.counter_add(
                "BuildTime",
                CounterUnit::TimeNs,
                started.elapsed().as_nanos() as i64,
            );
        }
        result
    }

    /// Drain the entire upstream source, then finish the build phase. This is
    /// the blocking, pipeline-breaking entry point: no output exists until it
    /// returns.
    pub fn build_from(&mut self, source: &mut dyn ChunkSource) -> Result<(), String> {
        loop {
            match source.next_chunk()? {
                Some(chunk) => self.push_chunk(chunk)?,
                None => break,
            }
        }
        self.finish_build()
    }

    /// Transition from build to produce once upstream input is exhausted.
    pub fn finish_build(&mut self) -> Result<(), String> {
        match self.phase {
            AggPhase::Prepared | AggPhase::Building => {}
            other => {
                return Err(format!(
                    "{}: finish_build called in phase {}",
                    self.name, other
                ));
            }
        }
        self.init_profile_if_needed();

        // Ungrouped aggregation with output columns always yields exactly one
        // row; its singleton state is created here if no input arrived.
        if self.plan.group_by.is_empty() && !self.plan.functions.is_empty() {
            self.ensure_scalar_group()?;
        }

        if let Some(profile) = self.profile.as_ref() {
            if let Some(table) = self.key_table.as_ref() {
                let buckets = table.bucket_count();
                profile.counter_set("HashTableBuckets", CounterUnit::Unit, buckets as i64);
                let load_factor = if buckets == 0 {
                    0.0
                } else {
                    table.group_count() as f64 / buckets as f64
                };
                profile
                    .add_counter("HashTableLoadFactor", CounterUnit::DoubleValue)
                    .set_f64(load_factor);
            }
            profile.counter_set(
                "GroupCount",
                CounterUnit::Unit,
                self.group_states.len() as i64,
            );
        }

        self.output_cursor = 0;
        self.phase = AggPhase::Producing;
        Ok(())
    }

    /// Produce the next bounded chunk of output rows, or `None` once every
    /// group has been emitted. Groups are finalized exactly once, in hash
    /// table iteration order; no ordering guarantee is given.
    pub fn pull_chunk(&mut self) -> Result<Option<Chunk>, String> {
        if self.phase != AggPhase::Producing {
            return Err(format!(
                "{}: pull_chunk called in phase {}",
                self.name, self.phase
            ));
        }
        let started = Instant::now();
        let result = self.produce_chunk();
        if let Some(profile) = self.profile.as_ref() {
            profile.counter_add(
                "GetResultsTime",
                CounterUnit::TimeNs,
                started.elapsed().as_nanos() as i64,
            );
        }
        result
    }

    /// Release the hash table and state arena and return to `Prepared` for
    /// another build/produce cycle over the same plan.
    pub fn reset(&mut self) -> Result<(), String> {
        match self.phase {
            AggPhase::Prepared | AggPhase::Building | AggPhase::Producing => {}
            other => {
                return Err(format!("{}: reset called in phase {}", self.name, other));
            }
        }
        self.release_group_state();
        if !self.group_types.is_empty() {
            let mut table = KeyTable::new(self.group_types.clone())?;
            if let Some(tracker) = self.mem_tracker.as_ref() {
                table.set_mem_tracker(MemTracker::new_child("KeyTable", tracker));
            }
            self.key_table = Some(table);
        }
        self.strategy = BatchStrategy::Unselected;
        self.output_cursor = 0;
        self.saw_input = false;
        self.zero_width_emitted = false;
        self.data_initialized = false;
        self.phase = AggPhase::Prepared;
        Ok(())
    }

    /// Release every resource permanently. Safe from any phase, including
    /// mid-build; repeated calls are no-ops.
    pub fn close(&mut self) {
        if self.phase == AggPhase::Closed {
            return;
        }
        self.release_group_state();
        self.strategy = BatchStrategy::Unselected;
        self.phase = AggPhase::Closed;
    }

    fn release_group_state(&mut self) {
        let group_states = std::mem::take(&mut self.group_states);
        if let Some(kernels) = self.kernels.as_ref() {
            for &state in &group_states {
                for kernel in &kernels.entries {
                    kernel.drop_state(&mut self.state_arena, state);
                }
            }
        }
        self.state_refs.clear();
        self.key_table = None;
        self.state_arena.release_all();
    }

    fn enter_building(&mut self) {
        self.select_strategy();
        self.phase = AggPhase::Building;
    }

    // The strategy is picked exactly once per build phase: grouped vs
    // ungrouped, and specialized when the engine accepts the signature.
    // Specialization failure is non-fatal and falls back silently.
    fn select_strategy(&mut self) {
        let interpreted = if self.plan.group_by.is_empty() {
            BatchStrategy::UngroupedInterpreted
        } else {
            BatchStrategy::GroupedInterpreted
        };
        if !self.enable_specialization {
            self.strategy = interpreted;
            return;
        }
        let Some(kernels) = self.kernels.as_ref() else {
            self.strategy = interpreted;
            return;
        };
        let sig = SpecializeSignature {
            group_types: &self.group_types,
            functions: &self.plan.functions,
            kernels,
        };
        match self.specializer.specialize(&sig) {
            Some(routine) => {
                tracing::debug!(
                    "{}: using specialized batch routine from engine '{}'",
                    self.name,
                    self.specializer.name()
                );
                self.strategy = BatchStrategy::Specialized(routine);
            }
            None => {
                tracing::debug!(
                    "{}: specialization unsupported, using interpreted path",
                    self.name
                );
                self.strategy = interpreted;
            }
        }
    }

    fn init_profile_if_needed(&mut self) {
        if self.profile_initialized {
            return;
        }
        self.profile_initialized = true;
        if let Some(profile) = self.profile.as_ref() {
            profile.add_info_string("GroupingKeys", format!("{}", self.plan.group_by.len()));
            let funcs = self
                .plan
                .functions
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            profile.add_info_string("AggregateFunctions", funcs);
        }
    }

    fn process(&mut self, chunk: Chunk) -> Result<(), String> {
        if chunk.is_empty() && chunk.schema().fields().is_empty() {
            return Ok(());
        }

        let group_arrays = self.eval_group_by_arrays(&chunk)?;
        let agg_arrays = self.eval_agg_arrays(&chunk)?;
        self.ensure_data_initialized(&group_arrays, &agg_arrays)?;

        let num_rows = chunk.len();
        if num_rows == 0 {
            return Ok(());
        }
        self.saw_input = true;
        if let Some(profile) = self.profile.as_ref() {
            profile.counter_add("InputRowCount", CounterUnit::Unit, num_rows as i64);
        }

        let input = BatchInput {
            group_arrays: &group_arrays,
            agg_arrays: &agg_arrays,
            num_rows,
        };
        let kernels = self
            .kernels
            .as_ref()
            .ok_or_else(|| "aggregate kernels not initialized".to_string())?;
        let mut ctx = BuildContext {
            key_table: self.key_table.as_mut(),
            state_arena: &mut self.state_arena,
            group_states: &mut self.group_states,
            state_refs: &mut self.state_refs,
            kernels,
        };
        match &self.strategy {
            BatchStrategy::Unselected => Err("aggregate batch strategy not selected".to_string()),
            BatchStrategy::UngroupedInterpreted => {
                process_batch_ungrouped(&mut ctx, &input, &self.plan.functions)
            }
            BatchStrategy::GroupedInterpreted => {
                process_batch_grouped(&mut ctx, &input, &self.plan.functions)
            }
            BatchStrategy::Specialized(routine) => routine(&mut ctx, &input),
        }
    }

    fn produce_chunk(&mut self) -> Result<Option<Chunk>, String> {
        let schema = self
            .output_schema
            .clone()
            .unwrap_or_else(|| Arc::new(Schema::empty()));

        // Zero-width ungrouped output: one empty row iff any input row was
        // seen, emitted exactly once.
        if self.plan.group_by.is_empty() && self.plan.functions.is_empty() {
            if self.zero_width_emitted || !self.saw_input {
                return Ok(None);
            }
            self.zero_width_emitted = true;
            let options = RecordBatchOptions::new().with_row_count(Some(1));
            let batch = RecordBatch::try_new_with_options(schema, Vec::new(), &options)
                .map_err(|e| e.to_string())?;
            return Chunk::try_new(batch).map(Some);
        }

        let total = self.group_states.len();
        if self.output_cursor >= total {
            return Ok(None);
        }
        let start = self.output_cursor;
        let len = self.chunk_size.min(total - start);

        let kernels = self
            .kernels
            .as_ref()
            .ok_or_else(|| "aggregate kernels not initialized".to_string())?;
        let key_count = self
            .key_table
            .as_ref()
            .map(|table| table.key_columns().len())
            .unwrap_or(0);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(key_count + kernels.entries.len());
        if let Some(table) = self.key_table.as_ref() {
            for col in table.key_columns() {
                arrays.push(col.to_array_range(start, len)?);
            }
        }
        let states = &self.group_states[start..start + len];
        for kernel in &kernels.entries {
            arrays.push(kernel.build_array(&self.state_arena, states, !self.plan.need_finalize)?);
        }
        self.output_cursor += len;

        let batch = RecordBatch::try_new(schema, arrays).map_err(|e| e.to_string())?;
        Chunk::try_new(batch).map(Some)
    }

    fn ensure_scalar_group(&mut self) -> Result<(), String> {
        if !self.group_states.is_empty() {
            return Ok(());
        }
        let kernels = self
            .kernels
            .as_ref()
            .ok_or_else(|| "aggregate kernels not initialized".to_string())?;
        let mut ctx = BuildContext {
            key_table: None,
            state_arena: &mut self.state_arena,
            group_states: &mut self.group_states,
            state_refs: &mut self.state_refs,
            kernels,
        };
        ctx.ensure_scalar_group()
    }

    fn eval_group_by_arrays(&self, chunk: &Chunk) -> Result<Vec<ArrayRef>, String> {
        eval_exprs(&self.arena, &self.plan.group_by, chunk)
    }

    fn eval_agg_arrays(&self, chunk: &Chunk) -> Result<Vec<Option<ArrayRef>>, String> {
        let mut arrays = Vec::with_capacity(self.plan.functions.len());
        for func in &self.plan.functions {
            let array = match func.inputs.as_slice() {
                [] => None,
                [expr] => Some(self.arena.eval(*expr, chunk)?),
                _ => {
                    return Err(format!(
                        "aggregate {} expects at most one input expression, got {}",
                        func.name,
                        func.inputs.len()
                    ));
                }
            };
            arrays.push(array);
        }
        Ok(arrays)
    }

    // First-batch validation: evaluated array types must match the types the
    // kernels were built for.
    fn ensure_data_initialized(
        &mut self,
        group_arrays: &[ArrayRef],
        agg_arrays: &[Option<ArrayRef>],
    ) -> Result<(), String> {
        if self.data_initialized {
            return Ok(());
        }
        if group_arrays.len() != self.group_types.len() {
            return Err("group_by arrays length mismatch".to_string());
        }
        for (idx, (expected, array)) in self
            .group_types
            .iter()
            .zip(group_arrays.iter())
            .enumerate()
        {
            if expected != array.data_type() {
                return Err(format!(
                    "group by type mismatch at {}: expected {:?}, got {:?}",
                    idx,
                    expected,
                    array.data_type()
                ));
            }
        }
        if agg_arrays.len() != self.plan.functions.len() {
            return Err("aggregate arrays length mismatch".to_string());
        }
        let kernels = self
            .kernels
            .as_ref()
            .ok_or_else(|| "aggregate kernels not initialized".to_string())?;
        for (idx, array_opt) in agg_arrays.iter().enumerate() {
            let func = &self.plan.functions[idx];
            if func.input_is_intermediate {
                let array = array_opt
                    .as_ref()
                    .ok_or_else(|| "aggregate intermediate input missing".to_string())?;
                let expected = kernels.entries[idx].output_type(true);
                if array.data_type() != &expected {
                    return Err(format!(
                        "aggregate intermediate type mismatch at {}: expected {:?}, got {:?}",
                        idx,
                        expected,
                        array.data_type()
                    ));
                }
                continue;
            }
            match (self.agg_input_types[idx].as_ref(), array_opt) {
                (None, None) => {}
                (None, Some(_)) => {
                    return Err(format!("aggregate {} input should be none", func.name));
                }
                (Some(_), None) => {
                    return Err(format!("aggregate {} input missing", func.name));
                }
                (Some(expected), Some(array)) => {
                    if expected != array.data_type() {
                        return Err(format!(
                            "aggregate input type mismatch at {}: expected {:?}, got {:?}",
                            idx,
                            expected,
                            array.data_type()
                        ));
                    }
                }
            }
        }
        self.data_initialized = true;
        Ok(())
    }

    fn expected_group_types(&self) -> Result<Vec<DataType>, String> {
        let mut types = Vec::with_capacity(self.plan.group_by.len());
        for expr in &self.plan.group_by {
            let data_type = self
                .arena
                .data_type(*expr)
                .ok_or_else(|| "group by type missing".to_string())?
                .clone();
            if matches!(data_type, DataType::Null) {
                return Err("group by type is null".to_string());
            }
            types.push(data_type);
        }
        Ok(types)
    }

    fn expected_agg_input_types(&self) -> Result<Vec<Option<DataType>>, String> {
        let mut types = Vec::with_capacity(self.plan.functions.len());
        for func in &self.plan.functions {
            if func.input_is_intermediate {
                // Merge aggregates consume intermediate state from a previous
                // stage; the planner signature pins its type when the input
                // expression still carries the final output type.
                if let Some(sig) = func.types.as_ref() {
                    if let Some(intermediate) = sig.intermediate_type.as_ref() {
                        if matches!(intermediate, DataType::Null) {
                            return Err("aggregate intermediate type is null".to_string());
                        }
                        types.push(Some(intermediate.clone()));
                        continue;
                    }
                }
            }
            let data_type = match (func.name.as_str(), func.inputs.as_slice()) {
                ("count", []) => None,
                (_, [expr]) => Some(
                    self.arena
                        .data_type(*expr)
                        .ok_or_else(|| "aggregate input type missing".to_string())?
                        .clone(),
                ),
                (_, []) => return Err(format!("aggregate {} input missing", func.name)),
                (_, _) => {
                    return Err(format!(
                        "aggregate {} expects at most one input expression, got {}",
                        func.name,
                        func.inputs.len()
                    ));
                }
            };
            if matches!(data_type, Some(DataType::Null)) {
                return Err("aggregate input type is null".to_string());
            }
            types.push(data_type);
        }
        Ok(types)
    }
}

impl Drop for AggregationOperator {
    fn drop(&mut self) {
        self.close();
    }
}

fn eval_exprs(
    arena: &ExprArena,
    exprs: &[ExprId],
    chunk: &Chunk,
) -> Result<Vec<ArrayRef>, String> {
    let mut arrays = Vec::with_capacity(exprs.len());
    for expr in exprs {
        arrays.push(arena.eval(*expr, chunk)?);
    }
    Ok(arrays)
}

fn process_batch_ungrouped(
    ctx: &mut BuildContext<'_>,
    input: &BatchInput<'_>,
    functions: &[AggFunction],
) -> Result<(), String> {
    ctx.ensure_scalar_group()?;
    let state = ctx.group_states[0];
    ctx.state_refs.clear();
    ctx.state_refs.resize(input.num_rows, state);
    run_kernels(ctx, input, functions)
}

fn process_batch_grouped(
    ctx: &mut BuildContext<'_>,
    input: &BatchInput<'_>,
    functions: &[AggFunction],
) -> Result<(), String> {
    let views = build_group_key_views(input.group_arrays)?;
    let strategy = ctx
        .key_table
        .as_deref()
        .ok_or_else(|| "aggregate key table missing".to_string())?
        .key_strategy();

    ctx.state_refs.clear();
    ctx.state_refs.reserve(input.num_rows);
    match strategy {
        GroupKeyStrategy::Scalar => {
            return Err("group key strategy Scalar is invalid for group by".to_string());
        }
        GroupKeyStrategy::OneNumber => {
            let view = views
                .first()
                .ok_or_else(|| "one number key view missing".to_string())?;
            let table = ctx
                .key_table
                .as_deref_mut()
                .ok_or_else(|| "aggregate key table missing".to_string())?;
            let hashes = table.build_one_number_hashes(view, input.num_rows)?;
            for row in 0..input.num_rows {
                let lookup = table.find_or_insert_one_number(view, row, hashes[row])?;
                push_group_state(
                    lookup.is_new,
                    lookup.group_id,
                    ctx.kernels,
                    ctx.state_arena,
                    ctx.group_states,
                    ctx.state_refs,
                )?;
            }
        }
        GroupKeyStrategy::OneString => {
            let view = views
                .first()
                .ok_or_else(|| "one string key view missing".to_string())?;
            let table = ctx
                .key_table
                .as_deref_mut()
                .ok_or_else(|| "aggregate key table missing".to_string())?;
            let hashes = table.build_one_string_hashes(view, input.num_rows)?;
            for row in 0..input.num_rows {
                let lookup = table.find_or_insert_one_string(view, row, hashes[row])?;
                push_group_state(
                    lookup.is_new,
                    lookup.group_id,
                    ctx.kernels,
                    ctx.state_arena,
                    ctx.group_states,
                    ctx.state_refs,
                )?;
            }
        }
        GroupKeyStrategy::Serialized => {
            let table = ctx
                .key_table
                .as_deref_mut()
                .ok_or_else(|| "aggregate key table missing".to_string())?;
            let rows = table.build_rows(input.group_arrays)?;
            for row in 0..input.num_rows {
                let row_bytes = rows.row(row).data();
                let hash = table.row_hash(row_bytes);
                let lookup = table.find_or_insert_from_row(&views, row, row_bytes, hash)?;
                push_group_state(
                    lookup.is_new,
                    lookup.group_id,
                    ctx.kernels,
                    ctx.state_arena,
                    ctx.group_states,
                    ctx.state_refs,
                )?;
            }
        }
    }

    run_kernels(ctx, input, functions)
}

fn push_group_state(
    is_new: bool,
    group_id: usize,
    kernels: &AggKernelSet,
    state_arena: &mut AggStateArena,
    group_states: &mut Vec<AggStateRef>,
    state_refs: &mut Vec<AggStateRef>,
) -> Result<(), String> {
    if is_new {
        if group_id != group_states.len() {
            return Err("aggregate group id out of bounds".to_string());
        }
        let layout = &kernels.layout;
        let base = state_arena.alloc(layout.total_size, layout.max_align)?;
        for kernel in &kernels.entries {
            kernel.init_state(state_arena, base);
        }
        group_states.push(base);
    }
    let state = *group_states
        .get(group_id)
        .ok_or_else(|| "aggregate state missing".to_string())?;
    state_refs.push(state);
    Ok(())
}

fn run_kernels(
    ctx: &mut BuildContext<'_>,
    input: &BatchInput<'_>,
    functions: &[AggFunction],
) -> Result<(), String> {
    if input.agg_arrays.len() != ctx.kernels.entries.len() {
        return Err("aggregate arrays length mismatch".to_string());
    }
    for (idx, kernel) in ctx.kernels.entries.iter().enumerate() {
        let array = &input.agg_arrays[idx];
        let is_merge = functions
            .get(idx)
            .map(|f| f.input_is_intermediate)
            .unwrap_or(false);
        if is_merge {
            let view = kernel.build_merge_view(array)?;
            kernel.merge_batch(ctx.state_arena, ctx.state_refs, &view)?;
        } else {
            let view = kernel.build_input_view(array)?;
            kernel.update_batch(ctx.state_arena, ctx.state_refs, &view)?;
        }
    }
    Ok(())
}
